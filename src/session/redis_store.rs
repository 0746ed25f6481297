use redis::{AsyncCommands, Client, RedisResult, Script, aio::MultiplexedConnection};
use tracing::debug;

/// Swap KEYS[1] to ARGV[2] with expiry ARGV[3] only while it holds ARGV[1].
const REPLACE_IF_CURRENT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
    return 1
end
return 0
"#;

/// Redis backend over a multiplexed connection. Cloning shares the
/// underlying connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(url: &str) -> RedisResult<Self> {
        let client = Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!("Redis connection established");

        Ok(Self { conn })
    }

    pub async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> RedisResult<()> {
        let mut conn = self.conn.clone();
        conn.set_ex(key, value, ttl_secs).await
    }

    pub async fn get(&self, key: &str) -> RedisResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await
    }

    pub async fn delete(&self, key: &str) -> RedisResult<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    /// `GETDEL`, atomic on the server (Redis 6.2+).
    pub async fn get_and_delete(&self, key: &str) -> RedisResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get_del(key).await
    }

    /// Compare-and-set as one server-side script, so concurrent callers
    /// presenting the same `expected` value cannot both win.
    pub async fn replace_if_current(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl_secs: u64,
    ) -> RedisResult<bool> {
        let mut conn = self.conn.clone();
        let replaced: i64 = Script::new(REPLACE_IF_CURRENT)
            .key(key)
            .arg(expected)
            .arg(value)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await?;
        Ok(replaced == 1)
    }
}
