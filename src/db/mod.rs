mod principal;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use principal::{Principal, PrincipalStore, Provider, is_unique_violation};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let pool = if path == ":memory:" {
            // Every connection to :memory: is a separate database
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&format!("sqlite:{}?mode=rwc", path))
                .await?
        };

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                // Local and third-party principals share one table.
                // provider_id is NULL for LOCAL rows, so the pair constraint
                // only bites for external accounts.
                "CREATE TABLE principals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    password_hash TEXT,
                    display_name TEXT NOT NULL,
                    provider TEXT NOT NULL DEFAULT 'LOCAL',
                    provider_id TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE (provider, provider_id)
                )",
                "CREATE INDEX idx_principals_provider ON principals(provider, provider_id)",
            ],
        )
        .await
    }

    /// Get the principal store.
    pub fn principals(&self) -> PrincipalStore {
        PrincipalStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_local_principal() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db
            .principals()
            .create_local("a@x.com", "hash", "alice")
            .await
            .unwrap();

        let principal = db.principals().get_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(principal.id, id);
        assert_eq!(principal.email, "a@x.com");
        assert_eq!(principal.display_name, "alice");
        assert_eq!(principal.provider, Provider::Local);
        assert_eq!(principal.provider_id, None);
        assert_eq!(principal.password_hash.as_deref(), Some("hash"));

        let principal = db.principals().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(principal.id, id);
    }

    #[tokio::test]
    async fn test_email_lookup_ignores_case() {
        let db = Database::open(":memory:").await.unwrap();

        db.principals()
            .create_local("Alice@X.com", "hash", "alice")
            .await
            .unwrap();

        assert!(
            db.principals()
                .get_by_email("alice@x.com")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_duplicate_email_fails_across_providers() {
        let db = Database::open(":memory:").await.unwrap();

        db.principals()
            .create_local("a@x.com", "hash", "alice")
            .await
            .unwrap();
        let result = db
            .principals()
            .create_external(Provider::Google, "g-1", "a@x.com", "Alice")
            .await;

        let err = result.unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_external_principal_lookup() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db
            .principals()
            .create_external(Provider::Github, "583231", "octo@x.com", "Octo")
            .await
            .unwrap();

        let found = db
            .principals()
            .get_by_provider(Provider::Github, "583231")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.password_hash, None);

        // Same subject id under another provider is a different identity
        assert!(
            db.principals()
                .get_by_provider(Provider::Google, "583231")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_update_display_name_only_when_changed() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db
            .principals()
            .create_external(Provider::Google, "g-1", "a@x.com", "Alice")
            .await
            .unwrap();

        assert!(!db.principals().update_display_name(id, "Alice").await.unwrap());
        assert!(db.principals().update_display_name(id, "Alice B").await.unwrap());

        let principal = db.principals().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(principal.display_name, "Alice B");
        assert_eq!(principal.email, "a@x.com");
    }

    #[test]
    fn test_provider_tags_round_trip() {
        for provider in [Provider::Local, Provider::Google, Provider::Github] {
            assert_eq!(provider.as_str().parse::<Provider>().unwrap(), provider);
        }
        assert!("FACEBOOK".parse::<Provider>().is_err());
        assert!("google".parse::<Provider>().is_err());
    }

    #[tokio::test]
    async fn test_unknown_provider_column_is_an_error() {
        let db = Database::open(":memory:").await.unwrap();

        sqlx::query(
            "INSERT INTO principals (email, display_name, provider, provider_id)
             VALUES ('f@x.com', 'F', 'FACEBOOK', 'fb-1')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let result = db.principals().get_by_email("f@x.com").await;
        assert!(matches!(result, Err(sqlx::Error::Decode(_))));
    }
}
