use sqlx::sqlite::SqlitePool;
use std::str::FromStr;

#[derive(Clone)]
pub struct PrincipalStore {
    pool: SqlitePool,
}

/// Where a principal's identity comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provider {
    Local,
    Google,
    Github,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Local => "LOCAL",
            Provider::Google => "GOOGLE",
            Provider::Github => "GITHUB",
        }
    }
}

/// A `provider` column value this build does not know.
#[derive(Debug, thiserror::Error)]
#[error("unknown provider tag: {0}")]
pub struct UnknownProvider(String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOCAL" => Ok(Provider::Local),
            "GOOGLE" => Ok(Provider::Google),
            "GITHUB" => Ok(Provider::Github),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

#[derive(Clone)]
pub struct Principal {
    pub id: i64,
    pub email: String,
    pub display_name: String,
    pub provider: Provider,
    /// Provider's opaque subject id; None for local accounts
    pub provider_id: Option<String>,
    /// Argon2 PHC string; None for third-party accounts
    pub password_hash: Option<String>,
}

impl std::fmt::Debug for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("provider", &self.provider)
            .field("provider_id", &self.provider_id)
            .finish_non_exhaustive()
    }
}

#[derive(sqlx::FromRow)]
struct PrincipalRow {
    id: i64,
    email: String,
    display_name: String,
    provider: String,
    provider_id: Option<String>,
    password_hash: Option<String>,
}

impl TryFrom<PrincipalRow> for Principal {
    type Error = sqlx::Error;

    fn try_from(row: PrincipalRow) -> Result<Self, Self::Error> {
        let provider = row
            .provider
            .parse()
            .map_err(|e: UnknownProvider| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Self {
            id: row.id,
            email: row.email,
            display_name: row.display_name,
            provider,
            provider_id: row.provider_id,
            password_hash: row.password_hash,
        })
    }
}

/// Whether an insert failed on a UNIQUE constraint.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

macro_rules! select_principal {
    ($filter:literal) => {
        concat!(
            "SELECT id, email, display_name, provider, provider_id, password_hash FROM principals ",
            $filter
        )
    };
}

impl PrincipalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a password-backed principal. Returns the principal ID.
    pub async fn create_local(
        &self,
        email: &str,
        password_hash: &str,
        display_name: &str,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO principals (email, password_hash, display_name, provider)
             VALUES (?, ?, ?, 'LOCAL')",
        )
        .bind(email)
        .bind(password_hash)
        .bind(display_name)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Create a principal provisioned by a third-party provider.
    pub async fn create_external(
        &self,
        provider: Provider,
        provider_id: &str,
        email: &str,
        display_name: &str,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO principals (email, display_name, provider, provider_id)
             VALUES (?, ?, ?, ?)",
        )
        .bind(email)
        .bind(display_name)
        .bind(provider.as_str())
        .bind(provider_id)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a principal by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Principal>, sqlx::Error> {
        let row: Option<PrincipalRow> =
            sqlx::query_as(select_principal!("WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Principal::try_from).transpose()
    }

    /// Get a principal by email (case-insensitive).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<Principal>, sqlx::Error> {
        let row: Option<PrincipalRow> =
            sqlx::query_as(select_principal!("WHERE email = ?"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Principal::try_from).transpose()
    }

    /// Get a principal by provider and the provider's subject id.
    pub async fn get_by_provider(
        &self,
        provider: Provider,
        provider_id: &str,
    ) -> Result<Option<Principal>, sqlx::Error> {
        let row: Option<PrincipalRow> = sqlx::query_as(select_principal!(
            "WHERE provider = ? AND provider_id = ?"
        ))
        .bind(provider.as_str())
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Principal::try_from).transpose()
    }

    /// Set the display name. Returns false when the name was already current.
    pub async fn update_display_name(&self, id: i64, display_name: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE principals SET display_name = ?, updated_at = datetime('now')
             WHERE id = ? AND display_name != ?",
        )
        .bind(display_name)
        .bind(id)
        .bind(display_name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
