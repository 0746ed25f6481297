//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::auth::{
    ACCESS_TOKEN_DURATION_SECS, EXCHANGE_CODE_DURATION_SECS, REFRESH_TOKEN_DURATION_SECS,
    TokenLifetimes,
};
use crate::clock::Clock;
use crate::db::Database;
use crate::oauth::{
    AUTH_REQUEST_DURATION_SECS, HttpIdentityProvider, OAuthSettings, ProviderRegistration,
    RedirectPolicy,
};
use crate::session::SessionStore;
use axum_extra::extract::cookie::Key;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

/// Upper bound for every lifetime flag: one year
const MAX_TTL_SECS: u64 = 366 * 24 * 60 * 60;

/// Per-request limit for calls to identity providers
const PROVIDER_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_COOKIE_KEY_LENGTH: usize = 64;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "lifelogix",
    about = "Authentication and session service for the lifelogix timeline"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "lifelogix.db")]
    pub database: String,

    /// Redis URL for the session store. Without it an in-memory store is used
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Externally visible base URL, used for provider callback URLs
    #[arg(long, env = "PUBLIC_URL", default_value = "http://localhost:8080")]
    pub public_url: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Access token lifetime in seconds
    #[arg(
        long,
        env = "ACCESS_TOKEN_TTL",
        value_parser = clap::value_parser!(u64).range(1..=MAX_TTL_SECS),
        default_value_t = ACCESS_TOKEN_DURATION_SECS
    )]
    pub access_token_ttl: u64,

    /// Refresh token lifetime in seconds
    #[arg(
        long,
        env = "REFRESH_TOKEN_TTL",
        value_parser = clap::value_parser!(u64).range(1..=MAX_TTL_SECS),
        default_value_t = REFRESH_TOKEN_DURATION_SECS
    )]
    pub refresh_token_ttl: u64,

    /// Exchange code lifetime in seconds
    #[arg(
        long,
        env = "EXCHANGE_CODE_TTL",
        value_parser = clap::value_parser!(u64).range(1..=MAX_TTL_SECS),
        default_value_t = EXCHANGE_CODE_DURATION_SECS
    )]
    pub exchange_code_ttl: u64,

    /// Lifetime of the third-party authorization cookies in seconds
    #[arg(
        long,
        env = "AUTH_REQUEST_TTL",
        value_parser = clap::value_parser!(u64).range(1..=MAX_TTL_SECS),
        default_value_t = AUTH_REQUEST_DURATION_SECS
    )]
    pub auth_request_ttl: u64,

    /// Destinations allowed after third-party login (comma-separated)
    #[arg(
        long,
        env = "AUTHORIZED_REDIRECT_URIS",
        value_delimiter = ',',
        default_value = "http://localhost:3000/oauth2/redirect"
    )]
    pub authorized_redirect_uris: Vec<String>,

    /// Destination when the login request named none
    #[arg(
        long,
        env = "DEFAULT_REDIRECT_URI",
        default_value = "http://localhost:3000/oauth2/redirect"
    )]
    pub default_redirect_uri: String,

    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub google_client_id: Option<String>,

    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    pub google_client_secret: Option<String>,

    #[arg(long, env = "GITHUB_CLIENT_ID")]
    pub github_client_id: Option<String>,

    #[arg(long, env = "GITHUB_CLIENT_SECRET", hide_env_values = true)]
    pub github_client_secret: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load the private-cookie key from `COOKIE_KEY`, or generate one.
///
/// A generated key does not survive restarts, which only breaks logins
/// that are mid-redirect at that moment.
pub fn load_cookie_key() -> Option<Key> {
    let Ok(raw) = std::env::var("COOKIE_KEY") else {
        warn!("COOKIE_KEY not set, using a generated key for authorization cookies");
        return Some(Key::generate());
    };
    // SAFETY: single-threaded startup, as in `load_jwt_secret`.
    unsafe { std::env::remove_var("COOKIE_KEY") };

    if raw.len() < MIN_COOKIE_KEY_LENGTH {
        error!(
            "COOKIE_KEY is shorter than {} bytes. Use a longer key",
            MIN_COOKIE_KEY_LENGTH
        );
        return None;
    }

    match Key::try_from(raw.as_bytes()) {
        Ok(key) => Some(key),
        Err(e) => {
            error!(error = %e, "Invalid COOKIE_KEY");
            None
        }
    }
}

fn parse_url(what: &str, raw: &str) -> Option<Url> {
    match Url::parse(raw.trim()) {
        Ok(url) => Some(url),
        Err(e) => {
            error!(url = %raw, error = %e, "Invalid {}", what);
            None
        }
    }
}

/// Build the redirect allow-list. The default destination must be on it.
pub fn build_redirect_policy(allowed: &[String], default_destination: &str) -> Option<RedirectPolicy> {
    let allowed = allowed
        .iter()
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| parse_url("authorized redirect URI", raw))
        .collect::<Option<Vec<_>>>()?;
    let default_destination = parse_url("default redirect URI", default_destination)?;

    let policy = RedirectPolicy::new(allowed, default_destination);
    if !policy.is_authorized(policy.default_destination()) {
        error!("Default redirect URI is not among the authorized redirect URIs");
        return None;
    }
    Some(policy)
}

fn provider_credentials(
    name: &str,
    client_id: Option<&str>,
    client_secret: Option<&str>,
) -> Result<Option<(String, String)>, ()> {
    match (client_id, client_secret) {
        (Some(id), Some(secret)) => Ok(Some((id.to_string(), secret.to_string()))),
        (None, None) => Ok(None),
        _ => {
            error!("{} login needs both a client id and a client secret", name);
            Err(())
        }
    }
}

/// Registrations for every provider with configured credentials.
pub fn build_providers(args: &Args) -> Option<Vec<ProviderRegistration>> {
    let mut providers = Vec::new();

    let google = provider_credentials(
        "Google",
        args.google_client_id.as_deref(),
        args.google_client_secret.as_deref(),
    )
    .ok()?;
    if let Some((id, secret)) = google {
        providers.push(ProviderRegistration::google(id, secret).ok()?);
    }

    let github = provider_credentials(
        "GitHub",
        args.github_client_id.as_deref(),
        args.github_client_secret.as_deref(),
    )
    .ok()?;
    if let Some((id, secret)) = github {
        providers.push(ProviderRegistration::github(id, secret).ok()?);
    }

    if providers.is_empty() {
        info!("No third-party providers configured");
    }
    for registration in &providers {
        info!(provider = registration.provider().as_str(), "Third-party login enabled");
    }
    Some(providers)
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

/// Connect to Redis when configured, otherwise fall back to memory.
pub async fn connect_sessions(redis_url: Option<&str>) -> Option<SessionStore> {
    let Some(url) = redis_url else {
        return Some(SessionStore::in_memory(Clock::System));
    };

    match SessionStore::connect_redis(url).await {
        Ok(store) => {
            info!("Connected to Redis session store");
            Some(store)
        }
        Err(e) => {
            error!(error = %e, "Failed to connect to Redis");
            None
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    sessions: SessionStore,
    jwt_secret: String,
    cookie_key: Key,
) -> Option<ServerConfig> {
    let public_url = parse_url("public URL", &args.public_url)?;
    let redirects = build_redirect_policy(&args.authorized_redirect_uris, &args.default_redirect_uri)?;
    let providers = build_providers(args)?;
    let secure_cookies = public_url.scheme() == "https";

    let http = reqwest::Client::builder()
        .timeout(PROVIDER_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| error!(error = %e, "Failed to build provider HTTP client"))
        .ok()?;

    Some(ServerConfig {
        db,
        sessions,
        jwt_secret: jwt_secret.into_bytes(),
        clock: Clock::System,
        lifetimes: TokenLifetimes {
            access: Duration::from_secs(args.access_token_ttl),
            refresh: Duration::from_secs(args.refresh_token_ttl),
        },
        secure_cookies,
        oauth: OAuthSettings {
            providers,
            redirects,
            public_url,
            cookie_key,
            auth_request_ttl: Duration::from_secs(args.auth_request_ttl),
            exchange_code_ttl: Duration::from_secs(args.exchange_code_ttl),
        },
        identity_provider: Arc::new(HttpIdentityProvider::new().with_http_client(http)),
    })
}
