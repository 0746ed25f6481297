pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod clock;
pub mod db;
pub mod jwt;
pub mod oauth;
pub mod session;

use api::create_api_router;
use auth::{TokenIssuer, TokenLifetimes};
use axum::Router;
use clock::Clock;
use db::Database;
use jwt::JwtConfig;
use oauth::{IdentityProvider, OAuthSettings};
use session::SessionStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::warn;

pub struct ServerConfig {
    /// Principal store (cloneable, uses connection pool internally)
    pub db: Database,
    /// Refresh sessions and exchange codes
    pub sessions: SessionStore,
    /// HS256 secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Time source for token and store expiry
    pub clock: Clock,
    pub lifetimes: TokenLifetimes,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    pub oauth: OAuthSettings,
    /// Performs the code exchange and profile fetch against providers
    pub identity_provider: Arc<dyn IdentityProvider>,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::with_clock(&config.jwt_secret, config.clock.clone()));
    let issuer = TokenIssuer::new(
        jwt.clone(),
        config.sessions.clone(),
        config.db.clone(),
        config.lifetimes,
    );

    let api_router = create_api_router(issuer.clone(), jwt, config.secure_cookies);

    let oauth_router = oauth::router(
        issuer,
        config.oauth.clone(),
        config.identity_provider.clone(),
        config.secure_cookies,
    );

    Router::new()
        .nest("/api/v1", api_router)
        .merge(oauth_router)
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub fn init_cleanup(sessions: &SessionStore) {
    if sessions.backend_name() != "memory" {
        return;
    }
    warn!("Using the in-memory session store; sessions are lost on restart and not shared");
    cleanup::run_cleanup(sessions);
    cleanup::spawn_cleanup_scheduler(sessions.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    init_cleanup(&config.sessions);

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
