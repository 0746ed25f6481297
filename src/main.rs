use std::net::SocketAddr;

use clap::Parser;
use lifelogix::cli::{
    Args, build_config, connect_sessions, init_logging, load_cookie_key, load_jwt_secret,
    open_database,
};
use lifelogix::{create_app, init_cleanup};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(jwt_secret) = load_jwt_secret(args.jwt_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    let Some(cookie_key) = load_cookie_key() else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    let Some(sessions) = connect_sessions(args.redis_url.as_deref()).await else {
        std::process::exit(1);
    };

    let Some(config) = build_config(&args, db, sessions, jwt_secret, cookie_key) else {
        std::process::exit(1);
    };

    init_cleanup(&config.sessions);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let app = create_app(&config);

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, "Listening"),
        Err(e) => error!(error = %e, "Failed to read local address"),
    }

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, make_service).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
