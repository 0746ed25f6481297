mod auth;
pub mod error;
mod users;

use axum::Router;
use std::sync::Arc;

use crate::auth::TokenIssuer;
use crate::jwt::JwtConfig;

pub use auth::AuthApiState;
pub use users::UsersState;

/// Create the JSON API router (mounted under `/api/v1`).
pub fn create_api_router(issuer: TokenIssuer, jwt: Arc<JwtConfig>, secure_cookies: bool) -> Router {
    let auth_state = auth::AuthApiState {
        issuer: issuer.clone(),
        jwt: jwt.clone(),
        secure_cookies,
    };

    let users_state = users::UsersState {
        db: issuer.db().clone(),
        jwt,
    };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/users", users::router(users_state))
}
