use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use serde::Serialize;
use std::sync::Arc;

use super::error::{ApiError, ResultExt};
use crate::auth::BearerAuth;
use crate::db::{Database, Provider};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
}

impl_has_auth_backend!(UsersState);

pub fn router(state: UsersState) -> Router {
    Router::new().route("/me", get(me)).with_state(state)
}

#[derive(Serialize)]
struct MeResponse {
    id: i64,
    email: String,
    username: String,
    provider: Provider,
}

/// The authenticated principal's profile.
async fn me(
    State(state): State<UsersState>,
    BearerAuth(auth): BearerAuth,
) -> Result<impl IntoResponse, ApiError> {
    let principal = state
        .db
        .principals()
        .get_by_id(auth.principal_id)
        .await
        .db_err("Failed to get principal")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(MeResponse {
        id: principal.id,
        email: principal.email,
        username: principal.display_name,
        provider: principal.provider,
    }))
}
