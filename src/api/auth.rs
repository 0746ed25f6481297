//! Authentication API endpoints.
//!
//! - POST `/register` - Create a local principal
//! - POST `/login` - Email + password login, issues a token pair
//! - POST `/refresh` - Rotate the token pair (body or cookie)
//! - POST `/logout` - Revoke the refresh session (Bearer required)
//! - POST `/oauth-token` - Redeem a third-party login exchange code

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::error::ApiError;
use crate::auth::{
    BearerAuth, REFRESH_COOKIE_NAME, TokenIssuer, TokenPair, clear_refresh_cookie, get_cookie,
    login, redeem_exchange_code, refresh_cookie, register,
};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;

const MAX_USERNAME_LENGTH: usize = 50;

#[derive(Clone)]
pub struct AuthApiState {
    pub issuer: TokenIssuer,
    pub jwt: Arc<JwtConfig>,
    pub secure_cookies: bool,
}

impl_has_auth_backend!(AuthApiState);

pub fn router(state: AuthApiState) -> Router {
    Router::new()
        .route("/register", post(register_principal))
        .route("/login", post(password_login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/oauth-token", post(oauth_token))
        .with_state(state)
}

#[derive(Deserialize)]
struct RegisterRequest {
    email: String,
    password: String,
    username: String,
}

#[derive(Serialize)]
struct RegisterResponse {
    id: i64,
    email: String,
    username: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct OAuthTokenRequest {
    code: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenPairResponse {
    access_token: String,
    refresh_token: String,
    token_type: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessTokenResponse {
    access_token: String,
    token_type: &'static str,
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// Create a local principal.
async fn register_principal(
    State(state): State<AuthApiState>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = request.email.trim();
    let username = request.username.trim();

    if !is_plausible_email(email) {
        return Err(ApiError::bad_request("Invalid email"));
    }
    if request.password.trim().is_empty() {
        return Err(ApiError::bad_request("Password is required"));
    }
    if username.is_empty() {
        return Err(ApiError::bad_request("Username is required"));
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Username must be at most {} characters",
            MAX_USERNAME_LENGTH
        )));
    }

    let principal = register(state.issuer.db(), email, &request.password, username).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: principal.id,
            email: principal.email,
            username: principal.display_name,
        }),
    ))
}

/// Email + password login. The refresh token is in the body and the cookie.
async fn password_login(
    State(state): State<AuthApiState>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let (_, pair) = login(&state.issuer, request.email.trim(), &request.password).await?;
    Ok(pair_response(&pair, state.secure_cookies))
}

fn pair_response(pair: &TokenPair, secure: bool) -> Response {
    (
        StatusCode::OK,
        [(
            SET_COOKIE,
            refresh_cookie(&pair.refresh_token, pair.refresh_max_age, secure),
        )],
        Json(TokenPairResponse {
            access_token: pair.access_token.clone(),
            refresh_token: pair.refresh_token.clone(),
            token_type: "Bearer",
        }),
    )
        .into_response()
}

/// Rotate the token pair. The body's `refreshToken` wins over the cookie.
///
/// Any failure clears the refresh cookie so the client stops retrying it.
async fn refresh(State(state): State<AuthApiState>, headers: HeaderMap, body: Bytes) -> Response {
    let result = async {
        let from_body = if body.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            serde_json::from_slice::<RefreshRequest>(&body)
                .map_err(|_| ApiError::bad_request("Invalid request body"))?
                .refresh_token
                .filter(|t| !t.is_empty())
        };

        let presented = from_body
            .or_else(|| get_cookie(&headers, REFRESH_COOKIE_NAME).map(str::to_string))
            .ok_or_else(|| ApiError::unauthorized("No refresh token"))?;

        Ok::<_, ApiError>(state.issuer.rotate(&presented).await?)
    }
    .await;

    match result {
        Ok(pair) => pair_response(&pair, state.secure_cookies),
        Err(e) => (
            [(SET_COOKIE, clear_refresh_cookie(state.secure_cookies))],
            e,
        )
            .into_response(),
    }
}

/// Revoke the caller's refresh session and clear the cookie.
async fn logout(
    State(state): State<AuthApiState>,
    BearerAuth(auth): BearerAuth,
) -> Result<impl IntoResponse, ApiError> {
    state.issuer.revoke(auth.principal_id).await?;
    info!(principal_id = auth.principal_id, "Logged out");

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, clear_refresh_cookie(state.secure_cookies))],
        Json(serde_json::json!({ "success": true })),
    ))
}

/// Redeem a single-use exchange code from the third-party login redirect.
async fn oauth_token(
    State(state): State<AuthApiState>,
    Json(request): Json<OAuthTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.code.trim().is_empty() {
        return Err(ApiError::bad_request("Code is required"));
    }

    let (_, pair) = redeem_exchange_code(&state.issuer, request.code.trim()).await?;

    Ok((
        StatusCode::OK,
        [(
            SET_COOKIE,
            refresh_cookie(&pair.refresh_token, pair.refresh_max_age, state.secure_cookies),
        )],
        Json(AccessTokenResponse {
            access_token: pair.access_token,
            token_type: "Bearer",
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_plausible_email() {
        assert!(is_plausible_email("a@x.com"));
        assert!(!is_plausible_email("ax.com"));
        assert!(!is_plausible_email("@x.com"));
        assert!(!is_plausible_email("a@"));
        assert!(!is_plausible_email("a b@x.com"));
    }
}
