//! Authentication error types.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::jwt::JwtError;
use crate::session::StoreError;

/// Failures of the login, refresh, exchange and logout flows.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Unknown email or wrong password. Deliberately one variant for both.
    #[error("invalid email or password")]
    AuthenticationFailed,
    #[error("token expired")]
    TokenExpired,
    #[error("token malformed")]
    TokenMalformed,
    /// Refresh token failed to decode, was revoked, or was superseded.
    #[error("token invalid")]
    TokenInvalid,
    #[error("invalid or expired exchange code")]
    InvalidOrExpiredCode,
    #[error("redirect destination is not authorized")]
    UnauthorizedRedirect,
    /// A token or code resolved to a principal id with no row behind it.
    #[error("principal {0} not found")]
    PrincipalNotFound(i64),
    #[error("email already registered")]
    EmailTaken,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to sign token: {0}")]
    Signing(String),
    #[error("failed to hash password: {0}")]
    PasswordHash(String),
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::TokenExpired,
            JwtError::Malformed(_) | JwtError::WrongTokenType => AuthError::TokenMalformed,
            JwtError::Encoding(_) | JwtError::LifetimeOverflow(_) => {
                AuthError::Signing(err.to_string())
            }
        }
    }
}

/// Rejection kind for the bearer extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    NotAuthenticated,
    InvalidToken,
}

/// Bearer authentication rejection (returns JSON 401).
#[derive(Debug)]
pub struct ApiAuthError {
    pub(super) kind: AuthErrorKind,
}

impl ApiAuthError {
    pub(super) fn new(kind: AuthErrorKind) -> Self {
        Self { kind }
    }

    fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::NotAuthenticated => "Not authenticated",
            // Expired and malformed are not told apart to the client
            AuthErrorKind::InvalidToken => "Invalid or expired token",
        }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response()
    }
}
