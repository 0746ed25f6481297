//! Axum extractors for authentication.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use super::types::AuthenticatedPrincipal;

/// Pull the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Extractor for endpoints that require a valid access token.
///
/// Stateless: only signature, expiry and token type are checked.
pub struct BearerAuth(pub AuthenticatedPrincipal);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token =
            bearer_token(parts).ok_or(ApiAuthError::new(AuthErrorKind::NotAuthenticated))?;

        let verified = state.jwt().validate_access_token(token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected access token");
            ApiAuthError::new(AuthErrorKind::InvalidToken)
        })?;

        Ok(BearerAuth(AuthenticatedPrincipal {
            principal_id: verified.principal_id,
        }))
    }
}
