use tracing::warn;

use crate::api::error::ApiError;
use crate::auth::AuthError;

/// Failure talking to, or interpreting the answer of, an identity provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{operation} failed with status {status}: {detail}")]
    Endpoint {
        operation: &'static str,
        status: u16,
        detail: String,
    },
    #[error("provider profile has no usable {0}")]
    MissingAttribute(&'static str),
    #[error("provider is not a third-party identity provider")]
    Unsupported,
}

/// Failures of the redirect-out and callback handlers.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("unknown or unconfigured provider: {0}")]
    UnknownProvider(String),
    #[error("invalid authorization request: {0}")]
    InvalidAuthorizationRequest(&'static str),
    #[error("provider returned error: {0}")]
    Denied(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("failed to encode authorization request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<OAuthError> for ApiError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::UnknownProvider(tag) => {
                ApiError::not_found(format!("Unknown provider: {}", tag))
            }
            OAuthError::InvalidAuthorizationRequest(reason) => {
                warn!(reason, "Rejected provider callback");
                ApiError::bad_request("Invalid authorization request")
            }
            OAuthError::Denied(code) => {
                warn!(error = %code, "Provider denied authorization");
                ApiError::bad_gateway("Identity provider denied the login")
            }
            OAuthError::Provider(e) => {
                warn!(error = %e, "Identity provider call failed");
                ApiError::bad_gateway("Identity provider error")
            }
            OAuthError::Auth(e) => e.into(),
            OAuthError::Encode(e) => ApiError::internal_error("Failed to encode cookie", e),
        }
    }
}
