//! Third-party login: redirect to a provider, come back with a profile,
//! provision the principal and hand the browser a single-use exchange code.

mod account;
mod client;
mod cookies;
mod error;
mod handlers;
mod provider;
mod redirect;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_extra::extract::cookie::Key;
use url::Url;

use crate::auth::TokenIssuer;

pub use account::provision_principal;
pub use client::{HttpIdentityProvider, IdentityProvider};
pub use cookies::{AUTH_REQUEST_COOKIE_NAME, AuthorizationRequest, REDIRECT_URI_COOKIE_NAME};
pub use error::{OAuthError, ProviderError};
pub use handlers::OAuthState;
pub use provider::{NormalizedProfile, ProviderRegistration, RawAttributes, normalize};
pub use redirect::{RedirectPolicy, with_exchange_code};

/// Default lifetime of the authorization-request cookies: 3 minutes
pub const AUTH_REQUEST_DURATION_SECS: u64 = 180;

/// Everything the provider routes need besides the token issuer.
#[derive(Clone)]
pub struct OAuthSettings {
    /// Configured providers; an unlisted provider answers 404
    pub providers: Vec<ProviderRegistration>,
    pub redirects: RedirectPolicy,
    /// Externally visible base URL, used to build callback URLs
    pub public_url: Url,
    /// Key for the private authorization-request cookies
    pub cookie_key: Key,
    pub auth_request_ttl: Duration,
    pub exchange_code_ttl: Duration,
}

/// Create the provider router (`/oauth2/authorization/*`, `/login/oauth2/code/*`).
pub fn router(
    issuer: TokenIssuer,
    settings: OAuthSettings,
    identity: Arc<dyn IdentityProvider>,
    secure_cookies: bool,
) -> Router {
    let providers: HashMap<_, _> = settings
        .providers
        .into_iter()
        .map(|registration| (registration.provider(), registration))
        .collect();

    handlers::router(OAuthState {
        issuer,
        providers: Arc::new(providers),
        identity,
        redirects: Arc::new(settings.redirects),
        public_url: settings.public_url,
        cookie_key: settings.cookie_key,
        secure_cookies,
        auth_request_ttl: settings.auth_request_ttl,
        exchange_code_ttl: settings.exchange_code_ttl,
    })
}
