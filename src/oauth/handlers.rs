//! Redirect-out and provider callback endpoints.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{FromRef, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::Key;
use serde::Deserialize;
use tracing::info;
use url::Url;

use super::account::provision_principal;
use super::client::IdentityProvider;
use super::cookies::{self, AuthorizationRequest};
use super::error::OAuthError;
use super::provider::{ProviderRegistration, normalize, parse_route_tag, route_tag};
use super::redirect::{RedirectPolicy, with_exchange_code};
use crate::api::error::ApiError;
use crate::auth::{TokenIssuer, mint_exchange_code};
use crate::db::Provider;

#[derive(Clone)]
pub struct OAuthState {
    pub issuer: TokenIssuer,
    pub providers: Arc<HashMap<Provider, ProviderRegistration>>,
    pub identity: Arc<dyn IdentityProvider>,
    pub redirects: Arc<RedirectPolicy>,
    pub public_url: Url,
    pub cookie_key: Key,
    pub secure_cookies: bool,
    pub auth_request_ttl: Duration,
    pub exchange_code_ttl: Duration,
}

impl FromRef<OAuthState> for Key {
    fn from_ref(state: &OAuthState) -> Self {
        state.cookie_key.clone()
    }
}

impl OAuthState {
    fn registration(&self, tag: &str) -> Result<&ProviderRegistration, OAuthError> {
        parse_route_tag(tag)
            .and_then(|provider| self.providers.get(&provider))
            .ok_or_else(|| OAuthError::UnknownProvider(tag.to_string()))
    }

    /// Our callback URL for `provider`, as registered with the provider.
    fn callback_uri(&self, provider: Provider) -> String {
        format!(
            "{}/login/oauth2/code/{}",
            self.public_url.as_str().trim_end_matches('/'),
            route_tag(provider)
        )
    }
}

pub fn router(state: OAuthState) -> Router {
    Router::new()
        .route("/oauth2/authorization/{provider}", get(start))
        .route("/login/oauth2/code/{provider}", get(callback))
        .with_state(state)
}

fn found(location: &Url) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

#[derive(Deserialize)]
struct StartParams {
    redirect_uri: Option<String>,
}

/// Send the browser to the provider, remembering the request in cookies.
async fn start(
    State(state): State<OAuthState>,
    Path(tag): Path<String>,
    Query(params): Query<StartParams>,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Response), ApiError> {
    let registration = state.registration(&tag)?;

    let redirect_uri = params.redirect_uri.filter(|s| !s.trim().is_empty());
    if let Some(requested) = &redirect_uri {
        state
            .redirects
            .resolve(Some(requested))
            .map_err(OAuthError::from)?;
    }

    let request = AuthorizationRequest::generate(registration.provider());
    let url = registration.authorization_url(
        &state.callback_uri(registration.provider()),
        &request.state,
        &request.code_challenge(),
    );

    let jar = cookies::store(
        jar,
        &request,
        redirect_uri.as_deref(),
        state.auth_request_ttl.as_secs(),
        state.secure_cookies,
    )
    .map_err(OAuthError::from)?;

    Ok((jar, found(&url)))
}

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Finish the provider login and hand the browser an exchange code.
///
/// The authorization cookies are cleared whatever the outcome.
async fn callback(
    State(state): State<OAuthState>,
    Path(tag): Path<String>,
    Query(params): Query<CallbackParams>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Response) {
    let (request, redirect_uri) = cookies::load(&jar);
    let jar = cookies::clear(jar);

    let response = match complete_login(&state, &tag, params, request, redirect_uri).await {
        Ok(location) => found(&location),
        Err(e) => ApiError::from(e).into_response(),
    };
    (jar, response)
}

async fn complete_login(
    state: &OAuthState,
    tag: &str,
    params: CallbackParams,
    request: Option<AuthorizationRequest>,
    redirect_uri: Option<String>,
) -> Result<Url, OAuthError> {
    let registration = state.registration(tag)?;
    let provider = registration.provider();

    if let Some(error) = params.error {
        let description = params.error_description.unwrap_or_default();
        return Err(OAuthError::Denied(format!("{} {}", error, description).trim().to_string()));
    }

    let request = request.ok_or(OAuthError::InvalidAuthorizationRequest("missing request cookie"))?;
    if request.provider != provider {
        return Err(OAuthError::InvalidAuthorizationRequest("provider mismatch"));
    }
    if params.state.as_deref() != Some(request.state.as_str()) {
        return Err(OAuthError::InvalidAuthorizationRequest("state mismatch"));
    }
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or(OAuthError::InvalidAuthorizationRequest("missing code"))?;

    let destination = state.redirects.resolve(redirect_uri.as_deref())?;

    let attrs = state
        .identity
        .fetch_profile(
            registration,
            &code,
            &request.code_verifier,
            &state.callback_uri(provider),
        )
        .await?;
    let profile = normalize(provider, &attrs)?;

    let principal = provision_principal(state.issuer.db(), provider, &profile).await?;
    let exchange_code =
        mint_exchange_code(&state.issuer, principal.id, state.exchange_code_ttl).await?;

    info!(
        principal_id = principal.id,
        provider = provider.as_str(),
        "Third-party login completed"
    );
    Ok(with_exchange_code(&destination, &exchange_code))
}
