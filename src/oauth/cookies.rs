//! Encrypted cookies carrying the in-flight authorization request across
//! the provider redirect.

use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::Duration;

use crate::db::Provider;

pub const AUTH_REQUEST_COOKIE_NAME: &str = "oauth2_auth_request";
pub const REDIRECT_URI_COOKIE_NAME: &str = "redirect_uri";

/// What the callback needs to finish the code exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequest {
    pub provider: Provider,
    pub state: String,
    pub code_verifier: String,
}

/// `N` random bytes as unpadded base64url.
fn random_url_token<const N: usize>() -> String {
    let bytes: [u8; N] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

impl AuthorizationRequest {
    /// Fresh request: a 16-byte `state` and a 48-byte PKCE verifier.
    pub fn generate(provider: Provider) -> Self {
        Self {
            provider,
            state: random_url_token::<16>(),
            code_verifier: random_url_token::<48>(),
        }
    }

    /// S256 PKCE challenge for this request's verifier.
    pub fn code_challenge(&self) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(self.code_verifier.as_bytes()))
    }
}

fn short_lived(name: &'static str, value: String, ttl_secs: u64, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX)))
        .build()
}

fn removal(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}

/// Store the request and, when given, the caller's destination. Without
/// one, any destination left over from an abandoned attempt is removed.
pub(super) fn store(
    jar: PrivateCookieJar,
    request: &AuthorizationRequest,
    redirect_uri: Option<&str>,
    ttl_secs: u64,
    secure: bool,
) -> Result<PrivateCookieJar, serde_json::Error> {
    let payload = serde_json::to_string(request)?;
    let jar = jar.add(short_lived(AUTH_REQUEST_COOKIE_NAME, payload, ttl_secs, secure));
    let destination = match redirect_uri {
        Some(redirect_uri) => short_lived(
            REDIRECT_URI_COOKIE_NAME,
            redirect_uri.to_string(),
            ttl_secs,
            secure,
        ),
        None => removal(REDIRECT_URI_COOKIE_NAME),
    };
    Ok(jar.add(destination))
}

/// Read both cookies. A request cookie that fails to decrypt or parse
/// reads as absent.
pub(super) fn load(jar: &PrivateCookieJar) -> (Option<AuthorizationRequest>, Option<String>) {
    let request = jar
        .get(AUTH_REQUEST_COOKIE_NAME)
        .and_then(|c| serde_json::from_str(c.value()).ok());
    let redirect_uri = jar
        .get(REDIRECT_URI_COOKIE_NAME)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());
    (request, redirect_uri)
}

/// Expire both cookies.
pub(super) fn clear(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.add(removal(AUTH_REQUEST_COOKIE_NAME))
        .add(removal(REDIRECT_URI_COOKIE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_extra::extract::cookie::Key;

    #[test]
    fn test_store_and_load() {
        let jar = PrivateCookieJar::new(Key::generate());
        let request = AuthorizationRequest::generate(Provider::Github);

        let jar = store(jar, &request, Some("http://localhost:3000/cb"), 180, false).unwrap();
        let (loaded, redirect) = load(&jar);
        assert_eq!(loaded, Some(request));
        assert_eq!(redirect.as_deref(), Some("http://localhost:3000/cb"));

        let cookie = jar.get(AUTH_REQUEST_COOKIE_NAME).unwrap();
        assert_eq!(cookie.max_age(), Some(Duration::seconds(180)));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.http_only(), Some(true));
    }

    #[test]
    fn test_store_without_destination() {
        let jar = PrivateCookieJar::new(Key::generate());
        let request = AuthorizationRequest::generate(Provider::Google);

        let jar = store(jar, &request, None, 180, true).unwrap();
        let (_, redirect) = load(&jar);
        assert_eq!(redirect, None);
    }

    #[test]
    fn test_store_without_destination_drops_previous_one() {
        let jar = PrivateCookieJar::new(Key::generate());
        let abandoned = AuthorizationRequest::generate(Provider::Google);
        let jar = store(jar, &abandoned, Some("http://localhost:3000/old"), 180, false).unwrap();

        let request = AuthorizationRequest::generate(Provider::Google);
        let jar = store(jar, &request, None, 180, false).unwrap();

        let (loaded, redirect) = load(&jar);
        assert_eq!(loaded, Some(request));
        assert_eq!(redirect, None);
        let cookie = jar.get(REDIRECT_URI_COOKIE_NAME).unwrap();
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
    }

    #[test]
    fn test_generated_request_shape() {
        let request = AuthorizationRequest::generate(Provider::Google);
        assert_eq!(request.state.len(), 22);
        assert_eq!(request.code_verifier.len(), 64);
        assert!(
            request
                .code_verifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );

        let other = AuthorizationRequest::generate(Provider::Google);
        assert_ne!(request.state, other.state);
        assert_ne!(request.code_verifier, other.code_verifier);
    }

    #[test]
    fn test_code_challenge_known_vector() {
        // RFC 7636 appendix B
        let request = AuthorizationRequest {
            provider: Provider::Google,
            state: "s".into(),
            code_verifier: "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".into(),
        };
        assert_eq!(
            request.code_challenge(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }
}
