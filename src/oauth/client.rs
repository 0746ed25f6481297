//! Code exchange and profile fetch against a provider's HTTP endpoints.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;

use super::error::ProviderError;
use super::provider::{ProviderRegistration, RawAttributes};

const CLIENT_USER_AGENT: &str = concat!("lifelogix/", env!("CARGO_PKG_VERSION"));

/// Turns an authorization code into the provider's profile attributes.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn fetch_profile(
        &self,
        registration: &ProviderRegistration,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<RawAttributes, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct EmailEntry {
    email: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    verified: bool,
}

/// [`IdentityProvider`] backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpIdentityProvider {
    http: reqwest::Client,
}

impl HttpIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom HTTP client (for connection pool reuse or proxies).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    async fn exchange_code(
        &self,
        registration: &ProviderRegistration,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, ProviderError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", registration.client_id.as_str()),
            ("client_secret", registration.client_secret.as_str()),
            ("code_verifier", code_verifier),
        ];

        let response = self
            .http
            .post(registration.token_url.clone())
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .form(&params)
            .send()
            .await?;

        let response = ensure_success(response, "token exchange").await?;
        Ok(response.json::<TokenResponse>().await?)
    }

    async fn user_info(
        &self,
        registration: &ProviderRegistration,
        access_token: &str,
    ) -> Result<RawAttributes, ProviderError> {
        let response = self
            .http
            .get(registration.userinfo_url.clone())
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .send()
            .await?;

        let response = ensure_success(response, "userinfo request").await?;
        Ok(response.json::<RawAttributes>().await?)
    }

    /// Primary verified address, for accounts that hide their email.
    async fn primary_email(
        &self,
        registration: &ProviderRegistration,
        access_token: &str,
    ) -> Result<Option<String>, ProviderError> {
        let Some(emails_url) = &registration.emails_url else {
            return Ok(None);
        };

        let response = self
            .http
            .get(emails_url.clone())
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .send()
            .await?;

        let response = ensure_success(response, "email lookup").await?;
        let emails = response.json::<Vec<EmailEntry>>().await?;
        Ok(emails
            .into_iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email))
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn fetch_profile(
        &self,
        registration: &ProviderRegistration,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<RawAttributes, ProviderError> {
        let token = self
            .exchange_code(registration, code, code_verifier, redirect_uri)
            .await?;
        let mut attrs = self.user_info(registration, &token.access_token).await?;

        let has_email = matches!(attrs.get("email"), Some(Value::String(s)) if !s.is_empty());
        if !has_email {
            if let Some(email) = self.primary_email(registration, &token.access_token).await? {
                attrs.insert("email".into(), Value::String(email));
            }
        }

        Ok(attrs)
    }
}

/// Checks HTTP response status; returns the response on success or an error with details.
async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let detail = response.text().await.unwrap_or_default();
    Err(ProviderError::Endpoint {
        operation,
        status,
        detail,
    })
}
