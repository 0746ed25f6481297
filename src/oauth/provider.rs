//! Supported identity providers: endpoints, scopes, and profile normalization.

use serde_json::{Map, Value};
use url::Url;

use super::error::ProviderError;
use crate::db::Provider;

/// Raw profile attributes as returned by a provider's userinfo endpoint.
pub type RawAttributes = Map<String, Value>;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

const GITHUB_AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USERINFO_URL: &str = "https://api.github.com/user";
const GITHUB_EMAILS_URL: &str = "https://api.github.com/user/emails";

/// Route tag for a provider, as used in `/oauth2/authorization/{tag}`.
pub fn route_tag(provider: Provider) -> &'static str {
    match provider {
        Provider::Google => "google",
        Provider::Github => "github",
        Provider::Local => "local",
    }
}

/// Parse a route tag. `local` is not a third-party provider.
pub fn parse_route_tag(tag: &str) -> Option<Provider> {
    match tag.to_ascii_lowercase().as_str() {
        "google" => Some(Provider::Google),
        "github" => Some(Provider::Github),
        _ => None,
    }
}

/// Client credentials and endpoints for one provider.
#[derive(Debug, Clone)]
pub struct ProviderRegistration {
    pub(crate) provider: Provider,
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
    pub(crate) userinfo_url: Url,
    /// Secondary lookup for accounts whose primary email is private
    pub(crate) emails_url: Option<Url>,
    pub(crate) scopes: Vec<String>,
}

impl ProviderRegistration {
    pub fn google(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            provider: Provider::Google,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_url: Url::parse(GOOGLE_AUTH_URL)?,
            token_url: Url::parse(GOOGLE_TOKEN_URL)?,
            userinfo_url: Url::parse(GOOGLE_USERINFO_URL)?,
            emails_url: None,
            scopes: vec!["openid".into(), "email".into(), "profile".into()],
        })
    }

    pub fn github(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            provider: Provider::Github,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_url: Url::parse(GITHUB_AUTH_URL)?,
            token_url: Url::parse(GITHUB_TOKEN_URL)?,
            userinfo_url: Url::parse(GITHUB_USERINFO_URL)?,
            emails_url: Some(Url::parse(GITHUB_EMAILS_URL)?),
            scopes: vec!["read:user".into(), "user:email".into()],
        })
    }

    /// Override the token endpoint.
    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    /// Override the userinfo endpoint.
    #[must_use]
    pub fn with_userinfo_url(mut self, url: Url) -> Self {
        self.userinfo_url = url;
        self
    }

    /// Override the secondary email lookup endpoint.
    #[must_use]
    pub fn with_emails_url(mut self, url: Url) -> Self {
        self.emails_url = Some(url);
        self
    }

    #[must_use]
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Provider authorization URL carrying the PKCE challenge and `state`.
    pub fn authorization_url(&self, redirect_uri: &str, state: &str, code_challenge: &str) -> Url {
        let scope = self.scopes.join(" ");
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &scope)
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");
        url
    }
}

/// Provider-neutral identity extracted from raw attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedProfile {
    pub provider_subject_id: String,
    pub email: String,
    /// None when the provider supplied no usable name
    pub display_name: Option<String>,
}

impl NormalizedProfile {
    /// Name to use when creating a principal: the provider name or the
    /// email's local part.
    pub fn display_name_or_default(&self) -> String {
        match &self.display_name {
            Some(name) => name.clone(),
            None => self
                .email
                .split_once('@')
                .map_or(self.email.as_str(), |(local, _)| local)
                .to_string(),
        }
    }
}

/// Map provider-specific attributes onto a [`NormalizedProfile`].
pub fn normalize(provider: Provider, attrs: &RawAttributes) -> Result<NormalizedProfile, ProviderError> {
    match provider {
        Provider::Google => {
            let subject = string_attr(attrs, "sub").ok_or(ProviderError::MissingAttribute("sub"))?;
            let email = string_attr(attrs, "email").ok_or(ProviderError::MissingAttribute("email"))?;
            Ok(NormalizedProfile {
                provider_subject_id: subject,
                email,
                display_name: string_attr(attrs, "name"),
            })
        }
        Provider::Github => {
            let subject = string_attr(attrs, "id").ok_or(ProviderError::MissingAttribute("id"))?;
            let email = string_attr(attrs, "email").ok_or(ProviderError::MissingAttribute("email"))?;
            Ok(NormalizedProfile {
                provider_subject_id: subject,
                email,
                display_name: string_attr(attrs, "name").or_else(|| string_attr(attrs, "login")),
            })
        }
        Provider::Local => Err(ProviderError::Unsupported),
    }
}

/// Non-blank string or number attribute.
fn string_attr(attrs: &RawAttributes, key: &str) -> Option<String> {
    match attrs.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
