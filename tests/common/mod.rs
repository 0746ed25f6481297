//! Shared helpers for driving the router in-process.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
    response::IntoResponse,
};
use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, Key};
use lifelogix::{
    ServerConfig,
    auth::TokenLifetimes,
    clock::Clock,
    create_app,
    db::Database,
    oauth::{
        IdentityProvider, OAuthSettings, ProviderError, ProviderRegistration, RawAttributes,
        RedirectPolicy,
    },
    session::SessionStore,
};
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

pub const START_TIME: u64 = 1_700_000_000;
pub const PUBLIC_URL: &str = "http://localhost:8080";
pub const DEFAULT_DESTINATION: &str = "http://localhost:3000/oauth2/redirect";
pub const JWT_SECRET: &[u8] = b"integration-test-secret-of-32-bytes!";

/// Identity provider double: each accepted code maps to a fixed profile.
#[derive(Default)]
pub struct StubIdentityProvider {
    profiles: Mutex<HashMap<String, RawAttributes>>,
    calls: AtomicUsize,
}

impl StubIdentityProvider {
    pub fn accept_code(&self, code: &str, attrs: Value) {
        let Value::Object(attrs) = attrs else {
            panic!("profile must be a JSON object");
        };
        self.profiles.lock().unwrap().insert(code.to_string(), attrs);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for StubIdentityProvider {
    async fn fetch_profile(
        &self,
        _registration: &ProviderRegistration,
        code: &str,
        _code_verifier: &str,
        _redirect_uri: &str,
    ) -> Result<RawAttributes, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.profiles
            .lock()
            .unwrap()
            .get(code)
            .cloned()
            .ok_or(ProviderError::Endpoint {
                operation: "token exchange",
                status: 400,
                detail: "invalid_grant".to_string(),
            })
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: Database,
    pub sessions: SessionStore,
    pub clock: Clock,
    pub identity: Arc<StubIdentityProvider>,
    pub cookie_key: Key,
}

/// App on an in-memory database and session store, with Google configured
/// and GitHub left unconfigured.
pub async fn create_test_app() -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let clock = Clock::manual(START_TIME);
    let sessions = SessionStore::in_memory(clock.clone());
    let identity = Arc::new(StubIdentityProvider::default());
    let cookie_key = Key::generate();

    let default_destination = Url::parse(DEFAULT_DESTINATION).unwrap();
    let config = ServerConfig {
        db: db.clone(),
        sessions: sessions.clone(),
        jwt_secret: JWT_SECRET.to_vec(),
        clock: clock.clone(),
        lifetimes: TokenLifetimes::default(),
        secure_cookies: false,
        oauth: OAuthSettings {
            providers: vec![ProviderRegistration::google("test-client", "test-secret").unwrap()],
            redirects: RedirectPolicy::new(
                vec![default_destination.clone()],
                default_destination,
            ),
            public_url: Url::parse(PUBLIC_URL).unwrap(),
            cookie_key: cookie_key.clone(),
            auth_request_ttl: Duration::from_secs(180),
            exchange_code_ttl: Duration::from_secs(60),
        },
        identity_provider: identity.clone(),
    };

    TestApp {
        router: create_app(&config),
        db,
        sessions,
        clock,
        identity,
        cookie_key,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Register a local principal through the API and return its id.
    pub async fn register(&self, email: &str, password: &str, username: &str) -> i64 {
        let response = self
            .send(json_request(
                "POST",
                "/api/v1/auth/register",
                serde_json::json!({"email": email, "password": password, "username": username}),
            ))
            .await;
        assert_eq!(response.status(), 201);
        body_json(response).await["id"].as_i64().unwrap()
    }

    /// Log in through the API and return `(access_token, refresh_token)`.
    pub async fn login(&self, email: &str, password: &str) -> (String, String) {
        let response = self
            .send(json_request(
                "POST",
                "/api/v1/auth/login",
                serde_json::json!({"email": email, "password": password}),
            ))
            .await;
        assert_eq!(response.status(), 200);
        let json = body_json(response).await;
        (
            json["accessToken"].as_str().unwrap().to_string(),
            json["refreshToken"].as_str().unwrap().to_string(),
        )
    }

    /// Encrypt cookies with the app's key into a `Cookie` request header.
    pub fn private_cookie_header(&self, cookies: &[(&'static str, String)]) -> String {
        let mut jar = PrivateCookieJar::new(self.cookie_key.clone());
        for (name, value) in cookies {
            jar = jar.add(Cookie::new(*name, value.clone()));
        }
        let response = (jar, ()).into_response();
        cookie_header_from(&set_cookies(&response))
    }
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn bearer_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// All `Set-Cookie` header values.
pub fn set_cookies<B>(response: &Response<B>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Value of the first `Set-Cookie` for `name`.
pub fn set_cookie_value(set_cookies: &[String], name: &str) -> Option<String> {
    set_cookies.iter().find_map(|c| {
        let (pair, _) = c.split_once(';').unwrap_or((c.as_str(), ""));
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Whether `Set-Cookie` expires `name`.
pub fn has_cleared_cookie(set_cookies: &[String], name: &str) -> bool {
    set_cookies
        .iter()
        .any(|c| c.starts_with(&format!("{}=", name)) && c.contains("Max-Age=0"))
}

/// Turn `Set-Cookie` values into a `Cookie` request header.
pub fn cookie_header_from(set_cookies: &[String]) -> String {
    set_cookies
        .iter()
        .filter_map(|c| c.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn location<B>(response: &Response<B>) -> Option<Url> {
    response
        .headers()
        .get(header::LOCATION)
        .map(|v| Url::parse(v.to_str().unwrap()).unwrap())
}

pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
