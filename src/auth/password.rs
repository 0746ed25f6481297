//! Email + password registration and login.

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use rand::RngCore;
use std::sync::LazyLock;
use tracing::info;

use super::errors::AuthError;
use super::issuer::{TokenIssuer, TokenPair};
use crate::db::{Database, Principal, is_unique_violation};

/// Hash checked when no stored hash exists, so a miss costs the same as a
/// wrong password.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("lifelogix-no-such-account").ok());

/// Hash a password into an Argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let mut salt = [0u8; 16];
    rand::rng().fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt).map_err(|e| AuthError::PasswordHash(e.to_string()))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::PasswordHash(e.to_string()))
}

/// Compare a password against a stored hash. An unparseable hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Create a local principal.
pub async fn register(
    db: &Database,
    email: &str,
    password: &str,
    display_name: &str,
) -> Result<Principal, AuthError> {
    if db.principals().get_by_email(email).await?.is_some() {
        return Err(AuthError::EmailTaken);
    }

    let hash = hash_password(password)?;
    let id = match db.principals().create_local(email, &hash, display_name).await {
        Ok(id) => id,
        Err(e) if is_unique_violation(&e) => return Err(AuthError::EmailTaken),
        Err(e) => return Err(e.into()),
    };

    info!(principal_id = id, "Registered local principal");

    db.principals()
        .get_by_id(id)
        .await?
        .ok_or(AuthError::PrincipalNotFound(id))
}

/// Verify credentials and issue a token pair.
///
/// Unknown email, wrong password and password-less (third-party) accounts
/// all fail with the same `AuthenticationFailed`.
pub async fn login(
    issuer: &TokenIssuer,
    email: &str,
    password: &str,
) -> Result<(Principal, TokenPair), AuthError> {
    let principal = issuer
        .db()
        .principals()
        .get_by_email(email)
        .await?
        .filter(|p| p.password_hash.is_some());

    let Some(principal) = principal else {
        if let Some(dummy) = DUMMY_HASH.as_deref() {
            let _ = verify_password(password, dummy);
        }
        return Err(AuthError::AuthenticationFailed);
    };

    let matches = principal
        .password_hash
        .as_deref()
        .is_some_and(|hash| verify_password(password, hash));
    if !matches {
        return Err(AuthError::AuthenticationFailed);
    }

    let pair = issuer.issue_for(&principal).await?;
    info!(principal_id = principal.id, "Password login succeeded");
    Ok((principal, pair))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenLifetimes;
    use crate::clock::Clock;
    use crate::db::Provider;
    use crate::jwt::JwtConfig;
    use crate::session::SessionStore;
    use std::sync::Arc;

    async fn issuer() -> TokenIssuer {
        let clock = Clock::manual(1_700_000_000);
        TokenIssuer::new(
            Arc::new(JwtConfig::with_clock(b"password-test-secret", clock.clone())),
            SessionStore::in_memory(clock),
            Database::open(":memory:").await.unwrap(),
            TokenLifetimes::default(),
        )
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("secret").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("secret", &hash));
        assert!(!verify_password("Secret", &hash));
        assert!(!verify_password("secret", "not-a-phc-string"));
    }

    #[test]
    fn test_hashes_are_salted() {
        assert_ne!(hash_password("secret").unwrap(), hash_password("secret").unwrap());
    }

    #[test]
    fn test_dummy_hash_is_a_real_argon2_hash() {
        let dummy = DUMMY_HASH.as_deref().unwrap();
        assert!(PasswordHash::new(dummy).is_ok());
        assert!(!verify_password("", dummy));
        assert!(!verify_password("password", dummy));
    }

    #[tokio::test]
    async fn test_login_unknown_email() {
        let issuer = issuer().await;
        let result = login(&issuer, "a@x.com", "secret").await;
        assert!(matches!(result, Err(AuthError::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let issuer = issuer().await;
        let principal = register(issuer.db(), "a@x.com", "secret", "alice")
            .await
            .unwrap();
        assert_eq!(principal.provider, Provider::Local);

        let wrong = login(&issuer, "a@x.com", "wrong").await;
        assert!(matches!(wrong, Err(AuthError::AuthenticationFailed)));

        let (logged_in, pair) = login(&issuer, "a@x.com", "secret").await.unwrap();
        assert_eq!(logged_in.id, principal.id);
        assert!(!pair.access_token.is_empty());

        let stored = issuer
            .sessions()
            .refresh_tokens()
            .current(principal.id)
            .await
            .unwrap();
        assert_eq!(stored, Some(pair.refresh_token));
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let issuer = issuer().await;
        register(issuer.db(), "a@x.com", "secret", "alice")
            .await
            .unwrap();

        let result = register(issuer.db(), "A@X.com", "other", "alice2").await;
        assert!(matches!(result, Err(AuthError::EmailTaken)));
    }

    #[tokio::test]
    async fn test_third_party_account_cannot_password_login() {
        let issuer = issuer().await;
        issuer
            .db()
            .principals()
            .create_external(Provider::Google, "g-1", "a@x.com", "Alice")
            .await
            .unwrap();

        let result = login(&issuer, "a@x.com", "").await;
        assert!(matches!(result, Err(AuthError::AuthenticationFailed)));
    }
}
