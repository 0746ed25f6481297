//! Single-use exchange codes handed to the browser after third-party login.

use std::time::Duration;
use tracing::info;

use super::errors::AuthError;
use super::issuer::{TokenIssuer, TokenPair};
use crate::db::Principal;

/// Default exchange code lifetime: 1 minute
pub const EXCHANGE_CODE_DURATION_SECS: u64 = 60;

/// Mint a random code that resolves to `principal_id` once, within `ttl`.
pub async fn mint_exchange_code(
    issuer: &TokenIssuer,
    principal_id: i64,
    ttl: Duration,
) -> Result<String, AuthError> {
    let code = uuid::Uuid::new_v4().to_string();
    issuer
        .sessions()
        .exchange_codes()
        .store(&code, principal_id, ttl)
        .await?;
    Ok(code)
}

/// Consume `code` and issue a token pair for the principal it names.
///
/// The code is gone after this call whatever the outcome.
pub async fn redeem_exchange_code(
    issuer: &TokenIssuer,
    code: &str,
) -> Result<(Principal, TokenPair), AuthError> {
    let principal_id = issuer
        .sessions()
        .exchange_codes()
        .take(code)
        .await?
        .ok_or(AuthError::InvalidOrExpiredCode)?;

    let principal = issuer
        .db()
        .principals()
        .get_by_id(principal_id)
        .await?
        .ok_or(AuthError::PrincipalNotFound(principal_id))?;

    let pair = issuer.issue_for(&principal).await?;
    info!(principal_id, "Exchange code redeemed");
    Ok((principal, pair))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenLifetimes;
    use crate::clock::Clock;
    use crate::db::Database;
    use crate::jwt::JwtConfig;
    use crate::session::SessionStore;
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(EXCHANGE_CODE_DURATION_SECS);

    async fn setup() -> (TokenIssuer, i64, Clock) {
        let clock = Clock::manual(1_700_000_000);
        let db = Database::open(":memory:").await.unwrap();
        let id = db
            .principals()
            .create_local("a@x.com", "hash", "alice")
            .await
            .unwrap();
        let issuer = TokenIssuer::new(
            Arc::new(JwtConfig::with_clock(b"exchange-test-secret", clock.clone())),
            SessionStore::in_memory(clock.clone()),
            db,
            TokenLifetimes::default(),
        );
        (issuer, id, clock)
    }

    #[tokio::test]
    async fn test_code_redeems_once() {
        let (issuer, id, _) = setup().await;
        let code = mint_exchange_code(&issuer, id, TTL).await.unwrap();

        let (principal, pair) = redeem_exchange_code(&issuer, &code).await.unwrap();
        assert_eq!(principal.id, id);
        assert!(issuer.rotate(&pair.refresh_token).await.is_ok());

        assert!(matches!(
            redeem_exchange_code(&issuer, &code).await,
            Err(AuthError::InvalidOrExpiredCode)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_redemption_has_one_winner() {
        let (issuer, id, _) = setup().await;
        let code = mint_exchange_code(&issuer, id, TTL).await.unwrap();

        let attempts = (0..8).map(|_| redeem_exchange_code(&issuer, &code));
        let results = futures::future::join_all(attempts).await;

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(AuthError::InvalidOrExpiredCode)))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(rejected, 7);
    }

    #[tokio::test]
    async fn test_code_expires() {
        let (issuer, id, clock) = setup().await;
        let code = mint_exchange_code(&issuer, id, TTL).await.unwrap();

        clock.advance(EXCHANGE_CODE_DURATION_SECS);

        assert!(matches!(
            redeem_exchange_code(&issuer, &code).await,
            Err(AuthError::InvalidOrExpiredCode)
        ));
    }

    #[tokio::test]
    async fn test_code_for_missing_principal() {
        let (issuer, _, _) = setup().await;
        let code = mint_exchange_code(&issuer, 9999, TTL).await.unwrap();

        assert!(matches!(
            redeem_exchange_code(&issuer, &code).await,
            Err(AuthError::PrincipalNotFound(9999))
        ));
        // Consumed even though redemption failed
        assert!(matches!(
            redeem_exchange_code(&issuer, &code).await,
            Err(AuthError::InvalidOrExpiredCode)
        ));
    }
}
