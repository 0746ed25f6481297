//! Token pair issuance, rotation and revocation.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::errors::AuthError;
use crate::db::{Database, Principal};
use crate::jwt::{JwtConfig, TokenType};
use crate::session::SessionStore;

/// Default access token lifetime: 30 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 30 * 60;

/// Default refresh token lifetime: 2 weeks
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 14 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::from_secs(ACCESS_TOKEN_DURATION_SECS),
            refresh: Duration::from_secs(REFRESH_TOKEN_DURATION_SECS),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(skip)]
    pub refresh_max_age: u64,
}

/// Mints token pairs and owns the server-side refresh entry.
///
/// Every issuance overwrites `refresh:{id}`, so the newest pair is the only
/// one whose refresh token is accepted.
#[derive(Clone)]
pub struct TokenIssuer {
    jwt: Arc<JwtConfig>,
    sessions: SessionStore,
    db: Database,
    lifetimes: TokenLifetimes,
}

impl TokenIssuer {
    pub fn new(
        jwt: Arc<JwtConfig>,
        sessions: SessionStore,
        db: Database,
        lifetimes: TokenLifetimes,
    ) -> Self {
        Self {
            jwt,
            sessions,
            db,
            lifetimes,
        }
    }

    pub fn jwt(&self) -> &JwtConfig {
        &self.jwt
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    /// Issue a fresh pair for `principal` and make its refresh token the
    /// only valid one.
    pub async fn issue_for(&self, principal: &Principal) -> Result<TokenPair, AuthError> {
        let pair = self.mint_pair(principal.id)?;

        self.sessions
            .refresh_tokens()
            .set(principal.id, &pair.refresh_token, self.lifetimes.refresh)
            .await?;

        Ok(pair)
    }

    /// Exchange the current refresh token for a new pair. Both tokens rotate.
    ///
    /// The stored token is swapped in one store operation, so when several
    /// requests present the same token only one of them gets a pair.
    pub async fn rotate(&self, presented: &str) -> Result<TokenPair, AuthError> {
        let verified = self
            .jwt
            .validate_refresh_token(presented)
            .map_err(|_| AuthError::TokenInvalid)?;
        let principal_id = verified.principal_id;

        let principal = self
            .db
            .principals()
            .get_by_id(principal_id)
            .await?
            .ok_or(AuthError::PrincipalNotFound(principal_id))?;

        let pair = self.mint_pair(principal.id)?;
        let rotated = self
            .sessions
            .refresh_tokens()
            .rotate(
                principal.id,
                presented,
                &pair.refresh_token,
                self.lifetimes.refresh,
            )
            .await?;

        if !rotated {
            warn!(principal_id, "Superseded refresh token presented");
            return Err(AuthError::TokenInvalid);
        }

        Ok(pair)
    }

    fn mint_pair(&self, principal_id: i64) -> Result<TokenPair, AuthError> {
        let access = self
            .jwt
            .issue(principal_id, TokenType::Access, self.lifetimes.access)?;
        let refresh = self
            .jwt
            .issue(principal_id, TokenType::Refresh, self.lifetimes.refresh)?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            refresh_max_age: refresh.duration,
        })
    }

    /// Drop the principal's refresh entry. Idempotent.
    pub async fn revoke(&self, principal_id: i64) -> Result<(), AuthError> {
        let removed = self.sessions.refresh_tokens().revoke(principal_id).await?;
        if removed {
            info!(principal_id, "Refresh session revoked");
        }
        Ok(())
    }
}
