//! JWT token generation and validation.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::clock::Clock;

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token, never stored server-side
    Access,
    /// Long-lived refresh token, mirrored in the session store
    Refresh,
}

/// JWT claims shared by access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (principal id)
    pub sub: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// JWT ID, keeps two tokens minted in the same second distinct
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Decoded, verified token contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub principal_id: i64,
    pub token_type: TokenType,
    pub issued_at: u64,
    pub expires_at: u64,
}

/// Result of issuing a token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    clock: Clock,
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret.
    pub fn new(secret: &[u8]) -> Self {
        Self::with_clock(secret, Clock::System)
    }

    /// Create a JWT configuration that reads time from `clock`.
    pub fn with_clock(secret: &[u8], clock: Clock) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            clock,
        }
    }

    /// Sign a token for `principal_id` that expires `ttl` from now.
    pub fn issue(
        &self,
        principal_id: i64,
        token_type: TokenType,
        ttl: Duration,
    ) -> Result<IssuedToken, JwtError> {
        let now = self.clock.now_secs();
        let duration = ttl.as_secs();
        let exp = now
            .checked_add(duration)
            .ok_or(JwtError::LifetimeOverflow(duration))?;

        let claims = Claims {
            sub: principal_id.to_string(),
            token_type,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            issued_at: now,
            expires_at: exp,
            duration,
        })
    }

    /// Verify signature and expiry of any token issued by this config.
    ///
    /// Expiry is checked against the configured clock: a token is expired
    /// once `now > exp`.
    pub fn decode(&self, token: &str) -> Result<VerifiedToken, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;

        let token_data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| JwtError::Malformed(e.to_string()))?;
        let claims = token_data.claims;

        if self.clock.now_secs() > claims.exp {
            return Err(JwtError::Expired);
        }

        let principal_id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| JwtError::Malformed("subject is not a principal id".into()))?;

        Ok(VerifiedToken {
            principal_id,
            token_type: claims.token_type,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }

    /// Validate and decode an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<VerifiedToken, JwtError> {
        self.decode_as(token, TokenType::Access)
    }

    /// Validate and decode a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<VerifiedToken, JwtError> {
        self.decode_as(token, TokenType::Refresh)
    }

    fn decode_as(&self, token: &str, expected: TokenType) -> Result<VerifiedToken, JwtError> {
        let verified = self.decode(token)?;
        if verified.token_type != expected {
            return Err(JwtError::WrongTokenType);
        }
        Ok(verified)
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Signature or structure did not verify
    Malformed(String),
    /// Signature is valid but the token is past its expiry
    Expired,
    /// Wrong token type (e.g., using refresh token as access token)
    WrongTokenType,
    /// Expiry does not fit in a Unix timestamp
    LifetimeOverflow(u64),
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Malformed(reason) => write!(f, "Malformed token: {}", reason),
            JwtError::Expired => write!(f, "Token expired"),
            JwtError::WrongTokenType => write!(f, "Wrong token type"),
            JwtError::LifetimeOverflow(secs) => {
                write!(f, "Token lifetime of {} seconds overflows expiry", secs)
            }
        }
    }
}

impl std::error::Error for JwtError {}
