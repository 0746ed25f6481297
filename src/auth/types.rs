//! Authentication user types.

/// Principal identified by a valid access token.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedPrincipal {
    /// Principal id from the token subject
    pub principal_id: i64,
}
