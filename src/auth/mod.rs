//! Local authentication and the token lifecycle.
//!
//! Access tokens are stateless bearer JWTs. Refresh tokens are JWTs mirrored
//! in the session store under the principal id, one live token per principal.

mod cookie;
mod errors;
mod exchange;
mod extractors;
mod issuer;
mod password;
mod state;
mod types;

pub use cookie::{REFRESH_COOKIE_NAME, clear_refresh_cookie, get_cookie, refresh_cookie};
pub use errors::{ApiAuthError, AuthError};
pub use exchange::{EXCHANGE_CODE_DURATION_SECS, mint_exchange_code, redeem_exchange_code};
pub use extractors::{BearerAuth, bearer_token};
pub use issuer::{
    ACCESS_TOKEN_DURATION_SECS, REFRESH_TOKEN_DURATION_SECS, TokenIssuer, TokenLifetimes,
    TokenPair,
};
pub use password::{hash_password, login, register, verify_password};
pub use state::HasAuthBackend;
pub use types::AuthenticatedPrincipal;
