//! Allow-list for post-login destinations.

use url::Url;

use crate::auth::AuthError;

/// Destinations the browser may be sent back to after third-party login.
///
/// A candidate matches an entry when scheme, host (case-insensitive) and
/// effective port agree. Paths are not constrained.
#[derive(Debug, Clone)]
pub struct RedirectPolicy {
    allowed: Vec<Url>,
    default_destination: Url,
}

impl RedirectPolicy {
    pub fn new(allowed: Vec<Url>, default_destination: Url) -> Self {
        Self {
            allowed,
            default_destination,
        }
    }

    pub fn default_destination(&self) -> &Url {
        &self.default_destination
    }

    pub fn is_authorized(&self, candidate: &Url) -> bool {
        self.allowed.iter().any(|allowed| same_origin(allowed, candidate))
    }

    /// Pick the destination for a callback: the requested one if present,
    /// else the default. Either must be on the allow-list.
    pub fn resolve(&self, requested: Option<&str>) -> Result<Url, AuthError> {
        let destination = match requested.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Url::parse(raw).map_err(|_| AuthError::UnauthorizedRedirect)?,
            None => self.default_destination.clone(),
        };

        if self.is_authorized(&destination) {
            Ok(destination)
        } else {
            Err(AuthError::UnauthorizedRedirect)
        }
    }
}

fn same_origin(a: &Url, b: &Url) -> bool {
    let hosts_match = match (a.host_str(), b.host_str()) {
        (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
        _ => false,
    };
    hosts_match
        && a.scheme() == b.scheme()
        && a.port_or_known_default() == b.port_or_known_default()
}

/// Append `code` to `destination`, keeping any existing query.
pub fn with_exchange_code(destination: &Url, code: &str) -> Url {
    let mut url = destination.clone();
    url.query_pairs_mut().append_pair("code", code);
    url
}
