//! Origin trust decision (pure, allocation-free).
//!
//! Matching rules, all exact (no case folding, no trimming):
//! - no origin (or an empty one) => trusted, covers non-browser callers
//! - `http(s)://localhost[:port]` / `http(s)://127.0.0.1[:port]`
//! - the configured frontend URL, by string equality
//! - the in-cluster frontend service origin
//!
//! The rules are disjoint. Keep them that way when adding one.

/// Origin used by the frontend service for intra-cluster calls.
pub const INTERNAL_FRONTEND_ORIGIN: &str = "http://frontend-service:3000";

const LOOPBACK_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

/// Outcome of an origin check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginDecision {
    Allow,
    Deny,
}

impl OriginDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, OriginDecision::Allow)
    }
}

/// Origin policy bound to the configured frontend URL.
/// Construct once at startup, then share (it is `Clone` and immutable).
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    frontend_url: Option<String>,
}

impl OriginPolicy {
    pub fn new(frontend_url: Option<String>) -> Self {
        Self {
            frontend_url: frontend_url.filter(|u| !u.is_empty()),
        }
    }

    pub fn frontend_url(&self) -> Option<&str> {
        self.frontend_url.as_deref()
    }

    pub fn evaluate(&self, origin: Option<&str>) -> OriginDecision {
        evaluate(origin, self.frontend_url.as_deref())
    }
}

/// Decide whether `origin` may reach the application.
pub fn evaluate(origin: Option<&str>, frontend_url: Option<&str>) -> OriginDecision {
    let origin = match origin {
        None | Some("") => return OriginDecision::Allow,
        Some(o) => o,
    };

    if is_loopback_origin(origin) {
        return OriginDecision::Allow;
    }

    if let Some(frontend) = frontend_url {
        if !frontend.is_empty() && origin == frontend {
            return OriginDecision::Allow;
        }
    }

    if origin == INTERNAL_FRONTEND_ORIGIN {
        return OriginDecision::Allow;
    }

    OriginDecision::Deny
}

/// `^https?://(localhost|127\.0\.0\.1)(:[0-9]+)?$`
pub fn is_loopback_origin(origin: &str) -> bool {
    let Some(rest) = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
    else {
        return false;
    };

    let Some(port) = LOOPBACK_HOSTS
        .iter()
        .find_map(|host| rest.strip_prefix(host))
    else {
        return false;
    };

    match port.strip_prefix(':') {
        None => port.is_empty(),
        Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
    }
}
