//! Cross-origin metadata handed to the transport layer.
//!
//! The dispatcher never writes HTTP headers itself. It exposes the configured
//! policy so whichever server fronts it can answer preflight requests and
//! decorate RPC responses consistently.

use serde::{Deserialize, Serialize};

/// Methods advertised in `Access-Control-Allow-Methods`.
pub const PREFLIGHT_ALLOW_METHODS: &str = "POST, GET, OPTIONS";

/// Allowed origin and credential policy for cross-origin callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CrossOriginPolicy {
    allow_origin: String,
    allow_credentials: bool,
}

impl CrossOriginPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(allow_origin: String, allow_credentials: bool) -> Self {
        Self {
            allow_origin,
            allow_credentials,
        }
    }

    /// Origin echoed in `Access-Control-Allow-Origin`; empty when unset.
    #[must_use]
    pub fn allow_origin(&self) -> &str {
        self.allow_origin.as_str()
    }

    /// Whether `Access-Control-Allow-Credentials` is `true`.
    #[must_use]
    pub const fn allow_credentials(&self) -> bool {
        self.allow_credentials
    }

    /// Header set answering an `OPTIONS` preflight.
    ///
    /// `requested_headers` is the caller's `Access-Control-Request-Headers`
    /// value, which is echoed back verbatim.
    #[must_use]
    pub fn preflight_headers(&self, requested_headers: Option<&str>) -> Vec<(&'static str, String)> {
        vec![
            (
                "Access-Control-Allow-Methods",
                PREFLIGHT_ALLOW_METHODS.to_owned(),
            ),
            ("Access-Control-Max-Age", String::from("0")),
            (
                "Access-Control-Allow-Credentials",
                self.allow_credentials.to_string(),
            ),
            ("Access-Control-Allow-Origin", self.allow_origin.clone()),
            (
                "Access-Control-Allow-Headers",
                requested_headers.unwrap_or_default().to_owned(),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preflight_echoes_requested_headers() {
        let policy = CrossOriginPolicy::new(String::from("*"), false);
        let headers = policy.preflight_headers(Some("content-type"));

        assert!(headers.contains(&("Access-Control-Allow-Origin", String::from("*"))));
        assert!(headers.contains(&("Access-Control-Allow-Credentials", String::from("false"))));
        assert!(headers.contains(&("Access-Control-Allow-Headers", String::from("content-type"))));
        assert!(headers.contains(&("Access-Control-Max-Age", String::from("0"))));
    }

    #[test]
    fn preflight_without_requested_headers_sends_empty_value() {
        let policy = CrossOriginPolicy::default();
        let headers = policy.preflight_headers(None);
        assert!(headers.contains(&("Access-Control-Allow-Headers", String::new())));
    }
}
