//! Default values shared by serde and `Config::default`.

use crate::logging::LogFormat;

/// Filter applied when none is configured.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned copy of [`DEFAULT_LOG_FILTER`] for serde defaults.
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Request and response bodies are logged unless switched off.
#[must_use]
pub const fn default_log_requests() -> bool {
    true
}

/// Out-of-the-box login stays off until an operator opts in.
#[must_use]
pub const fn default_disable_login() -> bool {
    true
}
