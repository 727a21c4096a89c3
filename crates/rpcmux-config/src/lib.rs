//! Administrative configuration for the rpcmux endpoint.
//!
//! [`Config`] is loaded through `ortho_config`, which layers built-in
//! defaults, an optional TOML file (`--config-path` or
//! `RPCMUX_CONFIG_PATH`), `RPCMUX_*` environment variables and command-line
//! flags, in increasing order of precedence.
//!
//! The toggles here are consumed once at startup: the protocol switches by
//! the sniffer, the introspection and login switches by the registry
//! bootstrap, and the cross-origin values by the outer transport layer via
//! [`CrossOriginPolicy`]. Nothing in this crate is consulted per request.

mod cors;
mod defaults;
mod logging;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use cors::{CrossOriginPolicy, PREFLIGHT_ALLOW_METHODS};
pub use defaults::{
    DEFAULT_LOG_FILTER, default_disable_login, default_log_filter, default_log_filter_string,
    default_log_format, default_log_requests,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "RPCMUX")]
pub struct Config {
    /// Tracing filter expression, for example `info` or `rpcmux=debug`.
    #[serde(default = "defaults::default_log_filter_string")]
    pub log_filter: String,
    /// Output format for structured logs.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
    /// Log raw request and response bodies at debug level.
    #[serde(default = "defaults::default_log_requests")]
    pub log_requests: bool,
    /// Never serve JSON-RPC, even when a request is detected as JSON.
    #[serde(default)]
    pub disable_json: bool,
    /// Never serve XML-RPC, even when a request is detected as XML.
    #[serde(default)]
    pub disable_xml: bool,
    /// Remove every `system.*` built-in from the registry.
    #[serde(default)]
    pub disable_introspection: bool,
    /// Remove `system.multicall` from the registry.
    #[serde(default)]
    pub disable_multicall: bool,
    /// Remove `system.login` and `system.logout` from the registry.
    #[serde(default = "defaults::default_disable_login")]
    pub disable_login: bool,
    /// Return Markdown documentation verbatim instead of rendering it to HTML.
    #[serde(default)]
    pub disable_help_rendering: bool,
    /// Permission token required by the introspection built-ins.
    #[serde(default)]
    pub introspection_permission: Option<String>,
    /// Procedure names skipped during registration.
    #[serde(default)]
    pub disabled_methods: Vec<String>,
    /// Endpoint URL advertised by `system.describe`.
    #[serde(default)]
    pub service_url: String,
    /// Value for the `Access-Control-Allow-Origin` response header.
    #[serde(default)]
    pub cors_allow_origin: String,
    /// Whether cross-origin requests may carry credentials.
    #[serde(default)]
    pub cors_allow_credentials: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            log_requests: default_log_requests(),
            disable_json: false,
            disable_xml: false,
            disable_introspection: false,
            disable_multicall: false,
            disable_login: default_disable_login(),
            disable_help_rendering: false,
            introspection_permission: None,
            disabled_methods: Vec::new(),
            service_url: String::new(),
            cors_allow_origin: String::new(),
            cors_allow_credentials: false,
        }
    }
}

impl Config {
    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Whether the given procedure name was administratively disabled.
    #[must_use]
    pub fn is_method_disabled(&self, name: &str) -> bool {
        self.disabled_methods.iter().any(|disabled| disabled == name)
    }

    /// Cross-origin metadata for the transport layer.
    #[must_use]
    pub fn cross_origin(&self) -> CrossOriginPolicy {
        CrossOriginPolicy::new(self.cors_allow_origin.clone(), self.cors_allow_credentials)
    }
}
