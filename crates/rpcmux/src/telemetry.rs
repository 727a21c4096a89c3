//! Global `tracing` subscriber installation.
//!
//! Embedding applications that install their own subscriber can skip this
//! module entirely; the library only emits events.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use rpcmux_config::{Config, LogFormat};
use tracing::Subscriber;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};

static SUBSCRIBER_INSTALLED: OnceCell<()> = OnceCell::new();

/// Proof that telemetry was initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter expression did not parse.
    #[error("invalid log filter {filter:?}: {message}")]
    Filter {
        /// Filter expression from the configuration.
        filter: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Another global subscriber was already installed.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[source] SetGlobalDefaultError),
}

/// Installs the global subscriber on first use.
///
/// Later calls return a handle without reconfiguring anything, so the first
/// configuration wins for the lifetime of the process.
///
/// # Errors
///
/// Returns [`TelemetryError`] when the filter is invalid or a foreign
/// subscriber is already installed.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    SUBSCRIBER_INSTALLED
        .get_or_try_init(|| {
            let subscriber = build_subscriber(config)?;
            tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
        })
        .map(|&()| TelemetryHandle)
}

fn build_subscriber(config: &Config) -> Result<Box<dyn Subscriber + Send + Sync>, TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter()).map_err(|error| TelemetryError::Filter {
        filter: config.log_filter().to_owned(),
        message: error.to_string(),
    })?;

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(uses_colour(config.log_format(), io::stderr().is_terminal()))
        .with_timer(UtcTime::rfc_3339());

    Ok(match config.log_format() {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
        LogFormat::Pretty => Box::new(builder.pretty().finish()),
    })
}

/// Colour codes only go to terminals, and never into structured records.
const fn uses_colour(format: LogFormat, terminal: bool) -> bool {
    terminal && !format.is_structured()
}
