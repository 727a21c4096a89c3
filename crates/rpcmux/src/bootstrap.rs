//! Startup orchestration: configuration, telemetry and the registration pass.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use rpcmux_config::Config;
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::{Authenticator, Authorizer};
use crate::dispatch::Dispatcher;
use crate::introspection;
use crate::registry::{ProcedureDeclaration, Registry, RegistryError};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Tracing target for startup events.
const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Loads the endpoint configuration; abstracted for tests.
pub trait ConfigLoader: Send + Sync {
    /// Loads the configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader error when any configuration layer is invalid.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// A procedure declaration was rejected.
    #[error("failed to register procedures: {source}")]
    Registration {
        /// Registry error for the offending declaration.
        #[source]
        source: RegistryError,
    },
}

/// External collaborators consulted while serving.
#[derive(Clone)]
pub struct Collaborators {
    authorizer: Arc<dyn Authorizer>,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl Collaborators {
    /// Collaborators with an authorizer and no login backend.
    #[must_use]
    pub fn new(authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            authorizer,
            authenticator: None,
        }
    }

    /// Adds the backend for `system.login` and `system.logout`.
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("has_authenticator", &self.authenticator.is_some())
            .finish_non_exhaustive()
    }
}

/// A configured endpoint ready to serve requests.
#[derive(Debug)]
pub struct Endpoint {
    config: Config,
    dispatcher: Dispatcher,
    telemetry: TelemetryHandle,
}

impl Endpoint {
    /// Resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Dispatcher serving the registry.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Telemetry handle, mainly useful in tests.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Releases the dispatcher, typically to wrap it in an [`Arc`].
    #[must_use]
    pub fn into_dispatcher(self) -> Dispatcher {
        self.dispatcher
    }
}

/// Runs the registration pass: built-ins first, then `declarations` in order.
///
/// Declarations named in `disabled_methods` are skipped. `login_available`
/// reports whether an authenticator will back `system.login`.
///
/// # Errors
///
/// Returns the first [`RegistryError`]; startup must not continue with a
/// partially registered set.
pub fn build_registry<I>(
    config: &Config,
    declarations: I,
    login_available: bool,
) -> Result<Registry, RegistryError>
where
    I: IntoIterator<Item = ProcedureDeclaration>,
{
    let mut registry = Registry::new();
    introspection::install(&mut registry, config, login_available)?;
    for declaration in declarations {
        if config.is_method_disabled(declaration.name()) {
            info!(
                target: BOOTSTRAP_TARGET,
                method = declaration.name(),
                "skipping disabled procedure"
            );
            continue;
        }
        registry.register(declaration)?;
    }
    Ok(registry)
}

/// Builds a dispatcher from an already loaded configuration.
///
/// # Errors
///
/// Returns [`RegistryError`] when any declaration is rejected.
pub fn build_dispatcher<I>(
    config: &Config,
    declarations: I,
    collaborators: Collaborators,
) -> Result<Dispatcher, RegistryError>
where
    I: IntoIterator<Item = ProcedureDeclaration>,
{
    let Collaborators {
        authorizer,
        authenticator,
    } = collaborators;
    let registry = build_registry(config, declarations, authenticator.is_some())?;
    let dispatcher = Dispatcher::new(registry, config, authorizer);
    Ok(match authenticator {
        Some(backend) => dispatcher.with_authenticator(backend),
        None => dispatcher,
    })
}

/// Bootstraps the endpoint using the supplied configuration loader.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration, telemetry or registration
/// fails.
pub fn bootstrap_with<I>(
    loader: &dyn ConfigLoader,
    declarations: I,
    collaborators: Collaborators,
) -> Result<Endpoint, BootstrapError>
where
    I: IntoIterator<Item = ProcedureDeclaration>,
{
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;

    let dispatcher = build_dispatcher(&config, declarations, collaborators).map_err(|source| {
        warn!(target: BOOTSTRAP_TARGET, error = %source, "registration failed");
        BootstrapError::Registration { source }
    })?;
    info!(
        target: BOOTSTRAP_TARGET,
        procedures = dispatcher.registry().len(),
        json = !config.disable_json,
        xml = !config.disable_xml,
        "endpoint ready"
    );

    Ok(Endpoint {
        config,
        dispatcher,
        telemetry,
    })
}

/// Bootstraps the endpoint from the process configuration layers.
///
/// # Errors
///
/// See [`bootstrap_with`].
pub fn bootstrap<I>(declarations: I, collaborators: Collaborators) -> Result<Endpoint, BootstrapError>
where
    I: IntoIterator<Item = ProcedureDeclaration>,
{
    bootstrap_with(&SystemConfigLoader, declarations, collaborators)
}
