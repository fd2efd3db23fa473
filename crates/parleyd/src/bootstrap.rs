//! Process entry: configuration, telemetry, and the serving loop.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;
use tracing::{error, info};

use parley_config::Config;

use crate::chat::ChatServer;
use crate::telemetry::{self, TelemetryError};
use crate::transport::{ConnectionHandler, ListenerError, ListenerHandle, SocketListener};

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the relay configuration.
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

/// Loader that returns a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config` so it can be passed where a loader is expected.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors that stop the relay process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Config {
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
    /// Binding or running the listener failed.
    #[error("listener failed: {source}")]
    Listener {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
}

impl From<Arc<OrthoError>> for LaunchError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Config { source }
    }
}

impl From<TelemetryError> for LaunchError {
    fn from(source: TelemetryError) -> Self {
        Self::Telemetry { source }
    }
}

impl From<ListenerError> for LaunchError {
    fn from(source: ListenerError) -> Self {
        Self::Listener { source }
    }
}

/// Binds `host:port` and starts dispatching each accepted connection to
/// `handler` on its own thread.
pub fn start_server(
    handler: Arc<dyn ConnectionHandler>,
    host: &str,
    port: u16,
) -> Result<ListenerHandle, ListenerError> {
    SocketListener::bind(host, port)?.start(handler)
}

/// Loads configuration, initialises telemetry, and serves chat sessions.
///
/// Under normal operation this blocks for the life of the process. It
/// returns only when the listener fails; live sessions are not drained.
pub fn run_server(loader: &dyn ConfigLoader) -> Result<(), LaunchError> {
    let config = loader.load()?;
    telemetry::initialise(&config)?;

    let server = Arc::new(ChatServer::new());
    let handle = start_server(server, config.host(), config.port()).inspect_err(|error| {
        error!(
            target: PROCESS_TARGET,
            endpoint = %config.endpoint(),
            error = %error,
            "failed to start listener"
        );
    })?;
    info!(
        target: PROCESS_TARGET,
        endpoint = %config.endpoint(),
        "chat relay running"
    );

    handle.join().inspect_err(|error| {
        error!(
            target: PROCESS_TARGET,
            error = %error,
            "listener stopped"
        );
    })?;
    Ok(())
}
