//! Shared configuration for the Parley chat relay.
//!
//! [`Config`] is resolved by `ortho_config` from, in increasing precedence:
//! built-in defaults, a TOML file named by `--config-path` or
//! `PARLEY_CONFIG_PATH`, `PARLEY_*` environment variables, and command-line
//! flags.

mod defaults;
mod logging;

use std::net::SocketAddr;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_PORT, default_host, default_log_filter,
    default_log_filter_string, default_log_format, default_port,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "PARLEY")]
pub struct Config {
    /// Host name or address the listener binds.
    #[ortho_config(default = default_host())]
    pub host: String,
    /// TCP port the listener binds.
    #[ortho_config(default = DEFAULT_PORT)]
    pub port: u16,
    /// Tracing filter expression, in `EnvFilter` syntax.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for structured logs.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Host name or address the listener binds.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port the listener binds.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Output format for structured logs.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Human-readable `host:port` pair, used in log fields.
    ///
    /// This is not resolved; use the listener to obtain a [`SocketAddr`].
    #[must_use]
    pub fn endpoint(&self) -> String {
        match self.host.parse::<std::net::IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.port).to_string(),
            Err(_) => format!("{}:{}", self.host, self.port),
        }
    }
}
