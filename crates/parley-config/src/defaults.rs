/// Port the relay listens on when nothing else is configured.
pub const DEFAULT_PORT: u16 = 11000;

/// Interface the relay binds by default: every IPv4 address.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default interface as an owned value for serde and `ortho_config`.
#[must_use]
pub fn default_host() -> String {
    DEFAULT_HOST.to_owned()
}

/// Default listening port.
#[must_use]
pub const fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Compact
}
