//! Parley: a line-oriented chat relay.
//!
//! Clients connect over TCP, send a display name as their first line, and
//! every later line is relayed to all other connected clients prefixed with
//! that name. The crate is split into three layers:
//!
//! - [`transport`]: [`Connection`](transport::Connection) wraps a TCP stream
//!   as a blocking line channel; [`SocketListener`](transport::SocketListener)
//!   accepts streams and hands each to a handler on a thread of its own.
//! - [`chat`]: [`ChatServer`] owns the registry of named sessions and the
//!   broadcast lock that totally orders fan-out.
//! - [`run_server`]: loads configuration through `ortho_config`, installs
//!   `tracing` telemetry, and serves until the listener fails.

mod bootstrap;
pub mod chat;
pub mod telemetry;
pub mod transport;

pub use bootstrap::{
    ConfigLoader, LaunchError, StaticConfigLoader, SystemConfigLoader, run_server, start_server,
};
pub use chat::ChatServer;
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
