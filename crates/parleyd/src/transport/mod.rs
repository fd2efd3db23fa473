//! Stream transport for the relay.
//!
//! [`Connection`] turns a TCP stream into a blocking line channel and
//! [`SocketListener`] accepts streams on a background thread, handing each to
//! a [`ConnectionHandler`] on a thread of its own.

mod connection;
mod errors;
mod handler;
mod listener;
#[cfg(test)]
mod listener_tests;
#[cfg(test)]
mod test_utils;

pub use self::connection::{Connection, ConnectionId, MAX_LINE_BYTES};
pub use self::errors::{ConnectionError, ListenerError};
pub use self::handler::ConnectionHandler;
pub use self::listener::{ListenerHandle, SocketListener};
#[cfg(test)]
pub(crate) use self::test_utils::{CountingHandler, wait_until};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
