//! Error types for connections and the socket listener.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors surfaced by [`Connection`](super::Connection) operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// `connect` was called on a connection that is already live.
    #[error("connection is already connected")]
    AlreadyConnected,
    /// A line operation was attempted without an open transport.
    #[error("connection is not connected")]
    NotConnected,
    /// Opening the transport failed.
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        /// Remote host requested by the caller.
        host: String,
        /// Remote port requested by the caller.
        port: u16,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// Cloning the socket into separate line streams failed.
    #[error("failed to prepare line streams: {source}")]
    Streams {
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// Writing a line to the peer failed.
    #[error("failed to send line: {source}")]
    Send {
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// Reading a line from the peer failed.
    #[error("failed to receive line: {source}")]
    Receive {
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// The peer closed the stream.
    #[error("connection closed by peer")]
    Closed,
    /// The peer sent a line longer than the permitted maximum.
    #[error("received line exceeds {limit} bytes")]
    LineTooLong {
        /// Maximum number of bytes accepted for one line.
        limit: usize,
    },
}

/// Errors surfaced while binding or running the socket listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Resolving the configured host failed.
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
        /// Underlying resolver error.
        #[source]
        source: io::Error,
    },
    /// Resolution succeeded but yielded no usable address.
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
    },
    /// Binding the listening socket failed.
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        /// Address the listener attempted to bind.
        addr: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// Switching the listener into non-blocking mode failed.
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// The accept thread could not be spawned.
    #[error("failed to spawn listener thread: {source}")]
    Spawn {
        /// Underlying thread creation error.
        #[source]
        source: io::Error,
    },
    /// The accept loop hit an unrecoverable error and stopped.
    #[error("listener stopped accepting connections: {source}")]
    Accept {
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// The accept thread panicked.
    #[error("listener thread panicked")]
    ThreadPanic,
}
