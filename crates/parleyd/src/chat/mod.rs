//! Chat semantics on top of the transport.
//!
//! Each accepted connection runs a small state machine on its own thread:
//! the first line names the client, later lines are relayed to every other
//! registered client, and a failed read ends the session with a departure
//! notice. See [`ChatServer`] for the ordering guarantees of fan-out.

mod messages;
mod registry;
mod server;

pub use self::messages::ServerMessage;
pub use self::registry::{DisplayName, NameError, Registry, RegistryError};
pub use self::server::ChatServer;

const CHAT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::chat");
