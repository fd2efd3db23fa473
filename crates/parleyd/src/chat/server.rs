//! Session state machine and broadcast fan-out.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::transport::{Connection, ConnectionHandler, ConnectionId};

use super::{CHAT_TARGET, DisplayName, Registry, ServerMessage};

/// Chat relay shared by every session.
///
/// The server owns the [`Registry`] and the broadcast lock. One instance is
/// built at startup and handed to the listener behind an `Arc`.
///
/// Broadcasts hold the lock while writing to every recipient, so all clients
/// observe joins, chat lines, and departures in one global order. The cost is
/// that a recipient with a full socket buffer stalls every broadcast until
/// its write completes or fails.
#[derive(Debug, Default)]
pub struct ChatServer {
    registry: Registry,
    broadcast_lock: Mutex<()>,
}

/// Where a session is in its lifecycle.
#[derive(Debug)]
enum SessionState {
    /// Waiting for the client to announce a name.
    Unregistered,
    /// Registered and relaying lines.
    Active(DisplayName),
    /// Finished; the session thread exits after cleanup.
    Terminated,
}

impl ChatServer {
    /// Creates a server with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions currently visible to broadcasts.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Runs one client session until its transport fails or closes.
    pub fn run_session(&self, connection: Connection) {
        let connection = Arc::new(connection);
        let mut state = SessionState::Unregistered;
        loop {
            state = match state {
                SessionState::Unregistered => self.negotiate(&connection),
                SessionState::Active(name) => self.relay(&connection, name),
                SessionState::Terminated => {
                    self.terminate(&connection);
                    return;
                }
            };
        }
    }

    /// Delivers `line` to every registered session except `exclude`.
    ///
    /// A recipient whose write fails is removed and closed, and its
    /// departure is announced to the rest before the lock is released.
    pub fn broadcast(&self, line: &str, exclude: Option<ConnectionId>) {
        let _pass = self
            .broadcast_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut pending = VecDeque::from([(line.to_owned(), exclude)]);
        while let Some((line, exclude)) = pending.pop_front() {
            for member in self.registry.snapshot() {
                let connection = &member.connection;
                if Some(connection.id()) == exclude || !connection.is_connected() {
                    continue;
                }
                let Err(error) = connection.send(&line) else {
                    continue;
                };
                warn!(
                    target: CHAT_TARGET,
                    connection = %connection.id(),
                    name = %member.name,
                    error = %error,
                    "dropping unreachable client"
                );
                connection.disconnect();
                if let Some(name) = self.registry.remove(connection.id()) {
                    pending.push_back((ServerMessage::Left(&name).to_string(), None));
                }
            }
        }
    }

    fn negotiate(&self, connection: &Arc<Connection>) -> SessionState {
        let candidate = match connection.receive_line() {
            Ok(line) => line,
            Err(error) => {
                debug!(
                    target: CHAT_TARGET,
                    connection = %connection.id(),
                    error = %error,
                    "connection closed before naming"
                );
                return SessionState::Terminated;
            }
        };

        let name = match DisplayName::parse(candidate) {
            Ok(name) => name,
            Err(error) => {
                info!(
                    target: CHAT_TARGET,
                    connection = %connection.id(),
                    error = %error,
                    "rejecting client"
                );
                reject(connection, ServerMessage::EmptyName);
                return SessionState::Terminated;
            }
        };

        if let Err(error) = self.registry.insert(Arc::clone(connection), name.clone()) {
            warn!(
                target: CHAT_TARGET,
                connection = %connection.id(),
                error = %error,
                "rejecting client"
            );
            reject(connection, ServerMessage::RegistrationFailed);
            return SessionState::Terminated;
        }

        info!(
            target: CHAT_TARGET,
            connection = %connection.id(),
            name = %name,
            "client joined"
        );
        if let Err(error) = connection.send(&ServerMessage::Welcome(&name).to_string()) {
            debug!(
                target: CHAT_TARGET,
                connection = %connection.id(),
                error = %error,
                "failed to acknowledge registration"
            );
            return SessionState::Terminated;
        }
        self.broadcast(
            &ServerMessage::Joined(&name).to_string(),
            Some(connection.id()),
        );
        SessionState::Active(name)
    }

    fn relay(&self, connection: &Connection, name: DisplayName) -> SessionState {
        match connection.receive_line() {
            Ok(text) if text.is_empty() => SessionState::Active(name),
            Ok(text) => {
                let line = ServerMessage::Chat {
                    from: &name,
                    text: &text,
                }
                .to_string();
                self.broadcast(&line, Some(connection.id()));
                SessionState::Active(name)
            }
            Err(error) => {
                debug!(
                    target: CHAT_TARGET,
                    connection = %connection.id(),
                    name = %name,
                    error = %error,
                    "session read ended"
                );
                SessionState::Terminated
            }
        }
    }

    fn terminate(&self, connection: &Connection) {
        // Absent when never registered or already dropped by a broadcast.
        if let Some(name) = self.registry.remove(connection.id()) {
            info!(
                target: CHAT_TARGET,
                connection = %connection.id(),
                name = %name,
                "client left"
            );
            self.broadcast(&ServerMessage::Left(&name).to_string(), None);
        }
        connection.disconnect();
    }
}

impl ConnectionHandler for ChatServer {
    fn handle(&self, connection: Connection) {
        self.run_session(connection);
    }
}

fn reject(connection: &Connection, message: ServerMessage<'_>) {
    if let Err(error) = connection.send(&message.to_string()) {
        debug!(
            target: CHAT_TARGET,
            connection = %connection.id(),
            error = %error,
            "failed to deliver rejection"
        );
    }
}
