//! Seam between the accept loop and whatever serves a connection.

use std::sync::Arc;

use super::Connection;

/// Serves accepted connections.
///
/// The listener calls [`ConnectionHandler::handle`] on a dedicated thread per
/// connection, so implementations may block for the lifetime of the session.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Runs one session to completion. Implementations should avoid panicking.
    fn handle(&self, connection: Connection);
}

impl<T> ConnectionHandler for Arc<T>
where
    T: ConnectionHandler,
{
    fn handle(&self, connection: Connection) {
        (**self).handle(connection);
    }
}
