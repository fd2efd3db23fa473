//! Live sessions and their display names.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::transport::{Connection, ConnectionId};

/// Name a client announces in its first line.
///
/// Names must contain a non-whitespace character. They are kept exactly as
/// sent and are not required to be unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DisplayName(String);

impl DisplayName {
    /// Validates a candidate name.
    pub fn parse(raw: impl Into<String>) -> Result<Self, NameError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(NameError::Empty);
        }
        Ok(Self(raw))
    }

    /// Name as sent by the client.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl AsRef<str> for DisplayName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Reasons a candidate display name is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NameError {
    /// The name was empty or whitespace only.
    #[error("display name is empty")]
    Empty,
}

/// Errors raised when adding a session to the [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The connection already has a registered session.
    #[error("connection {id} is already registered")]
    AlreadyRegistered {
        /// Identity of the duplicate connection.
        id: ConnectionId,
    },
}

/// One registered session.
#[derive(Debug, Clone)]
pub(crate) struct Member {
    pub(crate) connection: Arc<Connection>,
    pub(crate) name: DisplayName,
}

/// Concurrent map from connection identity to display name.
///
/// Every operation holds the internal lock only for the map update itself.
/// Broadcasts work from a [`snapshot`](Self::snapshot), so a session that
/// registers during a broadcast may or may not receive it.
#[derive(Debug, Default)]
pub struct Registry {
    members: Mutex<BTreeMap<ConnectionId, Member>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `connection` under `name`.
    pub fn insert(
        &self,
        connection: Arc<Connection>,
        name: DisplayName,
    ) -> Result<(), RegistryError> {
        let id = connection.id();
        let mut members = self.lock();
        if members.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered { id });
        }
        members.insert(id, Member { connection, name });
        Ok(())
    }

    /// Removes the session for `id`, returning its name if it was present.
    pub fn remove(&self, id: ConnectionId) -> Option<DisplayName> {
        self.lock().remove(&id).map(|member| member.name)
    }

    /// Reports whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Reports whether no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Names of registered sessions, oldest connection first.
    #[must_use]
    pub fn names(&self) -> Vec<DisplayName> {
        self.lock()
            .values()
            .map(|member| member.name.clone())
            .collect()
    }

    pub(crate) fn snapshot(&self) -> Vec<Member> {
        self.lock().values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ConnectionId, Member>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
