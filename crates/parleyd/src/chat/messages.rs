//! Lines the server writes to clients.

use std::fmt;

use super::DisplayName;

/// A line originating from the server rather than relayed verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMessage<'a> {
    /// The first line was empty or whitespace.
    EmptyName,
    /// The registry refused the connection.
    RegistrationFailed,
    /// Private acknowledgement sent to a newly registered client.
    Welcome(&'a DisplayName),
    /// Broadcast when a client registers.
    Joined(&'a DisplayName),
    /// Broadcast when a registered client goes away.
    Left(&'a DisplayName),
    /// A chat line relayed on behalf of `from`.
    Chat {
        /// Sender of the line.
        from: &'a DisplayName,
        /// Line as received, without its terminator.
        text: &'a str,
    },
}

impl fmt::Display for ServerMessage<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => formatter.write_str("Error: Name cannot be empty"),
            Self::RegistrationFailed => {
                formatter.write_str("Error: Could not register your connection")
            }
            Self::Welcome(name) => write!(formatter, "Server: You have joined the chat as {name}."),
            Self::Joined(name) => write!(formatter, "Server: {name} has joined the chat."),
            Self::Left(name) => write!(formatter, "Server: {name} has left the chat."),
            Self::Chat { from, text } => write!(formatter, "{from}: {text}"),
        }
    }
}
