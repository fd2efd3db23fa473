//! Line-oriented wrapper around a TCP stream.
//!
//! A [`Connection`] is shared between the session thread that reads from it
//! and any broadcast that writes to it, so its reader, writer, and transport
//! each sit behind their own lock. Disconnecting shuts the socket down, which
//! wakes a reader blocked on another thread.

use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use tracing::debug;

use super::{ConnectionError, LISTENER_TARGET};

/// Longest line, excluding its terminator, accepted from a peer.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

// Room for the longest line plus a CRLF terminator.
const READ_LIMIT: u64 = 64 * 1024 + 2;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "conn-{}", self.0)
    }
}

/// Bidirectional line channel over a TCP stream.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    transport: Mutex<Option<TcpStream>>,
    reader: Mutex<Option<BufReader<TcpStream>>>,
    writer: Mutex<Option<TcpStream>>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    /// Creates a connection with no transport; call [`Self::connect`] to open one.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ConnectionId::next(),
            transport: Mutex::new(None),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    /// Wraps an already-open stream, typically one returned by `accept`.
    pub fn from_stream(stream: TcpStream) -> Result<Self, ConnectionError> {
        let connection = Self::new();
        let (reader, writer) =
            split_stream(&stream).map_err(|source| ConnectionError::Streams { source })?;
        connection.install(stream, reader, writer);
        Ok(connection)
    }

    /// Identity used by the chat registry.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address of the open transport, if any.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        lock(&self.transport)
            .as_ref()
            .and_then(|stream| stream.peer_addr().ok())
    }

    /// Reports whether the transport is open and the peer has not closed it.
    ///
    /// The answer comes from probing the socket, so a peer that closed its
    /// end without any traffic on this side is observed as disconnected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        lock(&self.transport).as_ref().is_some_and(probe_live)
    }

    /// Opens a transport to `host:port` and binds the line streams.
    ///
    /// On failure the connection is left unconnected and may be retried.
    pub fn connect(&self, host: &str, port: u16) -> Result<(), ConnectionError> {
        if self.is_connected() {
            return Err(ConnectionError::AlreadyConnected);
        }
        // Release a transport whose peer has gone away before replacing it.
        self.disconnect();

        let connect_error = |source| ConnectionError::Connect {
            host: host.to_owned(),
            port,
            source,
        };
        let stream = TcpStream::connect((host, port)).map_err(connect_error)?;
        let (reader, writer) = split_stream(&stream).map_err(connect_error)?;
        self.install(stream, reader, writer);
        debug!(
            target: LISTENER_TARGET,
            connection = %self.id,
            host,
            port,
            "connection opened"
        );
        Ok(())
    }

    /// Writes `line` followed by a newline.
    ///
    /// A newline inside `line` is not escaped: the receiver sees two lines.
    /// A failed write disconnects before the error is returned.
    pub fn send(&self, line: &str) -> Result<(), ConnectionError> {
        let mut guard = lock(&self.writer);
        let writer = guard.as_mut().ok_or(ConnectionError::NotConnected)?;

        let mut frame = String::with_capacity(line.len() + 1);
        frame.push_str(line);
        frame.push('\n');
        let result = writer
            .write_all(frame.as_bytes())
            .and_then(|()| writer.flush());
        drop(guard);

        result.map_err(|source| {
            self.disconnect();
            ConnectionError::Send { source }
        })
    }

    /// Blocks until the peer sends a full line and returns it without its
    /// terminator (`\n` or `\r\n`).
    ///
    /// Bytes that are not valid UTF-8 are replaced with U+FFFD. End of
    /// stream and read failures disconnect before the error is returned.
    pub fn receive_line(&self) -> Result<String, ConnectionError> {
        let mut guard = lock(&self.reader);
        let reader = guard.as_mut().ok_or(ConnectionError::NotConnected)?;
        let outcome = read_line(reader);
        if outcome.is_err() {
            guard.take();
        }
        drop(guard);

        outcome.inspect_err(|_| self.disconnect())
    }

    /// Closes the transport and releases both line streams.
    ///
    /// Calling this on a disconnected instance does nothing.
    pub fn disconnect(&self) {
        // Shut down first: a reader or writer blocked on another thread holds
        // its stream lock until the shutdown wakes it.
        if let Some(stream) = lock(&self.transport).take() {
            self.shutdown(&stream);
        }
        lock(&self.writer).take();
        match self.reader.try_lock() {
            Ok(mut reader) => {
                reader.take();
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                poisoned.into_inner().take();
            }
            Err(TryLockError::WouldBlock) => {}
        }
    }

    fn shutdown(&self, stream: &TcpStream) {
        if let Err(error) = stream.shutdown(Shutdown::Both)
            && error.kind() != io::ErrorKind::NotConnected
        {
            debug!(
                target: LISTENER_TARGET,
                connection = %self.id,
                error = %error,
                "socket shutdown failed"
            );
        }
        debug!(
            target: LISTENER_TARGET,
            connection = %self.id,
            "connection closed"
        );
    }

    fn install(&self, stream: TcpStream, reader: BufReader<TcpStream>, writer: TcpStream) {
        *lock(&self.writer) = Some(writer);
        *lock(&self.reader) = Some(reader);
        *lock(&self.transport) = Some(stream);
    }
}

fn split_stream(stream: &TcpStream) -> io::Result<(BufReader<TcpStream>, TcpStream)> {
    let reader = BufReader::new(stream.try_clone()?);
    let writer = stream.try_clone()?;
    Ok((reader, writer))
}

fn read_line(reader: &mut BufReader<TcpStream>) -> Result<String, ConnectionError> {
    let mut buffer = Vec::new();
    let read = reader
        .by_ref()
        .take(READ_LIMIT)
        .read_until(b'\n', &mut buffer)
        .map_err(|source| ConnectionError::Receive { source })?;
    if read == 0 {
        return Err(ConnectionError::Closed);
    }

    if buffer.last() == Some(&b'\n') {
        buffer.pop();
        if buffer.last() == Some(&b'\r') {
            buffer.pop();
        }
    }
    if buffer.len() > MAX_LINE_BYTES {
        return Err(ConnectionError::LineTooLong {
            limit: MAX_LINE_BYTES,
        });
    }

    // Undecodable bytes become U+FFFD rather than ending the session.
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(unix)]
fn probe_live(stream: &TcpStream) -> bool {
    use std::os::fd::AsRawFd;

    use nix::errno::Errno;
    use nix::sys::socket::{MsgFlags, recv};

    let mut byte = [0_u8; 1];
    match recv(
        stream.as_raw_fd(),
        &mut byte,
        MsgFlags::MSG_PEEK | MsgFlags::MSG_DONTWAIT,
    ) {
        Ok(0) => false,
        Ok(_) => true,
        Err(Errno::EAGAIN | Errno::EINTR) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn probe_live(stream: &TcpStream) -> bool {
    stream.peer_addr().is_ok()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
