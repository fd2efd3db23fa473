//! Accept loop for the relay's TCP listener.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use tracing::{error, info, warn};

use super::{Connection, ConnectionHandler, LISTENER_TARGET, ListenerError};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Listener bound to a TCP endpoint but not yet accepting.
#[derive(Debug)]
pub struct SocketListener {
    addr: SocketAddr,
    listener: TcpListener,
}

impl SocketListener {
    /// Resolves `host:port` and binds the first address it yields.
    ///
    /// Port `0` asks the operating system for a free port; see
    /// [`Self::local_addr`].
    pub fn bind(host: &str, port: u16) -> Result<Self, ListenerError> {
        let listener = bind_tcp(host, port)?;
        let addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Resolve {
                host: host.to_owned(),
                port,
                source,
            })?;
        Ok(Self { addr, listener })
    }

    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Starts the accept loop on a background thread.
    ///
    /// Every accepted stream is wrapped in a [`Connection`] and passed to
    /// `handler` on a new thread, so a slow session never delays accepting.
    pub fn start(
        self,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        self.start_with(handler, TcpListener::accept)
    }

    /// Starts the accept loop, taking each stream from `accept`.
    pub(super) fn start_with<A>(
        self,
        handler: Arc<dyn ConnectionHandler>,
        accept: A,
    ) -> Result<ListenerHandle, ListenerError>
    where
        A: FnMut(&TcpListener) -> io::Result<(TcpStream, SocketAddr)> + Send + 'static,
    {
        self.listener
            .set_nonblocking(true)
            .map_err(|source| ListenerError::NonBlocking { source })?;
        let addr = self.addr;
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("parleyd-accept".to_owned())
            .spawn(move || run_accept_loop(self, accept, &shutdown_flag, &handler))
            .map_err(|source| ListenerError::Spawn { source })?;
        Ok(ListenerHandle {
            addr,
            shutdown,
            handle: Some(handle),
        })
    }
}

/// Handle to the background accept thread.
#[derive(Debug)]
pub struct ListenerHandle {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<Result<(), ListenerError>>>,
}

impl ListenerHandle {
    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Asks the accept loop to stop. Live sessions are unaffected.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept loop to exit and reports why it stopped.
    pub fn join(mut self) -> Result<(), ListenerError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(ListenerError::ThreadPanic),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_accept_loop(
    listener: SocketListener,
    mut accept: impl FnMut(&TcpListener) -> io::Result<(TcpStream, SocketAddr)>,
    shutdown: &AtomicBool,
    handler: &Arc<dyn ConnectionHandler>,
) -> Result<(), ListenerError> {
    info!(
        target: LISTENER_TARGET,
        endpoint = %listener.addr,
        "socket listener active"
    );
    let mut last_error = None::<io::ErrorKind>;
    let outcome = loop {
        if shutdown.load(Ordering::SeqCst) {
            break Ok(());
        }
        match accept(&listener.listener) {
            Ok((stream, peer)) => {
                last_error = None;
                dispatch(stream, peer, handler);
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_BACKOFF);
            }
            Err(error) if is_transient(&error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: LISTENER_TARGET,
                        error = %error,
                        "socket accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
            Err(source) => {
                error!(
                    target: LISTENER_TARGET,
                    error = %source,
                    "socket accept failed; listener stopping"
                );
                break Err(ListenerError::Accept { source });
            }
        }
    };

    info!(
        target: LISTENER_TARGET,
        endpoint = %listener.addr,
        "socket listener stopped"
    );
    drop(listener);
    outcome
}

fn dispatch(stream: TcpStream, peer: SocketAddr, handler: &Arc<dyn ConnectionHandler>) {
    // Accepted sockets inherit the listener's non-blocking flag on some
    // platforms; sessions rely on blocking reads.
    if let Err(error) = stream.set_nonblocking(false) {
        warn!(
            target: LISTENER_TARGET,
            peer = %peer,
            error = %error,
            "dropping connection"
        );
        return;
    }
    let connection = match Connection::from_stream(stream) {
        Ok(connection) => connection,
        Err(error) => {
            warn!(
                target: LISTENER_TARGET,
                peer = %peer,
                error = %error,
                "dropping connection"
            );
            return;
        }
    };

    let id = connection.id();
    info!(
        target: LISTENER_TARGET,
        connection = %id,
        peer = %peer,
        "connection accepted"
    );
    let handler = Arc::clone(handler);
    if let Err(error) = thread::Builder::new()
        .name(format!("parleyd-{id}"))
        .spawn(move || handler.handle(connection))
    {
        warn!(
            target: LISTENER_TARGET,
            connection = %id,
            error = %error,
            "failed to spawn session thread"
        );
    }
}

pub(super) fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
    ) || is_resource_exhaustion(error)
}

#[cfg(unix)]
fn is_resource_exhaustion(error: &io::Error) -> bool {
    use nix::errno::Errno;

    error.raw_os_error().is_some_and(|code| {
        matches!(
            Errno::from_raw(code),
            Errno::EMFILE | Errno::ENFILE | Errno::ENOBUFS | Errno::ENOMEM
        )
    })
}

#[cfg(not(unix))]
fn is_resource_exhaustion(_error: &io::Error) -> bool {
    false
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    let addr = addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| ListenerError::ResolveEmpty {
            host: host.to_owned(),
            port,
        })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}
