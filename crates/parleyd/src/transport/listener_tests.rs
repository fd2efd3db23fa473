//! Tests for the socket listener.

use std::io;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use rstest::{fixture, rstest};

use super::listener::is_transient;
use super::{ConnectionHandler, CountingHandler, ListenerError, SocketListener, wait_until};

#[fixture]
fn listener() -> SocketListener {
    SocketListener::bind("127.0.0.1", 0).expect("bind tcp listener")
}

#[rstest]
fn binds_an_ephemeral_port(listener: SocketListener) {
    assert_ne!(listener.local_addr().port(), 0);
}

#[rstest]
fn tcp_listener_accepts_connections(listener: SocketListener) {
    let addr = listener.local_addr();
    let (count, handler) = CountingHandler::new();
    let handler: Arc<dyn ConnectionHandler> = handler;
    let handle = listener.start(handler).expect("start listener");

    TcpStream::connect(addr).expect("connect first client");
    TcpStream::connect(addr).expect("connect second client");

    assert!(
        wait_until(|| count.load(Ordering::SeqCst) >= 2),
        "expected two connections"
    );
    handle.shutdown();
    handle.join().expect("join listener");
}

#[rstest]
fn shutdown_releases_the_port(listener: SocketListener) {
    let addr = listener.local_addr();
    let (_, handler) = CountingHandler::new();
    let handle = listener.start(handler).expect("start listener");

    handle.shutdown();
    handle.join().expect("join listener");

    TcpListener::bind(addr).expect("port should be free after shutdown");
}

#[test]
fn rejects_a_port_in_use() {
    let existing = TcpListener::bind(("127.0.0.1", 0)).expect("reserve port");
    let port = existing.local_addr().expect("reserved address").port();

    let error = SocketListener::bind("127.0.0.1", port).expect_err("bind should fail");
    assert!(matches!(error, ListenerError::BindTcp { .. }));
}

#[test]
fn rejects_unresolvable_hosts() {
    let error = SocketListener::bind("host.invalid", 11000).expect_err("resolve should fail");
    assert!(matches!(
        error,
        ListenerError::Resolve { .. } | ListenerError::ResolveEmpty { .. }
    ));
}

#[rstest]
#[case(io::ErrorKind::ConnectionAborted)]
#[case(io::ErrorKind::ConnectionReset)]
#[case(io::ErrorKind::ConnectionRefused)]
#[case(io::ErrorKind::Interrupted)]
#[case(io::ErrorKind::TimedOut)]
fn aborted_handshakes_are_transient(#[case] kind: io::ErrorKind) {
    assert!(is_transient(&io::Error::from(kind)));
}

#[cfg(unix)]
#[rstest]
#[case(nix::errno::Errno::EMFILE)]
#[case(nix::errno::Errno::ENFILE)]
#[case(nix::errno::Errno::ENOBUFS)]
#[case(nix::errno::Errno::ENOMEM)]
fn resource_exhaustion_is_transient(#[case] errno: nix::errno::Errno) {
    assert!(is_transient(&io::Error::from_raw_os_error(errno as i32)));
}

#[rstest]
#[case(io::ErrorKind::PermissionDenied)]
#[case(io::ErrorKind::InvalidInput)]
#[case(io::ErrorKind::Other)]
fn other_accept_errors_are_fatal(#[case] kind: io::ErrorKind) {
    assert!(!is_transient(&io::Error::from(kind)));
}

#[rstest]
fn fatal_accept_errors_stop_the_listener(listener: SocketListener) {
    let addr = listener.local_addr();
    let (_, handler) = CountingHandler::new();
    let handle = listener
        .start_with(handler, |_: &TcpListener| {
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        })
        .expect("start listener");

    let error = handle.join().expect_err("listener should stop");
    assert!(matches!(
        error,
        ListenerError::Accept { ref source } if source.kind() == io::ErrorKind::PermissionDenied
    ));
    TcpListener::bind(addr).expect("port should be free after a fatal error");
}

#[rstest]
fn transient_accept_errors_are_retried(listener: SocketListener) {
    let addr = listener.local_addr();
    let (count, handler) = CountingHandler::new();
    let mut failures = 3;
    let handle = listener
        .start_with(handler, move |inner: &TcpListener| {
            if failures > 0 {
                failures -= 1;
                return Err(io::Error::from(io::ErrorKind::ConnectionAborted));
            }
            inner.accept()
        })
        .expect("start listener");

    let _client = TcpStream::connect(addr).expect("connect client");

    assert!(
        wait_until(|| count.load(Ordering::SeqCst) == 1),
        "listener should keep accepting after transient errors"
    );
    handle.shutdown();
    handle.join().expect("join listener");
}
