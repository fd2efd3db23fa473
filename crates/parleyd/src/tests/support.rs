//! Shared harness: a relay on an ephemeral port and raw TCP clients.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use crate::chat::ChatServer;
use crate::transport::{ConnectionHandler, ListenerHandle, SocketListener};

const READ_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_PERIOD: Duration = Duration::from_millis(200);

/// Relay bound to `127.0.0.1` on a free port.
pub(crate) struct TestRelay {
    pub(crate) server: Arc<ChatServer>,
    pub(crate) addr: SocketAddr,
    listener: Option<ListenerHandle>,
}

impl TestRelay {
    pub(crate) fn start() -> Self {
        let server = Arc::new(ChatServer::new());
        let listener = SocketListener::bind("127.0.0.1", 0).expect("bind relay listener");
        let addr = listener.local_addr();
        let handler: Arc<dyn ConnectionHandler> = server.clone();
        let handle = listener.start(handler).expect("start relay listener");
        Self {
            server,
            addr,
            listener: Some(handle),
        }
    }

    pub(crate) fn connect(&self) -> TestClient {
        TestClient::connect_to(self.addr)
    }

    /// Connects, announces `name`, and consumes the welcome line.
    pub(crate) fn join(&self, name: &str) -> TestClient {
        let mut client = self.connect();
        client.send(name);
        client.expect_line(&format!("Server: You have joined the chat as {name}."));
        client
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.take() {
            handle.shutdown();
            drop(handle.join());
        }
    }
}

/// Plain TCP client speaking the line protocol.
pub(crate) struct TestClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl TestClient {
    pub(crate) fn connect_to(addr: SocketAddr) -> Self {
        Self::from_stream(TcpStream::connect(addr).expect("connect test client"))
    }

    pub(crate) fn from_stream(writer: TcpStream) -> Self {
        writer
            .set_read_timeout(Some(READ_TIMEOUT))
            .expect("set read timeout");
        let reader = BufReader::new(writer.try_clone().expect("clone test client"));
        Self { reader, writer }
    }

    pub(crate) fn send(&mut self, line: &str) {
        self.send_bytes(format!("{line}\n").as_bytes());
    }

    /// Writes `bytes` verbatim, terminator included.
    pub(crate) fn send_bytes(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).expect("write bytes");
    }

    /// Next line without its terminator; `None` once the server has closed.
    pub(crate) fn next_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_owned()),
            Err(error) if error.kind() == io::ErrorKind::ConnectionReset => None,
            Err(error) => panic!("read failed: {error}"),
        }
    }

    pub(crate) fn expect_line(&mut self, expected: &str) {
        assert_eq!(self.next_line().as_deref(), Some(expected));
    }

    /// Every line that arrives before the connection goes quiet.
    pub(crate) fn drain(&mut self) -> Vec<String> {
        self.set_timeout(QUIET_PERIOD);
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => lines.push(line.trim_end_matches(['\r', '\n']).to_owned()),
                Err(error)
                    if matches!(
                        error.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    break;
                }
                Err(error) => panic!("read failed: {error}"),
            }
        }
        self.set_timeout(READ_TIMEOUT);
        lines
    }

    pub(crate) fn expect_silence(&mut self) {
        let lines = self.drain();
        assert!(lines.is_empty(), "expected no lines, got {lines:?}");
    }

    pub(crate) fn expect_closed(&mut self) {
        assert_eq!(self.next_line(), None, "expected the server to close");
    }

    fn set_timeout(&self, timeout: Duration) {
        self.writer
            .set_read_timeout(Some(timeout))
            .expect("set read timeout");
    }
}
