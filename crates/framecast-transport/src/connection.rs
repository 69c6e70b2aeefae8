use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use tracing::debug;

use crate::error::Result;

/// An accepted or connected TCP stream. Implements `Read` and `Write`.
///
/// The socket is shut down exactly once: either by an explicit
/// [`Connection::close`] or when the value is dropped. Reads and writes after
/// `close` fail with `NotConnected`.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    closed: bool,
}

impl Connection {
    pub(crate) fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            closed: false,
        }
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Disable Nagle's algorithm; senders push whole frames at once.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.stream.set_nodelay(nodelay).map_err(Into::into)
    }

    /// Whether [`Connection::close`] has already run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Shut down both directions of the socket.
    ///
    /// Idempotent: only the first call touches the socket.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!(peer = %self.peer, "closing connection");
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Peer already tore the socket down.
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn ensure_open(&self) -> std::io::Result<()> {
        if self.closed {
            return Err(std::io::Error::new(
                ErrorKind::NotConnected,
                "connection closed",
            ));
        }
        Ok(())
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.ensure_open()?;
        self.stream.read(buf)
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.ensure_open()?;
        self.stream.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.ensure_open()?;
        self.stream.flush()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            debug!(peer = %self.peer, error = %err, "error closing connection on drop");
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;

    use super::*;

    fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, peer) = listener.accept().unwrap();
        (Connection::new(server, peer), client)
    }

    #[test]
    fn reads_and_writes_through() {
        let (mut conn, mut client) = pair();
        client.write_all(b"ping").unwrap();

        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        conn.write_all(b"pong").unwrap();
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn close_is_idempotent_and_peer_sees_eof() {
        let (mut conn, mut client) = pair();
        conn.close().unwrap();
        conn.close().unwrap();
        assert!(conn.is_closed());

        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn io_after_close_is_rejected() {
        let (mut conn, _client) = pair();
        conn.close().unwrap();

        let mut buf = [0u8; 1];
        let err = conn.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
        let err = conn.write(b"x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
    }

    #[test]
    fn drop_closes_socket() {
        let (conn, mut client) = pair();
        drop(conn);

        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
    }
}
