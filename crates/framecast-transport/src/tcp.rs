use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::connection::Connection;
use crate::error::{Result, TransportError};

/// Listen on all interfaces by default.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";

/// Default receiver port.
pub const DEFAULT_PORT: u16 = 8889;

/// How often blocking waits re-check for cancellation.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared stop request, raised from a signal handler or a display layer.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call from any thread, any number of times.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A bound TCP listening socket.
///
/// Connections are accepted one at a time; the socket is closed on drop.
pub struct TcpEndpoint {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpEndpoint {
    /// Bind and listen on `addr:port`.
    ///
    /// Port `0` picks an ephemeral port; see [`TcpEndpoint::local_addr`].
    pub fn bind(addr: &str, port: u16) -> Result<Self> {
        let display = format!("{addr}:{port}");
        let bind_err = |source| TransportError::Bind {
            addr: display.clone(),
            source,
        };

        let listener = TcpListener::bind((addr, port)).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        info!(addr = %local_addr, "listening on tcp");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<Connection> {
        self.listener
            .set_nonblocking(false)
            .map_err(TransportError::Accept)?;
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        Self::finish_accept(stream, peer)
    }

    /// Accept an incoming connection, giving up once `cancel` is raised.
    ///
    /// The listening socket is polled every `poll_interval`, so cancellation
    /// is observed within one interval. Returns `Ok(None)` when cancelled.
    pub fn accept_until(
        &self,
        cancel: &CancelFlag,
        poll_interval: Duration,
    ) -> Result<Option<Connection>> {
        self.listener
            .set_nonblocking(true)
            .map_err(TransportError::Accept)?;

        loop {
            if cancel.is_cancelled() {
                debug!("accept cancelled");
                return Ok(None);
            }

            match self.listener.accept() {
                Ok((stream, peer)) => return Self::finish_accept(stream, peer).map(Some),
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(poll_interval);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Accept(err)),
            }
        }
    }

    fn finish_accept(stream: TcpStream, peer: SocketAddr) -> Result<Connection> {
        // Some platforms hand out accepted sockets with the listener's O_NONBLOCK.
        stream
            .set_nonblocking(false)
            .map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection");
        Ok(Connection::new(stream, peer))
    }

    /// Connect to a listening endpoint (blocking).
    pub fn connect(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<Connection> {
        let stream = TcpStream::connect(&addr).map_err(|e| TransportError::Connect {
            addr: addr.to_string(),
            source: e,
        })?;
        let peer = stream.peer_addr()?;
        debug!(%peer, "connected to tcp endpoint");
        Ok(Connection::new(stream, peer))
    }

    /// The address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for TcpEndpoint {
    fn drop(&mut self) {
        debug!(addr = %self.local_addr, "closing listening socket");
    }
}

impl std::fmt::Debug for TcpEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpEndpoint")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}
