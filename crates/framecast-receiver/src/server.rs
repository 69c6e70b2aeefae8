use std::io::ErrorKind;
use std::net::SocketAddr;

use framecast_transport::{CancelFlag, Connection, TcpEndpoint, TransportError};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ReceiverConfig;
use crate::decode::{FrameDecoder, ImageDecoder};
use crate::display::FrameSink;
use crate::error::{ReceiverError, Result};
use crate::session::{Session, SessionEnd, SessionReport};

/// Totals across every connection served by [`Receiver::serve`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServeSummary {
    pub connections: u64,
    pub frames: u64,
    pub decode_failures: u64,
    pub bytes: u64,
}

impl ServeSummary {
    fn record(&mut self, report: &SessionReport) {
        self.connections += 1;
        self.frames += report.frames;
        self.decode_failures += report.decode_failures;
        self.bytes += report.bytes;
    }
}

/// Listens for senders and serves them one connection at a time.
pub struct Receiver<D = ImageDecoder> {
    endpoint: TcpEndpoint,
    config: ReceiverConfig,
    decoder: D,
}

impl Receiver<ImageDecoder> {
    /// Bind the listening socket described by `config`.
    pub fn bind(config: ReceiverConfig) -> Result<Self> {
        config.validate()?;
        let endpoint =
            TcpEndpoint::bind(&config.bind_addr, config.port).map_err(ReceiverError::Bind)?;
        let decoder = ImageDecoder::new(config.color_mode);
        Ok(Self {
            endpoint,
            config,
            decoder,
        })
    }
}

impl<D: FrameDecoder> Receiver<D> {
    /// Swap the payload decoder.
    pub fn with_decoder<D2: FrameDecoder>(self, decoder: D2) -> Receiver<D2> {
        Receiver {
            endpoint: self.endpoint,
            config: self.config,
            decoder,
        }
    }

    /// Bound socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Wait for the next sender. `Ok(None)` once `cancel` is raised.
    pub fn accept(&self, cancel: &CancelFlag) -> Result<Option<Connection>> {
        Ok(self
            .endpoint
            .accept_until(cancel, self.config.poll_interval)?)
    }

    /// Run one connection to completion. The connection is closed and the
    /// sink released before this returns.
    pub fn handle_connection<S>(
        &self,
        conn: Connection,
        sink: &mut S,
        cancel: &CancelFlag,
    ) -> SessionReport
    where
        S: FrameSink + ?Sized,
    {
        let peer = conn.peer_addr();
        info!(%peer, "connected");

        let mut session = match Session::from_connection(conn, &self.config) {
            Ok(session) => session,
            Err(err) => {
                warn!(%peer, error = %err, "failed to set up connection");
                sink.release();
                return SessionReport {
                    peer: peer.to_string(),
                    frames: 0,
                    decode_failures: 0,
                    bytes: 0,
                    last_decode_error: None,
                    end: SessionEnd::Failed {
                        error: err.to_string(),
                    },
                };
            }
        };

        sink.begin(peer);
        let report = session.run(&self.decoder, sink, cancel);
        session.close();

        info!(
            %peer,
            frames = report.frames,
            decode_failures = report.decode_failures,
            end = ?report.end,
            "connection finished"
        );
        report
    }

    /// Accept and serve connections one after another until `cancel` is
    /// raised or the configured connection limit is reached.
    ///
    /// Whatever ends a connection, the loop goes back to accepting. Only a
    /// listener failure is returned as an error.
    pub fn serve<S>(&self, sink: &mut S, cancel: &CancelFlag) -> Result<ServeSummary>
    where
        S: FrameSink + ?Sized,
    {
        let mut summary = ServeSummary::default();

        loop {
            if let Some(limit) = self.config.max_connections {
                if summary.connections >= limit as u64 {
                    info!(limit, "connection limit reached");
                    break;
                }
            }

            info!(addr = %self.local_addr(), "waiting for a new connection");
            let conn = match self.accept(cancel) {
                Ok(Some(conn)) => conn,
                Ok(None) => break,
                Err(ReceiverError::Transport(TransportError::Accept(err)))
                    if is_transient_accept_error(&err) =>
                {
                    warn!(error = %err, "accept failed; retrying");
                    continue;
                }
                Err(err) => return Err(err),
            };

            let report = self.handle_connection(conn, sink, cancel);
            summary.record(&report);
        }

        if cancel.is_cancelled() {
            info!("shutdown requested; closing listener");
        }
        Ok(summary)
    }
}

fn is_transient_accept_error(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset | ErrorKind::Interrupted
    )
}
