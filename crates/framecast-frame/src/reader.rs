use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};
use framecast_transport::Connection;
use tracing::{debug, trace};

use crate::codec::{peek_length, Frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 64 * 1024;
const READ_CHUNK_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    AwaitingHeader,
    AwaitingPayload { len: usize },
    Closed,
}

/// How the stream ended. Both variants are a normal close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// EOF on a frame boundary.
    Clean,
    /// EOF inside a header or payload; the partial frame was dropped.
    ShortRead { buffered: usize, expected: usize },
}

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers only ever see complete frames.
/// Bytes received past the current frame stay buffered for the next call.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    state: ReadState,
    close_reason: Option<CloseReason>,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            state: ReadState::AwaitingHeader,
            close_reason: None,
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Ok(None)` once the stream has ended, whether on a frame
    /// boundary or not; see [`FrameReader::close_reason`]. Timeouts are
    /// returned as `FrameError::Io` and leave partial data in place, so the
    /// call can simply be repeated. An oversized length prefix closes the
    /// reader.
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.state {
                ReadState::Closed => return Ok(None),
                ReadState::AwaitingHeader => {
                    if let Some(len) = peek_length(&self.buf) {
                        if len > self.config.max_payload_size {
                            self.state = ReadState::Closed;
                            self.buf.clear();
                            return Err(FrameError::OversizedPayload {
                                size: len,
                                max: self.config.max_payload_size,
                            });
                        }
                        self.buf.advance(HEADER_SIZE);
                        trace!(len, "frame header");
                        self.state = ReadState::AwaitingPayload { len };
                        continue;
                    }
                }
                ReadState::AwaitingPayload { len } => {
                    if self.buf.len() >= len {
                        let payload = self.buf.split_to(len).freeze();
                        self.state = ReadState::AwaitingHeader;
                        return Ok(Some(Frame { payload }));
                    }
                    self.buf.reserve(len - self.buf.len());
                }
            }

            if !self.fill()? {
                self.finish();
            }
        }
    }

    /// Pull one chunk from the stream. Returns `false` on EOF.
    fn fill(&mut self) -> Result<bool> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(true);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    fn finish(&mut self) {
        let reason = match self.state {
            ReadState::AwaitingHeader if self.buf.is_empty() => CloseReason::Clean,
            ReadState::AwaitingHeader => CloseReason::ShortRead {
                buffered: self.buf.len(),
                expected: HEADER_SIZE,
            },
            ReadState::AwaitingPayload { len } => CloseReason::ShortRead {
                buffered: self.buf.len(),
                expected: len,
            },
            ReadState::Closed => return,
        };
        debug!(?reason, "end of stream");
        self.buf.clear();
        self.state = ReadState::Closed;
        self.close_reason = Some(reason);
    }

    /// How the stream ended, once [`FrameReader::read_frame`] has returned `Ok(None)`.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// True once end of stream (or an oversized prefix) has been reached.
    pub fn is_closed(&self) -> bool {
        self.state == ReadState::Closed
    }

    /// Bytes received but not yet returned as part of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent frame decoding.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<Connection> {
    /// Create a frame reader for a TCP `Connection` and apply read timeout from config.
    pub fn with_config_conn(inner: Connection, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: framecast_transport::TransportError) -> FrameError {
    match err {
        framecast_transport::TransportError::Io(io)
        | framecast_transport::TransportError::Accept(io) => FrameError::Io(io),
        framecast_transport::TransportError::Bind { source, .. }
        | framecast_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
    }
}
