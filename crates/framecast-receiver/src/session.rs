use std::io::Read;
use std::ops::{Deref, DerefMut};

use framecast_frame::{CloseReason, FrameError, FrameReader};
use framecast_transport::{CancelFlag, Connection};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{DecodeErrorPolicy, ReceiverConfig};
use crate::decode::FrameDecoder;
use crate::display::FrameSink;
use crate::error::Result;

/// Why a session stopped reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SessionEnd {
    /// EOF on a frame boundary.
    PeerClosed,
    /// EOF inside a frame; the partial frame was not emitted.
    ShortRead { buffered: usize, expected: usize },
    /// A payload failed to decode under [`DecodeErrorPolicy::Disconnect`].
    DecodeFailed,
    /// The length prefix exceeded the configured maximum.
    OversizedPayload { size: usize, max: usize },
    /// The display asked to stop.
    SinkCancelled,
    /// The shared cancel flag was raised.
    Interrupted,
    /// Read or render failure.
    Failed { error: String },
}

impl SessionEnd {
    /// Peer-side termination, as opposed to a local decision or a failure.
    pub fn is_normal_close(&self) -> bool {
        matches!(self, SessionEnd::PeerClosed | SessionEnd::ShortRead { .. })
    }
}

/// Per-connection totals.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub peer: String,
    /// Frames decoded and rendered.
    pub frames: u64,
    pub decode_failures: u64,
    /// Payload bytes received in complete frames.
    pub bytes: u64,
    pub last_decode_error: Option<String>,
    pub end: SessionEnd,
}

/// The frame loop for one connection.
pub struct Session<R> {
    reader: FrameReader<R>,
    peer: String,
    policy: DecodeErrorPolicy,
}

impl<R: Read> Session<R> {
    pub fn new(reader: FrameReader<R>, peer: impl Into<String>, policy: DecodeErrorPolicy) -> Self {
        Self {
            reader,
            peer: peer.into(),
            policy,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Read, decode and render frames until the stream ends or a stop is
    /// requested.
    ///
    /// Never fails: every way out is described by [`SessionReport::end`].
    /// The sink is released before returning, on every path.
    pub fn run<D, S>(&mut self, decoder: &D, sink: &mut S, cancel: &CancelFlag) -> SessionReport
    where
        D: FrameDecoder + ?Sized,
        S: FrameSink + ?Sized,
    {
        let mut sink = ReleaseOnDrop(sink);
        let mut report = SessionReport {
            peer: self.peer.clone(),
            frames: 0,
            decode_failures: 0,
            bytes: 0,
            last_decode_error: None,
            end: SessionEnd::PeerClosed,
        };

        report.end = loop {
            if cancel.is_cancelled() {
                break SessionEnd::Interrupted;
            }

            let frame = match self.reader.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break self.close_end(),
                Err(err) if err.is_timeout() => {
                    if sink.poll_cancel() {
                        break SessionEnd::SinkCancelled;
                    }
                    continue;
                }
                Err(FrameError::OversizedPayload { size, max }) => {
                    warn!(peer = %self.peer, size, max, "payload over limit; dropping connection");
                    break SessionEnd::OversizedPayload { size, max };
                }
                Err(err) => {
                    warn!(peer = %self.peer, error = %err, "read failed");
                    break SessionEnd::Failed {
                        error: err.to_string(),
                    };
                }
            };
            report.bytes = report.bytes.saturating_add(frame.len() as u64);

            match decoder.decode(&frame.payload) {
                Ok(decoded) => {
                    if let Err(err) = sink.render(&decoded) {
                        warn!(peer = %self.peer, error = %err, "render failed");
                        break SessionEnd::Failed {
                            error: err.to_string(),
                        };
                    }
                    report.frames += 1;
                }
                Err(err) => {
                    report.decode_failures += 1;
                    warn!(peer = %self.peer, len = frame.len(), error = %err, "frame decode failed");
                    report.last_decode_error = Some(err.to_string());
                    if self.policy == DecodeErrorPolicy::Disconnect {
                        break SessionEnd::DecodeFailed;
                    }
                }
            }

            if sink.poll_cancel() {
                break SessionEnd::SinkCancelled;
            }
        };

        debug!(peer = %self.peer, end = ?report.end, frames = report.frames, "session finished");
        report
    }

    fn close_end(&self) -> SessionEnd {
        match self.reader.close_reason() {
            Some(CloseReason::ShortRead { buffered, expected }) => {
                SessionEnd::ShortRead { buffered, expected }
            }
            _ => SessionEnd::PeerClosed,
        }
    }

    pub fn into_reader(self) -> FrameReader<R> {
        self.reader
    }
}

impl Session<Connection> {
    /// Wrap an accepted connection, applying the receiver's read timeout and
    /// payload limit.
    pub fn from_connection(conn: Connection, config: &ReceiverConfig) -> Result<Self> {
        let peer = conn.peer_addr().to_string();
        let reader = FrameReader::with_config_conn(conn, config.frame_config())?;
        Ok(Self::new(reader, peer, config.decode_error_policy))
    }

    /// Close the socket. Dropping the session closes it too.
    pub fn close(self) {
        let peer = self.peer;
        let mut conn = self.reader.into_inner();
        if let Err(err) = conn.close() {
            debug!(%peer, error = %err, "error while closing connection");
        }
        info!(%peer, "closed connection");
    }
}

/// Releases the sink when the session loop exits, including by panic.
struct ReleaseOnDrop<'a, S: FrameSink + ?Sized>(&'a mut S);

impl<S: FrameSink + ?Sized> Deref for ReleaseOnDrop<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.0
    }
}

impl<S: FrameSink + ?Sized> DerefMut for ReleaseOnDrop<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.0
    }
}

impl<S: FrameSink + ?Sized> Drop for ReleaseOnDrop<'_, S> {
    fn drop(&mut self) {
        self.0.release();
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, ErrorKind};

    use framecast_frame::FrameWriter;

    use super::*;
    use crate::decode::tests::encode_png;
    use crate::decode::{DecodedFrame, ImageDecoder};
    use crate::error::{DecodeError, SinkError};

    /// Accepts exactly 5-byte payloads as a 1x1 frame whose pixel is the
    /// first three payload bytes.
    struct FiveByteDecoder;

    impl FrameDecoder for FiveByteDecoder {
        fn decode(&self, payload: &[u8]) -> std::result::Result<DecodedFrame, DecodeError> {
            if payload.len() != 5 {
                return Err(DecodeError::Empty);
            }
            Ok(DecodedFrame {
                width: 1,
                height: 1,
                channels: 3,
                pixels: payload[..3].to_vec(),
                encoded_len: payload.len(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<DecodedFrame>,
        releases: usize,
        quit_after: Option<usize>,
        fail_render: bool,
    }

    impl FrameSink for RecordingSink {
        fn render(&mut self, frame: &DecodedFrame) -> std::result::Result<(), SinkError> {
            if self.fail_render {
                return Err(SinkError::Io(std::io::Error::other("display gone")));
            }
            self.frames.push(frame.clone());
            Ok(())
        }

        fn poll_cancel(&mut self) -> bool {
            self.quit_after.is_some_and(|n| self.frames.len() >= n)
        }

        fn release(&mut self) {
            self.releases += 1;
        }
    }

    fn wire(payloads: &[&[u8]]) -> Vec<u8> {
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        for payload in payloads {
            writer.send(payload).unwrap();
        }
        writer.into_inner().into_inner()
    }

    fn session(bytes: Vec<u8>, policy: DecodeErrorPolicy) -> Session<Cursor<Vec<u8>>> {
        Session::new(FrameReader::new(Cursor::new(bytes)), "test-peer", policy)
    }

    #[test]
    fn five_byte_frame_emits_one_frame() {
        let bytes = wire(&[&[9, 8, 7, 6, 5]]);
        assert_eq!(&bytes[..4], &[0x00, 0x00, 0x00, 0x05]);

        let mut sink = RecordingSink::default();
        let report = session(bytes, DecodeErrorPolicy::Skip).run(
            &FiveByteDecoder,
            &mut sink,
            &CancelFlag::new(),
        );

        assert_eq!(report.frames, 1);
        assert_eq!(report.end, SessionEnd::PeerClosed);
        assert_eq!(sink.frames.len(), 1);
        assert_eq!((sink.frames[0].width, sink.frames[0].height), (1, 1));
        assert_eq!(sink.frames[0].pixels, vec![9, 8, 7]);
        assert_eq!(sink.releases, 1);
    }

    #[test]
    fn n_png_frames_emitted_in_order() {
        let sizes = [(2u32, 3u32), (5, 1), (4, 4), (1, 9)];
        let pngs: Vec<Vec<u8>> = sizes.iter().map(|&(w, h)| encode_png(w, h)).collect();
        let refs: Vec<&[u8]> = pngs.iter().map(Vec::as_slice).collect();

        let mut sink = RecordingSink::default();
        let report = session(wire(&refs), DecodeErrorPolicy::Skip).run(
            &ImageDecoder::default(),
            &mut sink,
            &CancelFlag::new(),
        );

        assert_eq!(report.frames, sizes.len() as u64);
        let seen: Vec<(u32, u32)> = sink.frames.iter().map(|f| (f.width, f.height)).collect();
        assert_eq!(seen, sizes);
        let total: usize = pngs.iter().map(Vec::len).sum();
        assert_eq!(report.bytes, total as u64);
    }

    #[test]
    fn empty_stream_emits_nothing() {
        let mut sink = RecordingSink::default();
        let report = session(Vec::new(), DecodeErrorPolicy::Skip).run(
            &ImageDecoder::default(),
            &mut sink,
            &CancelFlag::new(),
        );

        assert_eq!(report.frames, 0);
        assert_eq!(report.end, SessionEnd::PeerClosed);
        assert!(report.end.is_normal_close());
        assert_eq!(sink.releases, 1);
    }

    #[test]
    fn truncated_payload_is_not_emitted() {
        let mut bytes = wire(&[b"12345"]);
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x05, b'a', b'b']);

        let mut sink = RecordingSink::default();
        let report = session(bytes, DecodeErrorPolicy::Skip).run(
            &FiveByteDecoder,
            &mut sink,
            &CancelFlag::new(),
        );

        assert_eq!(report.frames, 1);
        assert_eq!(
            report.end,
            SessionEnd::ShortRead {
                buffered: 2,
                expected: 5
            }
        );
        assert!(report.end.is_normal_close());
    }

    #[test]
    fn decode_error_skip_keeps_reading() {
        let png = encode_png(2, 2);
        let bytes = wire(&[b"junk", &png]);

        let mut sink = RecordingSink::default();
        let report = session(bytes, DecodeErrorPolicy::Skip).run(
            &ImageDecoder::default(),
            &mut sink,
            &CancelFlag::new(),
        );

        assert_eq!(report.decode_failures, 1);
        assert_eq!(report.frames, 1);
        assert!(report.last_decode_error.is_some());
        assert_eq!(report.end, SessionEnd::PeerClosed);
    }

    #[test]
    fn decode_error_disconnect_ends_session() {
        let png = encode_png(2, 2);
        let bytes = wire(&[b"junk", &png]);

        let mut sink = RecordingSink::default();
        let report = session(bytes, DecodeErrorPolicy::Disconnect).run(
            &ImageDecoder::default(),
            &mut sink,
            &CancelFlag::new(),
        );

        assert_eq!(report.end, SessionEnd::DecodeFailed);
        assert_eq!(report.frames, 0);
        assert_eq!(sink.releases, 1);
    }

    #[test]
    fn oversized_prefix_ends_session() {
        let reader = FrameReader::with_config(
            Cursor::new(vec![0x7F, 0xFF, 0xFF, 0xFF]),
            framecast_frame::FrameConfig {
                max_payload_size: 1024,
                ..Default::default()
            },
        );
        let mut sink = RecordingSink::default();
        let report = Session::new(reader, "p", DecodeErrorPolicy::Skip).run(
            &FiveByteDecoder,
            &mut sink,
            &CancelFlag::new(),
        );

        assert_eq!(
            report.end,
            SessionEnd::OversizedPayload {
                size: 0x7FFF_FFFF,
                max: 1024
            }
        );
        assert_eq!(sink.releases, 1);
    }

    #[test]
    fn sink_quit_stops_after_current_frame() {
        let bytes = wire(&[b"aaaaa", b"bbbbb", b"ccccc"]);
        let mut sink = RecordingSink {
            quit_after: Some(2),
            ..Default::default()
        };
        let report = session(bytes, DecodeErrorPolicy::Skip).run(
            &FiveByteDecoder,
            &mut sink,
            &CancelFlag::new(),
        );

        assert_eq!(report.end, SessionEnd::SinkCancelled);
        assert_eq!(report.frames, 2);
    }

    #[test]
    fn render_failure_ends_session() {
        let mut sink = RecordingSink {
            fail_render: true,
            ..Default::default()
        };
        let report = session(wire(&[b"aaaaa"]), DecodeErrorPolicy::Skip).run(
            &FiveByteDecoder,
            &mut sink,
            &CancelFlag::new(),
        );

        assert!(matches!(report.end, SessionEnd::Failed { .. }));
        assert_eq!(sink.releases, 1);
    }

    #[test]
    fn raised_cancel_flag_interrupts_before_reading() {
        let cancel = CancelFlag::new();
        cancel.cancel();

        let mut sink = RecordingSink::default();
        let report = session(wire(&[b"aaaaa"]), DecodeErrorPolicy::Skip).run(
            &FiveByteDecoder,
            &mut sink,
            &cancel,
        );

        assert_eq!(report.end, SessionEnd::Interrupted);
        assert_eq!(report.frames, 0);
        assert_eq!(sink.releases, 1);
    }

    /// Times out forever once its bytes are used up, like a quiet peer.
    struct QuietPeer {
        bytes: Cursor<Vec<u8>>,
        cancel: CancelFlag,
        timeouts: usize,
    }

    impl Read for QuietPeer {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.bytes.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            self.timeouts += 1;
            if self.timeouts == 3 {
                self.cancel.cancel();
            }
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }
    }

    #[test]
    fn cancel_observed_while_peer_is_quiet() {
        let cancel = CancelFlag::new();
        let peer = QuietPeer {
            bytes: Cursor::new(wire(&[b"aaaaa"])),
            cancel: cancel.clone(),
            timeouts: 0,
        };

        let mut sink = RecordingSink::default();
        let mut session = Session::new(FrameReader::new(peer), "quiet", DecodeErrorPolicy::Skip);
        let report = session.run(&FiveByteDecoder, &mut sink, &cancel);

        assert_eq!(report.end, SessionEnd::Interrupted);
        assert_eq!(report.frames, 1);
        assert_eq!(session.into_reader().get_ref().timeouts, 3);
    }

    #[test]
    fn report_serializes_with_tagged_end() {
        let report = SessionReport {
            peer: "10.0.0.2:5000".to_string(),
            frames: 4,
            decode_failures: 0,
            bytes: 1200,
            last_decode_error: None,
            end: SessionEnd::ShortRead {
                buffered: 2,
                expected: 4,
            },
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["end"]["reason"], "short_read");
        assert_eq!(json["end"]["expected"], 4);
        assert_eq!(json["frames"], 4);
    }
}
