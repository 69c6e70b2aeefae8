//! Display capability.
//!
//! The receive loop never talks to a window system directly. It renders
//! through a [`FrameSink`] and asks the same sink whether the user wants to
//! stop, which is where a keypress or window-close would be reported.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use framecast_transport::CancelFlag;
use image::ImageFormat;
use tracing::{debug, info};

use crate::decode::DecodedFrame;
use crate::error::SinkError;

pub trait FrameSink {
    /// A new connection is about to deliver frames.
    fn begin(&mut self, _peer: SocketAddr) {}

    /// Show one decoded frame.
    fn render(&mut self, frame: &DecodedFrame) -> Result<(), SinkError>;

    /// True when the user asked to stop watching the current stream.
    fn poll_cancel(&mut self) -> bool {
        false
    }

    /// Drop any display resources. Called once per connection on every exit
    /// path; must tolerate repeated calls.
    fn release(&mut self) {}
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn begin(&mut self, peer: SocketAddr) {
        (**self).begin(peer)
    }

    fn render(&mut self, frame: &DecodedFrame) -> Result<(), SinkError> {
        (**self).render(frame)
    }

    fn poll_cancel(&mut self) -> bool {
        (**self).poll_cancel()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Logs one line per frame. Useful headless, or as a stand-in display.
#[derive(Debug, Default)]
pub struct LogSink {
    rendered: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self) -> u64 {
        self.rendered
    }
}

impl FrameSink for LogSink {
    fn render(&mut self, frame: &DecodedFrame) -> Result<(), SinkError> {
        self.rendered += 1;
        info!(
            seq = self.rendered,
            width = frame.width,
            height = frame.height,
            channels = frame.channels,
            encoded_len = frame.encoded_len,
            "frame"
        );
        Ok(())
    }
}

/// Keeps the latest frame on disk as an image file.
///
/// The format follows the file extension. Each frame is written to a
/// sibling temp file first and renamed over the target, so a viewer
/// polling the path never reads a half-written image.
#[derive(Debug)]
pub struct SnapshotSink {
    path: PathBuf,
    tmp_path: PathBuf,
    format: ImageFormat,
    written: u64,
}

impl SnapshotSink {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let format = ImageFormat::from_path(&path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());
        let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));
        Ok(Self {
            path,
            tmp_path,
            format,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for SnapshotSink {
    fn render(&mut self, frame: &DecodedFrame) -> Result<(), SinkError> {
        let image = frame.to_image().ok_or(SinkError::BufferMismatch {
            expected: frame.expected_len(),
            actual: frame.pixels.len(),
        })?;
        image.save_with_format(&self.tmp_path, self.format)?;
        std::fs::rename(&self.tmp_path, &self.path)?;
        self.written += 1;
        debug!(path = ?self.path, "snapshot updated");
        Ok(())
    }

    fn release(&mut self) {
        // A failed save can leave the temp file behind.
        let _ = std::fs::remove_file(&self.tmp_path);
    }
}

/// Wraps a sink and asks to stop after `limit` rendered frames.
///
/// With [`CountingSink::cancel_on_limit`] the limit also raises a shared
/// [`CancelFlag`], stopping the whole receiver instead of one connection.
#[derive(Debug)]
pub struct CountingSink<S> {
    inner: S,
    limit: u64,
    count: u64,
    cancel: Option<CancelFlag>,
}

impl<S: FrameSink> CountingSink<S> {
    pub fn new(inner: S, limit: u64) -> Self {
        Self {
            inner,
            limit,
            count: 0,
            cancel: None,
        }
    }

    pub fn cancel_on_limit(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn reached(&self) -> bool {
        self.count >= self.limit
    }
}

impl<S: FrameSink> FrameSink for CountingSink<S> {
    fn begin(&mut self, peer: SocketAddr) {
        self.inner.begin(peer)
    }

    fn render(&mut self, frame: &DecodedFrame) -> Result<(), SinkError> {
        self.inner.render(frame)?;
        self.count = self.count.saturating_add(1);
        if self.reached() {
            if let Some(cancel) = &self.cancel {
                cancel.cancel();
            }
        }
        Ok(())
    }

    fn poll_cancel(&mut self) -> bool {
        self.reached() || self.inner.poll_cancel()
    }

    fn release(&mut self) {
        self.inner.release()
    }
}
