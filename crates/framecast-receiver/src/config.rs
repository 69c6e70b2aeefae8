use std::time::Duration;

use framecast_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};
use framecast_transport::{DEFAULT_BIND_ADDR, DEFAULT_POLL_INTERVAL, DEFAULT_PORT};

use crate::decode::ColorMode;
use crate::error::{ReceiverError, Result};

/// What to do with a payload that does not decode as an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeErrorPolicy {
    /// Log, count, and keep reading the same connection.
    #[default]
    Skip,
    /// Log and end the connection; the receiver goes back to accepting.
    Disconnect,
}

/// Receiver behavior configuration.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Interface to bind. Default: all interfaces.
    pub bind_addr: String,
    /// TCP port. Default: 8889.
    pub port: u16,
    /// Largest accepted payload in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Upper bound on how long a blocked accept/read waits before
    /// re-checking for cancellation.
    pub poll_interval: Duration,
    pub decode_error_policy: DecodeErrorPolicy,
    pub color_mode: ColorMode,
    /// Stop after serving this many connections. `None` runs until cancelled.
    pub max_connections: Option<usize>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            port: DEFAULT_PORT,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            poll_interval: DEFAULT_POLL_INTERVAL,
            decode_error_policy: DecodeErrorPolicy::default(),
            color_mode: ColorMode::default(),
            max_connections: None,
        }
    }
}

impl ReceiverConfig {
    /// Reject settings the receive loop cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_payload_size == 0 {
            return Err(ReceiverError::Config(
                "max payload size must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ReceiverError::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.max_connections == Some(0) {
            return Err(ReceiverError::Config(
                "connection limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Frame reader settings for accepted connections.
    ///
    /// The read timeout is the poll interval so a quiet peer never blocks
    /// cancellation.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
            read_timeout: Some(self.poll_interval),
            write_timeout: None,
        }
    }
}
