use std::fmt;
use std::io;

use framecast_frame::FrameError;
use framecast_receiver::{ReceiverError, SinkError};
use framecast_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

/// A failure carrying the process exit code it maps to.
#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, addr } => {
            io_error(&format!("{context} ({addr})"), source)
        }
        TransportError::Connect { source, addr } => {
            io_error(&format!("{context} ({addr})"), source)
        }
        TransportError::Accept(source) | TransportError::Io(source) => io_error(context, source),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::OversizedPayload { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn receiver_error(context: &str, err: ReceiverError) -> CliError {
    match err {
        ReceiverError::Bind(err) | ReceiverError::Transport(err) => transport_error(context, err),
        ReceiverError::Frame(err) => frame_error(context, err),
        ReceiverError::Config(_) => CliError::new(USAGE, format!("{context}: {err}")),
    }
}

pub fn sink_error(context: &str, err: SinkError) -> CliError {
    match err {
        SinkError::Io(source) => io_error(context, source),
        other => CliError::new(USAGE, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_in_use_is_a_transport_error() {
        let err = transport_error(
            "bind failed",
            TransportError::Bind {
                addr: "0.0.0.0:8889".to_string(),
                source: io::Error::from(io::ErrorKind::AddrInUse),
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.contains("0.0.0.0:8889"));
    }

    #[test]
    fn oversized_payload_is_invalid_data() {
        let err = frame_error(
            "send failed",
            FrameError::OversizedPayload { size: 10, max: 5 },
        );
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn config_errors_are_usage_errors() {
        let err = receiver_error("listen", ReceiverError::Config("bad".to_string()));
        assert_eq!(err.code, USAGE);
    }
}
