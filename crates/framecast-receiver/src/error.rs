/// Errors that can occur in receiver operations.
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    /// The listening socket could not be created.
    #[error("bind failed: {0}")]
    Bind(#[source] framecast_transport::TransportError),

    /// Transport-level error outside of bind.
    #[error("transport error: {0}")]
    Transport(#[from] framecast_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] framecast_frame::FrameError),

    /// Invalid receiver configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// A payload could not be turned into pixels.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload is empty.
    #[error("empty payload")]
    Empty,

    /// The image decoder rejected the payload.
    #[error("failed to decode {len}-byte payload: {source}")]
    Image {
        len: usize,
        source: image::ImageError,
    },
}

/// The display collaborator failed to render a frame.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink image error: {0}")]
    Image(#[from] image::ImageError),

    /// Pixel buffer does not match its declared dimensions.
    #[error("frame buffer is {actual} bytes, expected {expected}")]
    BufferMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, ReceiverError>;
