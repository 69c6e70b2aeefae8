//! Length-prefixed frame transport for encoded video frames.
//!
//! Every message on the wire is:
//! - A 4-byte big-endian payload length
//! - Exactly that many payload bytes (one encoded image)
//!
//! There is no magic, no channel and no end-of-stream marker. A stream that
//! ends anywhere, including mid-frame, is a normal close.

pub mod codec;
pub mod error;
pub mod reader;
#[cfg(feature = "async")]
pub mod tokio_codec;
pub mod writer;

pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use reader::{CloseReason, FrameReader};
#[cfg(feature = "async")]
pub use tokio_codec::LengthPrefixCodec;
pub use writer::FrameWriter;
