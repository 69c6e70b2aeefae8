//! Receive, decode and display a stream of length-prefixed image frames.
//!
//! A [`Receiver`] accepts one TCP connection at a time and runs a
//! [`Session`] over it: read a frame, decode it with a [`FrameDecoder`],
//! hand it to a [`FrameSink`], repeat until the peer goes away or someone
//! asks to stop.

pub mod config;
pub mod decode;
pub mod display;
pub mod error;
pub mod server;
pub mod session;

pub use config::{DecodeErrorPolicy, ReceiverConfig};
pub use decode::{ColorMode, DecodedFrame, FrameDecoder, ImageDecoder};
pub use display::{CountingSink, FrameSink, LogSink, SnapshotSink};
pub use error::{DecodeError, ReceiverError, Result, SinkError};
pub use framecast_transport::CancelFlag;
pub use server::{Receiver, ServeSummary};
pub use session::{Session, SessionEnd, SessionReport};
