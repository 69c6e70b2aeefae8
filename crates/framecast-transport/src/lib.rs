//! TCP transport for framecast.
//!
//! This is the lowest layer: a listening [`TcpEndpoint`] that hands out one
//! [`Connection`] at a time. Everything else builds on the `Read + Write`
//! connection provided here.

pub mod connection;
pub mod error;
pub mod tcp;

pub use connection::Connection;
pub use error::{Result, TransportError};
pub use tcp::{CancelFlag, TcpEndpoint, DEFAULT_BIND_ADDR, DEFAULT_POLL_INTERVAL, DEFAULT_PORT};
