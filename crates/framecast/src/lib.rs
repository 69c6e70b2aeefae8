//! Receive and display length-prefixed video frames over TCP.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP listener and connection
//! - [`frame`]: 4-byte big-endian length-prefixed framing
//! - [`receiver`]: decoding, display and the one-connection-at-a-time accept loop

/// Re-export transport types.
pub mod transport {
    pub use framecast_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use framecast_frame::*;
}

/// Re-export receiver types.
pub mod receiver {
    pub use framecast_receiver::*;
}
