//! # flowtest-protocol
//!
//! Wire format shared by the engine control service, its remote client and
//! the command gateway.
//!
//! A frame is a big-endian `u32` payload length followed by that many bytes
//! of bincode:
//!
//! ```text
//! | len: u32 (BE) | payload: [u8; len] |
//! ```
//!
//! Payloads are between 1 byte and [`MAX_PAYLOAD_SIZE`] bytes. A connection
//! that ends between two frames is a clean close
//! ([`TransportError::is_closed`]); one that ends inside a frame is
//! truncated.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

mod error;
mod messages;
mod transport;

pub use error::{Direction, TransportError, TransportResult};
pub use messages::{
    ControlRequest, ControlResponse, GatewayRequest, GatewayResponse, RecordsReceived, Status,
    StatusCode,
};
pub use transport::FrameTransport;

/// Largest payload a frame may carry.
pub const MAX_PAYLOAD_SIZE: usize = 1_048_576;

pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest frame on the wire, prefix included.
pub const MAX_FRAME_SIZE: usize = LENGTH_PREFIX_SIZE + MAX_PAYLOAD_SIZE;
