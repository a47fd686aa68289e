//! The byte-stream interface the protocol stack is built on, and its
//! concrete transports.
//!
//! Grounded on the request/response `Transport` trait industrial protocol
//! clients commonly expose over a socket: connect once, then alternate
//! blocking sends and blocking receives, with no concurrent operations in
//! flight.

mod serial;
mod tcp;
mod udp;

pub use serial::PppSerialTransport;
pub use tcp::TcpTransport;
pub use udp::UdpTransport;

use crate::error::Result;

/// A connection-oriented, blocking byte pipe.
///
/// `receive` blocks until at least one full frame's worth of bytes has
/// arrived; implementations may return more than that (a TCP transport
/// reads exactly one length-prefixed XCMP frame at a time; a UDP or serial
/// transport returns whatever the underlying packet/read delivered). The
/// caller tolerates either by re-applying length-prefix framing above this
/// layer — see [`crate::xcmp::XcmpMessage::decode`].
pub trait ByteTransport: Send {
    fn connect(&mut self) -> Result<()>;
    fn disconnect(&mut self) -> Result<()>;
    fn send(&mut self, bytes: &[u8]) -> Result<()>;
    fn receive(&mut self) -> Result<Vec<u8>>;
    fn is_connected(&self) -> bool;
}
