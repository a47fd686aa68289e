//! The XNL session layer: addressed, reliability-tagged framing and the
//! symmetric-key authentication handshake it sits behind.

mod codec;
mod session;
mod tea;

pub use codec::{XnlFrame, XnlProtocol};
pub use session::XnlSession;
pub use tea::{encrypt_block, TeaKey};
