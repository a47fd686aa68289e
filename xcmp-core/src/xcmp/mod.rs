//! XCMP: the outer, length-prefixed control-message framing.

mod codec;
mod opcode;
pub mod messages;

pub use codec::{MessageType, XcmpMessage};
pub use opcode::{Opcode, ResultCode};
