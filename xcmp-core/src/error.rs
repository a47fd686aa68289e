use thiserror::Error;

use crate::xcmp::{MessageType, ResultCode};

/// Errors that can occur anywhere in the XCMP/XNL stack.
#[derive(Error, Debug)]
pub enum XcmpError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("framing error: {0}")]
    Framing(String),

    #[error("unexpected reply type: expected {expected:?}, got {got:?}")]
    UnexpectedReplyType { expected: MessageType, got: MessageType },

    #[error("opcode mismatch: expected {expected:#06x}, got {got:#06x}")]
    OpcodeMismatch { expected: u16, got: u16 },

    #[error("request failed with result {0:?}")]
    ResultFailure(ResultCode),

    #[error("authentication failed: {0}")]
    AuthFailure(String),

    #[error("ack mismatch: rollover/transaction id did not match the outstanding send")]
    AckMismatch,

    #[error("unsupported text encoding byte {0:#04x}")]
    EncodingError(u8),

    #[error("unsupported softpot value width {0} bytes")]
    UnsupportedWidth(u8),

    #[error("operation timed out")]
    Timeout,

    #[error("client is not connected")]
    NotConnected,

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, XcmpError>;
