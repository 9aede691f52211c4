use std::io;

use thiserror::Error;

use crate::protocol::SendError;

#[derive(Debug, Error)]
pub enum WebSocketError {
    #[error("reserved bits set without a negotiated extension")]
    ReservedBits,

    #[error("unknown opcode {0:#x}")]
    UnknownOpCode(u8),

    #[error("payload of {size} bytes exceeds the limit {max_size}")]
    PayloadTooLarge { size: u64, max_size: u64 },

    #[error("continuation frame without a fragmented message")]
    UnexpectedContinuation,

    #[error("data frame while a fragmented message is still open")]
    InterleavedMessage,

    #[error("invalid control frame: {0}")]
    InvalidControlFrame(&'static str),

    #[error("text payload is not valid utf-8")]
    InvalidUtf8,

    #[error("websocket is closed")]
    Closed,

    #[error("send error: {source}")]
    Send {
        #[from]
        source: SendError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl WebSocketError {
    /// The close code to send the peer before tearing the connection down, if any.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            WebSocketError::ReservedBits
            | WebSocketError::UnknownOpCode(_)
            | WebSocketError::UnexpectedContinuation
            | WebSocketError::InterleavedMessage
            | WebSocketError::InvalidControlFrame(_) => Some(CloseReason::PROTOCOL_ERROR),
            WebSocketError::InvalidUtf8 => Some(CloseReason::INVALID_PAYLOAD),
            WebSocketError::PayloadTooLarge { .. } => Some(CloseReason::TOO_BIG),
            WebSocketError::Closed | WebSocketError::Send { .. } | WebSocketError::Io { .. } => None,
        }
    }
}

/// Status code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const UNSUPPORTED: u16 = 1003;
    pub const INVALID_PAYLOAD: u16 = 1007;
    pub const POLICY: u16 = 1008;
    pub const TOO_BIG: u16 = 1009;
    pub const INTERNAL: u16 = 1011;

    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self { code, reason: reason.into() }
    }

    /// Codes a peer may put on the wire.
    pub fn is_valid_code(code: u16) -> bool {
        matches!(code, 1000..=1003 | 1007..=1011 | 3000..=4999)
    }
}
