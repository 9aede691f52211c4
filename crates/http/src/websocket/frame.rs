//! WebSocket frames as the server writes them.

use bytes::{BufMut, Bytes, BytesMut};

use crate::websocket::CloseReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl OpCode {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(OpCode::Continuation),
            0x1 => Some(OpCode::Text),
            0x2 => Some(OpCode::Binary),
            0x8 => Some(OpCode::Close),
            0x9 => Some(OpCode::Ping),
            0xA => Some(OpCode::Pong),
            _ => None,
        }
    }

    #[inline]
    pub fn is_control(self) -> bool {
        (self as u8) >= 0x8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: OpCode,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(opcode: OpCode, payload: Bytes, fin: bool) -> Self {
        Self { fin, opcode, payload }
    }

    pub fn ping(payload: Bytes) -> Self {
        Self::new(OpCode::Ping, payload, true)
    }

    pub fn pong(payload: Bytes) -> Self {
        Self::new(OpCode::Pong, payload, true)
    }

    /// A close frame; `None` sends an empty body.
    pub fn close(reason: Option<&CloseReason>) -> Self {
        let payload = match reason {
            None => Bytes::new(),
            Some(reason) => {
                // control payloads are capped at 125 bytes
                let mut text = reason.reason.as_str();
                if text.len() > 123 {
                    let mut end = 123;
                    while !text.is_char_boundary(end) {
                        end -= 1;
                    }
                    text = &text[..end];
                }
                let mut payload = BytesMut::with_capacity(2 + text.len());
                payload.put_u16(reason.code);
                payload.put_slice(text.as_bytes());
                payload.freeze()
            }
        };
        Self::new(OpCode::Close, payload, true)
    }

    /// Writes the header the server uses: never masked, shortest length encoding.
    pub fn encode_header(&self, dst: &mut BytesMut) {
        let mut b0 = self.opcode as u8;
        if self.fin {
            b0 |= 0x80;
        }
        dst.put_u8(b0);

        let length = self.payload.len();
        if length < 126 {
            dst.put_u8(length as u8);
        } else if length <= usize::from(u16::MAX) {
            dst.put_u8(126);
            dst.put_u16(length as u16);
        } else {
            dst.put_u8(127);
            dst.put_u64(length as u64);
        }
    }
}

/// Splits a message into frames of at most `max_size` payload bytes.
///
/// The first frame carries `opcode`, the following ones are continuations, and only the
/// last has `fin` set. An empty message is a single empty frame.
pub fn fragment(opcode: OpCode, payload: Bytes, max_size: usize) -> impl Iterator<Item = Frame> {
    let max_size = max_size.max(1);
    let total = payload.len();
    let count = total.div_ceil(max_size).max(1);

    (0..count).map(move |index| {
        let start = index * max_size;
        let end = (start + max_size).min(total);
        let opcode = if index == 0 { opcode } else { OpCode::Continuation };
        Frame::new(opcode, payload.slice(start..end), index + 1 == count)
    })
}
