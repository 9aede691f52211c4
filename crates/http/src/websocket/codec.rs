//! RFC 6455 frame decoding and encoding.
//!
//! [`FrameCodec`] turns inbound frames into complete [`WsMessage`]s: masked payloads are
//! unmasked, fragmented messages are reassembled under the original opcode, and control
//! frames are handed out as soon as they arrive, even in the middle of a fragmented
//! message. Every violation is fatal for the connection; [`WebSocketError::close_code`]
//! tells which close code to answer with.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::ensure;
use crate::websocket::frame::{Frame, OpCode};
use crate::websocket::{CloseReason, WebSocketError};

/// A complete inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<CloseReason>),
}

#[derive(Debug)]
pub struct FrameCodec {
    max_payload: u64,
    fragments: Option<(OpCode, BytesMut)>,
}

struct FrameHeader {
    fin: bool,
    opcode: OpCode,
    mask: Option<[u8; 4]>,
    header_len: usize,
    payload_len: u64,
}

impl FrameCodec {
    pub fn new(max_payload: u64) -> Self {
        Self { max_payload, fragments: None }
    }

    /// Parses the frame header at the start of `src` without consuming it.
    fn peek_header(&self, src: &[u8]) -> Result<Option<FrameHeader>, WebSocketError> {
        if src.len() < 2 {
            return Ok(None);
        }

        let (b0, b1) = (src[0], src[1]);
        ensure!(b0 & 0x70 == 0, WebSocketError::ReservedBits);
        let opcode = OpCode::from_u8(b0 & 0x0f).ok_or(WebSocketError::UnknownOpCode(b0 & 0x0f))?;
        let fin = b0 & 0x80 != 0;
        let masked = b1 & 0x80 != 0;

        let (length_len, short_len) = match b1 & 0x7f {
            126 => (2, None),
            127 => (8, None),
            length => (0, Some(u64::from(length))),
        };
        let header_len = 2 + length_len + if masked { 4 } else { 0 };
        if src.len() < header_len {
            return Ok(None);
        }

        let payload_len = match short_len {
            Some(length) => length,
            None if length_len == 2 => u64::from(u16::from_be_bytes([src[2], src[3]])),
            None => {
                let mut length = [0u8; 8];
                length.copy_from_slice(&src[2..10]);
                u64::from_be_bytes(length)
            }
        };

        if opcode.is_control() {
            ensure!(fin, WebSocketError::InvalidControlFrame("fragmented control frame"));
            ensure!(payload_len <= 125, WebSocketError::InvalidControlFrame("control payload longer than 125 bytes"));
        }

        let buffered = match (&self.fragments, opcode) {
            (Some((_, buffer)), OpCode::Continuation) => buffer.len() as u64,
            _ => 0,
        };
        let size = buffered.saturating_add(payload_len);
        ensure!(size <= self.max_payload, WebSocketError::PayloadTooLarge { size, max_size: self.max_payload });

        let mask = masked.then(|| {
            let start = 2 + length_len;
            [src[start], src[start + 1], src[start + 2], src[start + 3]]
        });
        Ok(Some(FrameHeader { fin, opcode, mask, header_len, payload_len }))
    }

    fn complete(opcode: OpCode, payload: Bytes) -> Result<WsMessage, WebSocketError> {
        match opcode {
            OpCode::Text => String::from_utf8(payload.into()).map(WsMessage::Text).map_err(|_| WebSocketError::InvalidUtf8),
            _ => Ok(WsMessage::Binary(payload)),
        }
    }
}

fn unmask(payload: &mut [u8], mask: [u8; 4]) {
    for (index, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[index % 4];
    }
}

fn parse_close(payload: &[u8]) -> Result<Option<CloseReason>, WebSocketError> {
    match payload.len() {
        0 => Ok(None),
        1 => Err(WebSocketError::InvalidControlFrame("close payload of one byte")),
        _ => {
            let code = u16::from_be_bytes([payload[0], payload[1]]);
            ensure!(CloseReason::is_valid_code(code), WebSocketError::InvalidControlFrame("invalid close code"));
            let reason = std::str::from_utf8(&payload[2..]).map_err(|_| WebSocketError::InvalidUtf8)?;
            Ok(Some(CloseReason::new(code, reason)))
        }
    }
}

impl Decoder for FrameCodec {
    type Item = WsMessage;
    type Error = WebSocketError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(header) = self.peek_header(src)? else {
                return Ok(None);
            };

            // payload_len is bounded by max_payload, which fits in memory
            let frame_len = header.header_len + header.payload_len as usize;
            if src.len() < frame_len {
                src.reserve(frame_len - src.len());
                return Ok(None);
            }

            src.advance(header.header_len);
            let mut payload = src.split_to(header.payload_len as usize);
            if let Some(mask) = header.mask {
                unmask(&mut payload, mask);
            }
            trace!(opcode = ?header.opcode, fin = header.fin, length = payload.len(), "decoded frame");

            match header.opcode {
                OpCode::Ping => return Ok(Some(WsMessage::Ping(payload.freeze()))),
                OpCode::Pong => return Ok(Some(WsMessage::Pong(payload.freeze()))),
                OpCode::Close => return parse_close(&payload).map(|reason| Some(WsMessage::Close(reason))),

                OpCode::Continuation => {
                    let Some((_, buffer)) = &mut self.fragments else {
                        return Err(WebSocketError::UnexpectedContinuation);
                    };
                    buffer.extend_from_slice(&payload);
                    if header.fin {
                        if let Some((opcode, buffer)) = self.fragments.take() {
                            return Self::complete(opcode, buffer.freeze()).map(Some);
                        }
                    }
                }

                opcode @ (OpCode::Text | OpCode::Binary) => {
                    ensure!(self.fragments.is_none(), WebSocketError::InterleavedMessage);
                    if header.fin {
                        return Self::complete(opcode, payload.freeze()).map(Some);
                    }
                    self.fragments = Some((opcode, payload));
                }
            }
        }
    }
}

/// Frame encoder for server-sent frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameEncoder;

impl Encoder<Frame> for FrameEncoder {
    type Error = WebSocketError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(frame.payload.len() + 10);
        frame.encode_header(dst);
        dst.extend_from_slice(&frame.payload);
        Ok(())
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = WebSocketError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        FrameEncoder.encode(frame, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::frame::fragment;

    const MAX: u64 = 1024 * 1024;

    /// Encodes `frame` the way a client would, masked with `mask`.
    fn client_frame(frame: &Frame, mask: [u8; 4]) -> Vec<u8> {
        let mut header = BytesMut::new();
        frame.encode_header(&mut header);
        let mut out = header.to_vec();
        out[1] |= 0x80;
        out.extend_from_slice(&mask);
        out.extend(frame.payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
        out
    }

    #[test]
    fn masked_text_test_vector() {
        let mut src = BytesMut::from(&[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58][..]);
        let message = FrameCodec::new(MAX).decode(&mut src).unwrap();
        assert_eq!(message, Some(WsMessage::Text("Hello".to_string())));
        assert!(src.is_empty());
    }

    #[test]
    fn unmasked_frames_are_accepted() {
        let mut src = BytesMut::from(&[0x81, 0x05, b'H', b'e', b'l', b'l', b'o'][..]);
        assert_eq!(FrameCodec::new(MAX).decode(&mut src).unwrap(), Some(WsMessage::Text("Hello".to_string())));
    }

    #[test]
    fn waits_for_complete_frame() {
        let bytes = [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58];
        let mut codec = FrameCodec::new(MAX);
        let mut src = BytesMut::new();
        for (index, byte) in bytes.iter().enumerate() {
            src.extend_from_slice(&[*byte]);
            let decoded = codec.decode(&mut src).unwrap();
            assert_eq!(decoded.is_some(), index == bytes.len() - 1);
        }
    }

    #[test]
    fn fragmented_round_trip() {
        let message: String = (0..10_000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let frames: Vec<_> = fragment(OpCode::Text, Bytes::from(message.clone()), 4096).collect();
        assert_eq!(frames.len(), 3);

        let mut src = BytesMut::new();
        for frame in &frames {
            src.extend_from_slice(&client_frame(frame, [1, 2, 3, 4]));
        }

        let mut codec = FrameCodec::new(MAX);
        assert_eq!(codec.decode(&mut src).unwrap(), Some(WsMessage::Text(message)));
        assert!(codec.decode(&mut src).unwrap().is_none());
    }

    #[test]
    fn control_frames_interleave_with_fragments() {
        let mut src = BytesMut::new();
        src.extend_from_slice(&client_frame(&Frame::new(OpCode::Binary, Bytes::from_static(b"ab"), false), [9, 9, 9, 9]));
        src.extend_from_slice(&client_frame(&Frame::ping(Bytes::from_static(b"p")), [9, 9, 9, 9]));
        src.extend_from_slice(&client_frame(&Frame::new(OpCode::Continuation, Bytes::from_static(b"cd"), true), [9, 9, 9, 9]));

        let mut codec = FrameCodec::new(MAX);
        assert_eq!(codec.decode(&mut src).unwrap(), Some(WsMessage::Ping(Bytes::from_static(b"p"))));
        assert_eq!(codec.decode(&mut src).unwrap(), Some(WsMessage::Binary(Bytes::from_static(b"abcd"))));
    }

    #[test]
    fn close_frame_reason() {
        let frame = Frame::close(Some(&CloseReason::new(CloseReason::GOING_AWAY, "later")));
        let mut src = BytesMut::from(&client_frame(&frame, [0, 1, 0, 1])[..]);
        let message = FrameCodec::new(MAX).decode(&mut src).unwrap();
        assert_eq!(message, Some(WsMessage::Close(Some(CloseReason::new(1001, "later")))));
    }

    #[test]
    fn protocol_violations() {
        let cases: [(&[u8], u16); 6] = [
            (&[0xC1, 0x00], CloseReason::PROTOCOL_ERROR),
            (&[0x83, 0x00], CloseReason::PROTOCOL_ERROR),
            (&[0x80, 0x00], CloseReason::PROTOCOL_ERROR),
            (&[0x09, 0x00], CloseReason::PROTOCOL_ERROR),
            (&[0x81, 0x02, 0xc3, 0x28], CloseReason::INVALID_PAYLOAD),
            (&[0x82, 0x7f, 0, 0, 0, 0, 0, 0x20, 0, 0], CloseReason::TOO_BIG),
        ];

        for (bytes, code) in cases {
            let mut src = BytesMut::from(bytes);
            let error = FrameCodec::new(MAX).decode(&mut src).unwrap_err();
            assert_eq!(error.close_code(), Some(code), "{bytes:x?}");
        }
    }

    #[test]
    fn cumulative_fragment_limit() {
        let mut src = BytesMut::new();
        src.extend_from_slice(&client_frame(&Frame::new(OpCode::Binary, Bytes::from(vec![0; 600]), false), [1, 1, 1, 1]));
        src.extend_from_slice(&client_frame(&Frame::new(OpCode::Continuation, Bytes::from(vec![0; 600]), true), [1, 1, 1, 1]));

        let error = FrameCodec::new(1000).decode(&mut src).unwrap_err();
        assert!(matches!(error, WebSocketError::PayloadTooLarge { size: 1200, max_size: 1000 }));
    }

    #[test]
    fn encoder_never_masks() {
        let mut dst = BytesMut::new();
        FrameEncoder.encode(Frame::new(OpCode::Text, Bytes::from_static(b"hi"), true), &mut dst).unwrap();
        assert_eq!(&dst[..], &[0x81, 0x02, b'h', b'i']);
    }
}
