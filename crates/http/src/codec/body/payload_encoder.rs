use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;

use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::length_encoder::LengthEncoder;
use crate::protocol::{PayloadItem, ResponseMode, SendError};

/// How a response body is delimited on the wire, as handed to the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// `Content-Length` framing.
    Length(u64),
    /// `Transfer-Encoding: chunked` framing.
    Chunked,
    /// Raw bytes delimited by closing the connection.
    UntilClose,
    /// No body follows the head, as for `HEAD`, 1xx, 204 and 304 responses.
    None,
}

impl From<ResponseMode> for BodyFraming {
    fn from(mode: ResponseMode) -> Self {
        match mode {
            ResponseMode::FixedLength(length) => BodyFraming::Length(length),
            ResponseMode::Chunked => BodyFraming::Chunked,
            ResponseMode::CloseOnComplete => BodyFraming::UntilClose,
        }
    }
}

/// Encodes response bodies with the framing chosen for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEncoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthEncoder),
    Chunked(ChunkedEncoder),
    Raw { eof: bool },
    NoBody,
}

impl PayloadEncoder {
    pub fn new(framing: BodyFraming) -> Self {
        let kind = match framing {
            BodyFraming::Length(size) => Kind::Length(LengthEncoder::new(size)),
            BodyFraming::Chunked => Kind::Chunked(ChunkedEncoder::new()),
            BodyFraming::UntilClose => Kind::Raw { eof: false },
            BodyFraming::None => Kind::NoBody,
        };
        Self { kind }
    }

    pub fn is_finish(&self) -> bool {
        match &self.kind {
            Kind::Length(encoder) => encoder.is_finish(),
            Kind::Chunked(encoder) => encoder.is_finish(),
            Kind::Raw { eof } => *eof,
            Kind::NoBody => true,
        }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match &mut self.kind {
            Kind::Length(encoder) => encoder.encode(item, dst),
            Kind::Chunked(encoder) => encoder.encode(item, dst),
            Kind::Raw { eof } => {
                match item {
                    PayloadItem::Chunk(mut bytes) => {
                        while bytes.has_remaining() {
                            let chunk = bytes.chunk();
                            let n = chunk.len();
                            dst.extend_from_slice(chunk);
                            bytes.advance(n);
                        }
                    }
                    PayloadItem::Eof => *eof = true,
                }
                Ok(())
            }
            Kind::NoBody => Ok(()),
        }
    }
}
