use bytes::{Buf, BytesMut};
use std::io;
use std::io::ErrorKind;
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::body::{BodyFraming, PayloadEncoder};
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Message, ResponseHead, SendError};

/// Encodes a response head followed by its body items.
///
/// A new head is only accepted once the previous body reached its end. A body whose
/// announced length is fully written still takes the closing `Eof`.
#[derive(Default)]
pub struct ResponseEncoder {
    payload_encoder: Option<PayloadEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl<D: Buf> Encoder<Message<(ResponseHead, BodyFraming), D>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHead, BodyFraming), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, framing)) => {
                if self.payload_encoder.as_ref().is_some_and(|encoder| !encoder.is_finish()) {
                    error!("expect payload item but receive response head");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                }

                // kept even when already complete, so the closing `Eof` is still accepted
                self.payload_encoder = Some(PayloadEncoder::new(framing));
                HeaderEncoder.encode(head, dst)
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect response header but receive payload item");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                };

                let is_eof = payload_item.is_eof();
                let result = payload_encoder.encode(payload_item, dst);
                if result.is_err() || is_eof {
                    self.payload_encoder.take();
                }
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PayloadItem;
    use bytes::Bytes;
    use http::{Response, StatusCode, Version, header};

    fn head(version: Version) -> ResponseHead {
        Response::builder().status(StatusCode::OK).version(version).body(()).unwrap()
    }

    #[test]
    fn chunked_response() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        let mut head = head(Version::HTTP_11);
        head.headers_mut().insert(header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        encoder.encode(Message::<_, Bytes>::Header((head, BodyFraming::Chunked)), &mut dst).unwrap();
        encoder.encode(Message::<(ResponseHead, BodyFraming), _>::Payload(PayloadItem::Chunk(Bytes::from_static(b"hi"))), &mut dst).unwrap();
        encoder.encode(Message::<(ResponseHead, BodyFraming), Bytes>::Payload(PayloadItem::Eof), &mut dst).unwrap();

        assert_eq!(&dst[..], b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n2\r\nhi\r\n0\r\n\r\n");
    }

    #[test]
    fn head_only_response_accepts_next_head() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Message::<_, Bytes>::Header((head(Version::HTTP_11), BodyFraming::None)), &mut dst).unwrap();
        encoder.encode(Message::<_, Bytes>::Header((head(Version::HTTP_11), BodyFraming::Length(0))), &mut dst).unwrap();
    }

    #[test]
    fn fixed_length_body_takes_closing_eof() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        let mut first = head(Version::HTTP_11);
        first.headers_mut().insert(header::CONTENT_LENGTH, 12.into());
        encoder.encode(Message::<_, Bytes>::Header((first, BodyFraming::Length(12))), &mut dst).unwrap();
        encoder.encode(Message::<(ResponseHead, BodyFraming), _>::Payload(PayloadItem::Chunk(Bytes::from_static(b"hello world!"))), &mut dst).unwrap();
        encoder.encode(Message::<(ResponseHead, BodyFraming), Bytes>::Payload(PayloadItem::Eof), &mut dst).unwrap();

        let mut empty = head(Version::HTTP_11);
        empty.headers_mut().insert(header::CONTENT_LENGTH, 0.into());
        encoder.encode(Message::<_, Bytes>::Header((empty, BodyFraming::Length(0))), &mut dst).unwrap();
        encoder.encode(Message::<(ResponseHead, BodyFraming), Bytes>::Payload(PayloadItem::Eof), &mut dst).unwrap();

        assert_eq!(
            &dst[..],
            &b"HTTP/1.1 200 OK\r\ncontent-length: 12\r\n\r\nhello world!HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n"[..]
        );
    }

    #[test]
    fn body_past_declared_length_is_rejected() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Message::<_, Bytes>::Header((head(Version::HTTP_11), BodyFraming::Length(2))), &mut dst).unwrap();
        encoder.encode(Message::<(ResponseHead, BodyFraming), _>::Payload(PayloadItem::Chunk(Bytes::from_static(b"hi"))), &mut dst).unwrap();
        let overflow = Message::<(ResponseHead, BodyFraming), _>::Payload(PayloadItem::Chunk(Bytes::from_static(b"!")));
        assert!(encoder.encode(overflow, &mut dst).is_err());
    }

    #[test]
    fn http_09_body_is_raw() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Message::<_, Bytes>::Header((head(Version::HTTP_09), BodyFraming::UntilClose)), &mut dst).unwrap();
        encoder.encode(Message::<(ResponseHead, BodyFraming), _>::Payload(PayloadItem::Chunk(Bytes::from_static(b"<html>"))), &mut dst).unwrap();
        encoder.encode(Message::<(ResponseHead, BodyFraming), Bytes>::Payload(PayloadItem::Eof), &mut dst).unwrap();

        assert_eq!(&dst[..], b"<html>");
    }
}
