//! Encoder for HTTP chunked transfer encoding.
//!
//! Every chunk is written as `<hex-length>\r\n<bytes>\r\n`. Empty chunks are skipped since a
//! zero length would read as the end of the body. The terminating `0\r\n\r\n` is written
//! exactly once; it only ends the logical body, the connection itself stays open.

use bytes::{Buf, BytesMut};
use std::io::Write;
use tokio_util::codec::Encoder;

use crate::codec::header::FastWrite;
use crate::protocol::{PayloadItem, SendError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkedEncoder {
    eof: bool,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(mut bytes) => {
                let len = bytes.remaining();
                if len == 0 {
                    return Ok(());
                }

                if len == 1 {
                    dst.extend_from_slice(&[b'1', b'\r', b'\n', bytes.get_u8(), b'\r', b'\n']);
                    return Ok(());
                }

                write!(FastWrite(dst), "{len:X}\r\n")?;
                dst.reserve(len + 2);
                while bytes.has_remaining() {
                    let chunk = bytes.chunk();
                    let n = chunk.len();
                    dst.extend_from_slice(chunk);
                    bytes.advance(n);
                }
                dst.extend_from_slice(b"\r\n");
                Ok(())
            }
            PayloadItem::Eof => {
                self.eof = true;
                dst.extend_from_slice(b"0\r\n\r\n");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::body::chunked_decoder::ChunkedDecoder;
    use crate::config::ParserLimits;
    use bytes::Bytes;
    use tokio_util::codec::Decoder;

    fn encode_all(chunks: &[&[u8]]) -> BytesMut {
        let mut encoder = ChunkedEncoder::new();
        let mut dst = BytesMut::new();
        for chunk in chunks {
            encoder.encode(PayloadItem::Chunk(Bytes::copy_from_slice(chunk)), &mut dst).unwrap();
        }
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();
        dst
    }

    fn decode_all(mut src: BytesMut) -> Vec<u8> {
        let mut decoder = ChunkedDecoder::new(ParserLimits::default());
        let mut body = Vec::new();
        loop {
            match decoder.decode(&mut src).unwrap().unwrap() {
                PayloadItem::Chunk(bytes) => body.extend_from_slice(&bytes),
                PayloadItem::Eof => break,
            }
        }
        assert!(src.is_empty());
        body
    }

    #[test]
    fn wire_format() {
        assert_eq!(&encode_all(&[&b"hello"[..], &b""[..], &b"!"[..]])[..], b"5\r\nhello\r\n1\r\n!\r\n0\r\n\r\n");
        assert_eq!(&encode_all(&[&[0u8; 255][..]])[..4], b"FF\r\n");
    }

    #[test]
    fn eof_is_written_once() {
        let mut encoder = ChunkedEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"late")), &mut dst).unwrap();

        assert!(encoder.is_finish());
        assert_eq!(&dst[..], b"0\r\n\r\n");
    }

    #[test]
    fn round_trip() {
        assert!(decode_all(encode_all(&[])).is_empty());
        assert_eq!(decode_all(encode_all(&[&b"x"[..]])), b"x");

        let large: Vec<u8> = (0..100 * 1024).map(|i| (i % 251) as u8).collect();
        let pieces: Vec<&[u8]> = large.chunks(16 * 1024).collect();
        assert_eq!(decode_all(encode_all(&pieces)), large);
    }
}
