//! HTTP response head encoder.
//!
//! Writes the status line and header fields exactly as negotiated by the adapter; framing
//! headers (`Content-Length`, `Transfer-Encoding`, `Connection`) are expected to be on the
//! head already. HTTP/0.9 responses have neither status line nor headers, so nothing is
//! written for them.

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::Version;
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::{ResponseHead, SendError};

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 1024;

pub struct HeaderEncoder;

impl Encoder<ResponseHead> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, head: ResponseHead, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let version = match head.version() {
            Version::HTTP_09 => return Ok(()),
            Version::HTTP_10 => "HTTP/1.0",
            Version::HTTP_11 => "HTTP/1.1",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(io::Error::from(io::ErrorKind::Unsupported).into());
            }
        };

        dst.reserve(INIT_HEADER_SIZE);
        let status = head.status();
        write!(FastWrite(dst), "{} {} {}\r\n", version, status.as_str(), status.canonical_reason().unwrap_or(""))?;

        for (header_name, header_value) in head.headers() {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// `io::Write` over a `BytesMut`, so `write!` can format straight into the output buffer.
pub(crate) struct FastWrite<'a>(pub(crate) &'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Response, StatusCode, header};

    #[test]
    fn writes_status_line_for_request_version() {
        let head = Response::builder()
            .status(StatusCode::NOT_FOUND)
            .version(Version::HTTP_10)
            .header(header::CONTENT_LENGTH, 0)
            .body(())
            .unwrap();

        let mut dst = BytesMut::new();
        HeaderEncoder.encode(head, &mut dst).unwrap();
        assert_eq!(&dst[..], b"HTTP/1.0 404 Not Found\r\ncontent-length: 0\r\n\r\n");
    }

    #[test]
    fn http_09_writes_nothing() {
        let head = Response::builder().version(Version::HTTP_09).body(()).unwrap();

        let mut dst = BytesMut::new();
        HeaderEncoder.encode(head, &mut dst).unwrap();
        assert!(dst.is_empty());
    }
}
