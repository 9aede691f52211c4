//! Decoder implementation for HTTP chunked transfer encoding.
//!
//! Each chunk starts with a `<hex-size>[;extensions]` line; extensions are discarded. Data
//! is handed out as soon as it arrives and never across a chunk boundary. A zero size ends
//! the body, after which trailer fields are parsed with the regular header block parser
//! and dropped.
//!
//! See [RFC 9112 Section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1).

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::header::header_block::HeaderBlock;
use crate::codec::line::{LineReader, LineTooLong};
use crate::config::ParserLimits;
use crate::protocol::{ParseError, PayloadItem};

#[derive(Debug)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    line_reader: LineReader,
    limits: ParserLimits,
}

#[derive(Debug)]
enum ChunkedState {
    /// Waiting for a chunk size line
    Size,
    /// Inside chunk data
    Body { remaining: u64 },
    /// Waiting for the line break after chunk data
    BodyEnd,
    /// Reading trailer fields after the last chunk
    Trailers(HeaderBlock),
    /// Body fully read
    End,
}

impl ChunkedDecoder {
    pub fn new(limits: ParserLimits) -> Self {
        Self { state: ChunkedState::Size, line_reader: LineReader::new(), limits }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, ChunkedState::End)
    }

    fn read_size(&mut self, src: &mut BytesMut) -> Result<Option<u64>, ParseError> {
        let line = match self.line_reader.take_line(src, self.limits.max_chunk_line) {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(None),
            Err(LineTooLong(length)) => {
                return Err(ParseError::invalid_body(format!("chunk size line of {length} bytes is too long")));
            }
        };

        let size = line[..].split(|b| *b == b';').next().unwrap_or_default().trim_ascii();
        parse_hex(size).map(Some)
    }
}

fn parse_hex(digits: &[u8]) -> Result<u64, ParseError> {
    if digits.is_empty() {
        return Err(ParseError::invalid_body("empty chunk size"));
    }

    digits.iter().try_fold(0u64, |size, b| {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => return Err(ParseError::invalid_body("invalid chunk size")),
        };
        size.checked_mul(16)
            .and_then(|size| size.checked_add(u64::from(digit)))
            .ok_or_else(|| ParseError::invalid_body("chunk size overflow"))
    })
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    /// Decodes chunked transfer encoded data from the input buffer.
    ///
    /// # Returns
    /// - `Ok(Some(PayloadItem::Chunk(bytes)))` when chunk data is available
    /// - `Ok(Some(PayloadItem::Eof))` once the last chunk and trailers were read
    /// - `Ok(None)` when more data is needed
    /// - `Err(ParseError)` if the chunked encoding is invalid
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match &mut self.state {
                ChunkedState::Size => {
                    let Some(size) = self.read_size(src)? else {
                        return Ok(None);
                    };
                    trace!(size, "read chunk size");
                    self.state = if size == 0 {
                        ChunkedState::Trailers(HeaderBlock::new(self.limits.max_header_block, self.limits.max_headers))
                    } else {
                        ChunkedState::Body { remaining: size }
                    };
                }

                ChunkedState::Body { remaining } => {
                    if src.is_empty() {
                        return Ok(None);
                    }

                    let read_size = (*remaining).min(src.len() as u64);
                    *remaining -= read_size;
                    let bytes = src.split_to(read_size as usize).freeze();
                    if *remaining == 0 {
                        self.state = ChunkedState::BodyEnd;
                    }
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }

                ChunkedState::BodyEnd => match LineReader::take_terminator(src) {
                    Ok(true) => self.state = ChunkedState::Size,
                    Ok(false) => return Ok(None),
                    Err(()) => return Err(ParseError::invalid_body("missing line break after chunk data")),
                },

                ChunkedState::Trailers(block) => {
                    if !block.decode(src)? {
                        return Ok(None);
                    }
                    let trailers = block.take();
                    trace!(trailers = trailers.len(), "finished reading chunked data");
                    self.state = ChunkedState::End;
                    return Ok(Some(PayloadItem::Eof));
                }

                ChunkedState::End => return Ok(Some(PayloadItem::Eof)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn decoder() -> ChunkedDecoder {
        ChunkedDecoder::new(ParserLimits::default())
    }

    #[test]
    fn test_basic() {
        let mut buffer: BytesMut = BytesMut::from(&b"10\r\n1234567890abcdef\r\n0\r\n\r\n"[..]);
        let mut decoder = decoder();

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(item.is_chunk());
        assert_eq!(item.as_bytes().unwrap(), &Bytes::from_static(b"1234567890abcdef"));

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_multiple_chunks() {
        let mut buffer: BytesMut = BytesMut::from(&b"5\r\nhello\r\n7\r\n, world\r\n0\r\n\r\n"[..]);
        let mut decoder = decoder();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::copy_from_slice(b"hello"));

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::copy_from_slice(b", world"));

        let eof = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(eof.is_eof());
    }

    #[test]
    fn test_chunks_with_extensions() {
        let mut buffer: BytesMut = BytesMut::from(&b"5;chunk-ext=value\r\nhello\r\n0;last\r\n\r\n"[..]);
        let mut decoder = decoder();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::copy_from_slice(b"hello"));

        let eof = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(eof.is_eof());
    }

    #[test]
    fn test_chunks_with_trailers() {
        let mut buffer: BytesMut = BytesMut::from(&b"5\r\nhello\r\n0\r\nTrailer: value\r\nOther: x\r\n\r\nNEXT"[..]);
        let mut decoder = decoder();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::copy_from_slice(b"hello"));

        let eof = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(eof.is_eof());
        assert_eq!(&buffer[..], b"NEXT");
    }

    #[test]
    fn test_incomplete_chunk() {
        let mut buffer: BytesMut = BytesMut::from(&b"5\r\nhel"[..]);
        let mut decoder = decoder();

        // partial chunk data is handed out right away
        let chunk = decoder.decode(&mut buffer).unwrap();
        assert_eq!(chunk.unwrap().as_bytes().unwrap(), &Bytes::copy_from_slice(b"hel"));
        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"lo\r");
        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::copy_from_slice(b"lo"));
        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"\n0\r\n\r\n");
        let eof = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(eof.is_eof());
    }

    #[test]
    fn test_bare_lf_is_tolerated() {
        let mut buffer: BytesMut = BytesMut::from(&b"3\nabc\n0\n\n"[..]);
        let mut decoder = decoder();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::copy_from_slice(b"abc"));
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_invalid_chunk_size() {
        let mut buffer: BytesMut = BytesMut::from(&b"xyz\r\n"[..]);
        assert!(decoder().decode(&mut buffer).is_err());

        let mut buffer: BytesMut = BytesMut::from(&b"\r\n"[..]);
        assert!(decoder().decode(&mut buffer).is_err());

        let mut buffer: BytesMut = BytesMut::from(&b"1ffffffffffffffff\r\n"[..]);
        assert!(decoder().decode(&mut buffer).is_err());
    }

    #[test]
    fn test_overlong_size_line() {
        let limits = ParserLimits { max_chunk_line: 8, ..Default::default() };
        let mut buffer: BytesMut = BytesMut::from(&b"5;aaaaaaaaaaaaaaaaaaaa"[..]);
        assert!(ChunkedDecoder::new(limits).decode(&mut buffer).is_err());
    }

    #[test]
    fn test_missing_crlf() {
        let mut buffer: BytesMut = BytesMut::from(&b"5\r\nhelloBad"[..]);
        let mut decoder = decoder();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::copy_from_slice(b"hello"));

        assert!(decoder.decode(&mut buffer).is_err());
    }

    #[test]
    fn test_large_chunk() {
        let size = 1024 * 1024;
        let mut data = Vec::with_capacity(size + 16);
        data.extend(format!("{:x}\r\n", size).into_bytes());
        data.extend(vec![b'A'; size]);
        data.extend(b"\r\n0\r\n\r\n");

        let mut buffer = BytesMut::from(&data[..]);
        let mut decoder = decoder();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap().len(), size);
        assert!(chunk.as_bytes().unwrap().iter().all(|&b| b == b'A'));

        let eof = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(eof.is_eof());
    }
}
