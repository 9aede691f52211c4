//! Incremental parser for a `key: value` header block.
//!
//! Used for the request header section and for the trailer section of chunked bodies. The
//! block ends at the first empty line. A line starting with a space or a tab continues the
//! previous header's value: both parts are trimmed and joined with a single space.

use bytes::BytesMut;
use http::{HeaderMap, HeaderName, HeaderValue};
use tracing::trace;

use crate::codec::line::{LineReader, LineTooLong};
use crate::ensure;
use crate::protocol::ParseError;

#[derive(Debug)]
pub(crate) struct HeaderBlock {
    map: HeaderMap,
    pending: Option<(HeaderName, Vec<u8>)>,
    line_reader: LineReader,
    size: usize,
    max_size: usize,
    max_headers: usize,
}

impl HeaderBlock {
    pub(crate) fn new(max_size: usize, max_headers: usize) -> Self {
        Self { map: HeaderMap::new(), pending: None, line_reader: LineReader::new(), size: 0, max_size, max_headers }
    }

    /// Consumes header lines from `src`.
    ///
    /// Returns `Ok(true)` once the terminating empty line was read; the block is then
    /// available through [`HeaderBlock::take`].
    pub(crate) fn decode(&mut self, src: &mut BytesMut) -> Result<bool, ParseError> {
        loop {
            let budget = self.max_size.saturating_sub(self.size);
            let before = src.len();
            let line = match self.line_reader.take_line(src, budget) {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(false),
                Err(LineTooLong(length)) => return Err(ParseError::too_large_header(self.size + length, self.max_size)),
            };
            self.size += before - src.len();

            if line.is_empty() {
                self.flush_pending()?;
                trace!(headers = self.map.len(), size = self.size, "parsed header block");
                return Ok(true);
            }

            if matches!(line[0], b' ' | b'\t') {
                self.continue_pending(&line)?;
            } else {
                self.flush_pending()?;
                self.start_header(&line)?;
            }
        }
    }

    /// Hands out the parsed headers, leaving an empty block behind.
    pub(crate) fn take(&mut self) -> HeaderMap {
        self.size = 0;
        std::mem::take(&mut self.map)
    }

    fn start_header(&mut self, line: &[u8]) -> Result<(), ParseError> {
        let colon = line
            .iter()
            .position(|b| *b == b':')
            .ok_or_else(|| ParseError::invalid_header(format!("missing colon in {:?}", String::from_utf8_lossy(line))))?;

        let name = line[..colon].trim_ascii();
        ensure!(!name.is_empty(), ParseError::invalid_header("empty header name"));
        let name = HeaderName::from_bytes(name).map_err(ParseError::invalid_header)?;

        self.pending = Some((name, line[colon + 1..].trim_ascii().to_vec()));
        Ok(())
    }

    fn continue_pending(&mut self, line: &[u8]) -> Result<(), ParseError> {
        let Some((_, value)) = &mut self.pending else {
            return Err(ParseError::invalid_header("continuation line without a header"));
        };

        let folded = line.trim_ascii();
        if folded.is_empty() {
            return Ok(());
        }
        if !value.is_empty() {
            value.push(b' ');
        }
        value.extend_from_slice(folded);
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<(), ParseError> {
        let Some((name, value)) = self.pending.take() else {
            return Ok(());
        };

        ensure!(self.map.len() < self.max_headers, ParseError::too_many_headers(self.max_headers));
        let value = HeaderValue::from_bytes(&value).map_err(ParseError::invalid_header)?;
        self.map.append(name, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn folds_continuation_lines() {
        let mut block = HeaderBlock::new(1024, 16);
        let mut buf = BytesMut::from(&b"X-A: 1,\r\n  2\r\nX-B: b\r\n\r\nbody"[..]);

        assert!(block.decode(&mut buf).unwrap());
        let map = block.take();
        assert_eq!(map.get("x-a").unwrap(), "1, 2");
        assert_eq!(map.get("x-b").unwrap(), "b");
        assert_eq!(&buf[..], b"body");
    }

    #[test]
    fn keeps_repeated_headers_in_order() {
        let mut block = HeaderBlock::new(1024, 16);
        let mut buf = BytesMut::from(indoc! {"
            Accept: text/html
            accept: application/json

        "});

        assert!(block.decode(&mut buf).unwrap());
        let map = block.take();
        let values: Vec<_> = map.get_all("ACCEPT").iter().collect();
        assert_eq!(values, ["text/html", "application/json"]);
    }

    #[test]
    fn resumes_across_reads() {
        let mut block = HeaderBlock::new(1024, 16);
        let mut buf = BytesMut::from(&b"Host: exam"[..]);
        assert!(!block.decode(&mut buf).unwrap());

        buf.extend_from_slice(b"ple.com\r\n\tcontinued\r\n");
        assert!(!block.decode(&mut buf).unwrap());

        buf.extend_from_slice(b"\r\n");
        assert!(block.decode(&mut buf).unwrap());
        assert_eq!(block.take().get("host").unwrap(), "example.com continued");
    }

    #[test]
    fn enforces_limits() {
        let mut block = HeaderBlock::new(16, 16);
        let mut buf = BytesMut::from(&b"X-Long: 0123456789abcdef\r\n\r\n"[..]);
        assert!(matches!(block.decode(&mut buf), Err(ParseError::TooLargeHeader { .. })));

        let mut block = HeaderBlock::new(1024, 1);
        let mut buf = BytesMut::from(&b"A: 1\r\nB: 2\r\n\r\n"[..]);
        assert!(matches!(block.decode(&mut buf), Err(ParseError::TooManyHeaders { .. })));
    }

    #[test]
    fn rejects_malformed_lines() {
        let mut block = HeaderBlock::new(1024, 16);
        let mut buf = BytesMut::from(&b"no colon here\r\n\r\n"[..]);
        assert!(matches!(block.decode(&mut buf), Err(ParseError::InvalidHeader { .. })));

        let mut block = HeaderBlock::new(1024, 16);
        let mut buf = BytesMut::from(&b" orphan\r\n\r\n"[..]);
        assert!(matches!(block.decode(&mut buf), Err(ParseError::InvalidHeader { .. })));
    }
}
