//! HTTP request head decoder.
//!
//! Parses the request line and, unless the request is the header-less HTTP/0.9 form, the
//! header block that follows. Decoding is resumable: a partial read returns `Ok(None)` and
//! the next call picks up exactly where the previous one stopped.
//!
//! # Limits
//!
//! All caps come from [`ParserLimits`]: the request line, the whole header block and the
//! number of header fields. Exceeding any of them is a [`ParseError`] carrying the status
//! the client should see (414 or 431), never an unbounded buffer.

use bytes::{Bytes, BytesMut};
use http::{Method, Uri, Version};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::header::header_block::HeaderBlock;
use crate::codec::line::{LineReader, LineTooLong};
use crate::config::ParserLimits;
use crate::ensure;
use crate::protocol::{HeaderCharset, HeaderMultiMap, ParseError, PayloadSize, RequestHead};

/// Decoder for the request line and header block.
pub struct HeaderDecoder {
    limits: ParserLimits,
    charset: HeaderCharset,
    line_reader: LineReader,
    state: State,
}

#[derive(Debug)]
enum State {
    RequestLine,
    Headers { line: RequestLine, block: HeaderBlock },
}

#[derive(Debug)]
struct RequestLine {
    method: Method,
    uri: Uri,
    version: Version,
}

impl HeaderDecoder {
    pub fn new(limits: ParserLimits, charset: HeaderCharset) -> Self {
        Self { limits, charset, line_reader: LineReader::new(), state: State::RequestLine }
    }

    fn build(&self, line: RequestLine, headers: http::HeaderMap) -> Result<(RequestHead, PayloadSize), ParseError> {
        let head = RequestHead::new(line.method, line.uri, line.version, HeaderMultiMap::new(headers, self.charset));
        let payload_size = head.payload_size()?;
        trace!(method = %head.method(), uri = %head.uri(), version = ?head.version(), "parsed request head");
        Ok((head, payload_size))
    }
}

impl Decoder for HeaderDecoder {
    type Item = (RequestHead, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match &mut self.state {
                State::RequestLine => {
                    let line = match self.line_reader.take_line(src, self.limits.max_request_line) {
                        Ok(Some(line)) => line,
                        Ok(None) => return Ok(None),
                        Err(LineTooLong(_)) => return Err(ParseError::too_long_request_line(self.limits.max_request_line)),
                    };

                    // stray line breaks between requests are tolerated
                    if line.is_empty() {
                        continue;
                    }

                    let request_line = parse_request_line(line.freeze())?;
                    if request_line.version == Version::HTTP_09 {
                        return self.build(request_line, http::HeaderMap::new()).map(Some);
                    }

                    let block = HeaderBlock::new(self.limits.max_header_block, self.limits.max_headers);
                    self.state = State::Headers { line: request_line, block };
                }

                State::Headers { block, .. } => {
                    if !block.decode(src)? {
                        return Ok(None);
                    }

                    let State::Headers { line, mut block } = std::mem::replace(&mut self.state, State::RequestLine) else {
                        unreachable!("state checked above");
                    };
                    return self.build(line, block.take()).map(Some);
                }
            }
        }
    }
}

/// Splits `METHOD URI [VERSION]`, tolerating repeated or trailing spaces between tokens.
fn parse_request_line(line: Bytes) -> Result<RequestLine, ParseError> {
    let method_end = line.iter().position(|b| *b == b' ').unwrap_or(line.len());
    ensure!(method_end > 0, ParseError::InvalidMethod);
    let method = Method::from_bytes(&line[..method_end]).map_err(|_| ParseError::InvalidMethod)?;

    let mut tokens = line[method_end..].split(|b| *b == b' ').filter(|token| !token.is_empty());
    let uri = tokens.next().ok_or(ParseError::MissingUri)?;
    let version = match tokens.next() {
        None => Version::HTTP_09,
        Some(version) => parse_version(version)?,
    };
    if let Some(extra) = tokens.next() {
        return Err(ParseError::InvalidVersion(String::from_utf8_lossy(extra).into_owned()));
    }

    let uri = parse_uri(line.slice_ref(uri))?;
    Ok(RequestLine { method, uri, version })
}

fn parse_version(token: &[u8]) -> Result<Version, ParseError> {
    match token {
        b"HTTP/1.1" => Ok(Version::HTTP_11),
        b"HTTP/1.0" => Ok(Version::HTTP_10),
        b"HTTP/0.9" => Ok(Version::HTTP_09),
        t if t.starts_with(b"HTTP/2") || t.starts_with(b"HTTP/3") => {
            Err(ParseError::UnsupportedVersion(String::from_utf8_lossy(t).into_owned()))
        }
        t => Err(ParseError::InvalidVersion(String::from_utf8_lossy(t).into_owned())),
    }
}

/// Reduces an absolute-form target to its path and query.
fn parse_uri(target: Bytes) -> Result<Uri, ParseError> {
    let authority_start = [&b"http://"[..], b"https://"]
        .iter()
        .find(|scheme| target.len() >= scheme.len() && target[..scheme.len()].eq_ignore_ascii_case(scheme))
        .map(|scheme| scheme.len());

    let origin = match authority_start {
        None => target,
        Some(start) => match target[start..].iter().position(|b| matches!(b, b'/' | b'?')) {
            None => Bytes::from_static(b"/"),
            Some(offset) if target[start + offset] == b'?' => {
                let mut origin = BytesMut::with_capacity(target.len() - start - offset + 1);
                origin.extend_from_slice(b"/");
                origin.extend_from_slice(&target[start + offset..]);
                origin.freeze()
            }
            Some(offset) => target.slice(start + offset..),
        },
    };

    Uri::from_maybe_shared(origin).map_err(ParseError::invalid_uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;
    use indoc::indoc;

    fn decoder() -> HeaderDecoder {
        HeaderDecoder::new(ParserLimits::default(), HeaderCharset::Latin1)
    }

    #[test]
    fn test_bytes_mut_lens() {
        let str = indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        123"##};

        let mut bytes = BytesMut::from(str);
        let result = decoder().decode(&mut bytes).unwrap();

        assert!(result.is_some());
        assert_eq!(&bytes[..], &b"123"[..]);
    }

    #[test]
    fn from_curl() {
        let str = indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "##};

        let mut buf = BytesMut::from(str);
        let (head, payload_size) = decoder().decode(&mut buf).unwrap().unwrap();

        assert!(payload_size.is_empty());
        assert_eq!(head.method(), &Method::GET);
        assert_eq!(head.version(), Version::HTTP_11);
        assert_eq!(head.path(), "/index.html");
        assert_eq!(head.query(), None);
        assert_eq!(head.headers().len(), 3);
        assert_eq!(head.host().as_deref(), Some("127.0.0.1:8080"));
        assert_eq!(head.headers().get_str(header::USER_AGENT).unwrap(), "curl/7.79.1");
    }

    #[test]
    fn from_edge_with_crlf() {
        let raw = "GET /index/?a=1&b=2&a=3 HTTP/1.1\r\n\
                   Host: 127.0.0.1:8080\r\n\
                   Connection: keep-alive\r\n\
                   sec-ch-ua: \"#Not_A Brand\";v=\"99\", \"Microsoft Edge\";v=\"109\"\r\n\
                   Accept-Encoding: gzip, deflate, br\r\n\
                   \r\n";

        let mut buf = BytesMut::from(raw);
        let (head, _) = decoder().decode(&mut buf).unwrap().unwrap();

        assert_eq!(head.path(), "/index/");
        assert_eq!(head.query(), Some("a=1&b=2&a=3"));
        assert!(head.has_connection_token("Keep-Alive"));
        assert_eq!(head.headers().get_str("sec-ch-ua").unwrap(), r##""#Not_A Brand";v="99", "Microsoft Edge";v="109""##);
        assert_eq!(&*head.headers().tokens(&header::ACCEPT_ENCODING), &["gzip", "deflate", "br"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn resumes_across_partial_reads() {
        let mut decoder = decoder();
        let mut buf = BytesMut::from(&b"POST /upload HT"[..]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"TP/1.1\r\nHost: x\r\nContent-Le");
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"ngth: 5\r\n\r\nhello");
        let (head, payload_size) = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(head.method(), &Method::POST);
        assert_eq!(payload_size, PayloadSize::Length(5));
        assert_eq!(&buf[..], b"hello");
    }

    #[test]
    fn header_continuation_is_joined() {
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\nHost: x\r\nX-A: 1,\r\n  2\r\n\r\n"[..]);
        let (head, _) = decoder().decode(&mut buf).unwrap().unwrap();

        assert_eq!(head.headers().get_all("x-a"), ["1, 2"]);
    }

    #[test]
    fn tolerates_extra_spaces_and_leading_blank_lines() {
        let mut buf = BytesMut::from(&b"\r\n\nGET   /a   HTTP/1.0  \r\n\r\n"[..]);
        let (head, _) = decoder().decode(&mut buf).unwrap().unwrap();

        assert_eq!(head.path(), "/a");
        assert_eq!(head.version(), Version::HTTP_10);
    }

    #[test]
    fn http_09_has_no_headers() {
        let mut buf = BytesMut::from(&b"GET /legacy\r\nHost: ignored\r\n"[..]);
        let (head, payload_size) = decoder().decode(&mut buf).unwrap().unwrap();

        assert_eq!(head.version(), Version::HTTP_09);
        assert!(head.headers().is_empty());
        assert!(payload_size.is_empty());
        assert_eq!(&buf[..], b"Host: ignored\r\n");
    }

    #[test]
    fn absolute_form_is_reduced_to_origin_form() {
        for (target, expected) in [
            ("http://example.com/a/b?c=d", "/a/b?c=d"),
            ("HTTPS://example.com", "/"),
            ("http://example.com?x=1", "/?x=1"),
            ("/plain", "/plain"),
        ] {
            let uri = parse_uri(Bytes::copy_from_slice(target.as_bytes())).unwrap();
            assert_eq!(uri.to_string(), expected);
        }
    }

    #[test]
    fn request_line_failures_map_to_statuses() {
        let cases: [(&[u8], http::StatusCode); 4] = [
            (b" /path HTTP/1.1\r\n", http::StatusCode::METHOD_NOT_ALLOWED),
            (b"GET\r\n", http::StatusCode::NOT_FOUND),
            (b"GET / HTTP/x.y\r\n", http::StatusCode::BAD_REQUEST),
            (b"GET / HTTP/2.0\r\n", http::StatusCode::HTTP_VERSION_NOT_SUPPORTED),
        ];

        for (raw, status) in cases {
            let mut buf = BytesMut::from(raw);
            let error = decoder().decode(&mut buf).unwrap_err();
            assert_eq!(error.status(), Some(status), "{}", String::from_utf8_lossy(raw));
        }
    }

    #[test]
    fn request_line_limit() {
        let limits = ParserLimits { max_request_line: 16, ..Default::default() };
        let mut decoder = HeaderDecoder::new(limits, HeaderCharset::Latin1);
        let mut buf = BytesMut::from(&b"GET /a-very-long-path HTTP/1.1\r\n"[..]);

        let error = decoder.decode(&mut buf).unwrap_err();
        assert_eq!(error.status(), Some(http::StatusCode::URI_TOO_LONG));
    }
}
