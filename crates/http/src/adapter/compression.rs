//! Response body compression.
//!
//! A response is compressed only when every gate passes: HTTP/1.1, compression enabled,
//! no `Content-Encoding` set by the handler, a body larger than the configured threshold
//! (unknown lengths count as large), a compressible content type, and a client that
//! accepts `gzip` or `deflate`. Gzip wins when both are accepted.

use std::io;
use std::io::Write;

use bytes::{Bytes, BytesMut};
use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, VARY};
use http::{HeaderMap, HeaderValue, Version};
use mime::Mime;
use tracing::trace;

use crate::config::CompressionConfig;
use crate::protocol::RequestHead;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ContentCoding {
    Gzip,
    Deflate,
}

impl ContentCoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCoding::Gzip => "gzip",
            ContentCoding::Deflate => "deflate",
        }
    }
}

pub(crate) fn select_coding(
    request: &RequestHead,
    response_headers: &HeaderMap,
    length: Option<u64>,
    config: &CompressionConfig,
) -> Option<ContentCoding> {
    if !config.enabled || request.version() < Version::HTTP_11 || response_headers.contains_key(CONTENT_ENCODING) {
        return None;
    }
    if length.is_some_and(|length| length <= config.threshold) {
        return None;
    }

    let content_type = response_headers.get(CONTENT_TYPE)?.to_str().ok()?;
    if !is_compressible(content_type) {
        return None;
    }

    let accepted = request.headers().tokens(&ACCEPT_ENCODING);
    let accepts = |coding: ContentCoding| accepted.iter().any(|token| accepts_token(token, coding.as_str()));
    [ContentCoding::Gzip, ContentCoding::Deflate].into_iter().find(|coding| accepts(*coding))
}

/// `gzip`, `gzip;q=0.8` accept; `gzip;q=0` refuses.
fn accepts_token(token: &str, coding: &str) -> bool {
    let mut parts = token.split(';');
    let name = parts.next().unwrap_or_default().trim();
    if !name.eq_ignore_ascii_case(coding) {
        return false;
    }
    !parts.any(|param| param.trim().strip_prefix("q=").and_then(|q| q.parse::<f32>().ok()) == Some(0.0))
}

pub(crate) fn is_compressible(content_type: &str) -> bool {
    let Ok(mime) = content_type.parse::<Mime>() else {
        return false;
    };

    if mime.type_() == mime::TEXT {
        return true;
    }
    let subtype = mime.subtype().as_str();
    if mime.suffix().is_some_and(|suffix| matches!(suffix.as_str(), "text" | "json" | "xml")) {
        return true;
    }
    if subtype.ends_with("json") || subtype.ends_with("xml") || subtype.ends_with("csv") {
        return true;
    }

    matches!(
        mime.essence_str(),
        "application/javascript"
            | "application/x-javascript"
            | "image/bmp"
            | "image/x-icon"
            | "image/vnd.microsoft.icon"
            | "application/x-tar"
            | "application/wasm"
    )
}

/// Adds the encoding headers; the body length is no longer known up front.
pub(crate) fn apply_headers(headers: &mut HeaderMap, coding: ContentCoding) {
    headers.remove(CONTENT_LENGTH);
    headers.insert(CONTENT_ENCODING, HeaderValue::from_static(coding.as_str()));
    let varies = headers
        .get_all(VARY)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("accept-encoding") || token.trim() == "*");
    if !varies {
        headers.append(VARY, HeaderValue::from_static("Accept-Encoding"));
    }
}

/// `io::Write` sink the flate2 encoders write into; output is taken out between writes.
pub(crate) struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }

    fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Streaming compressor for one response body.
pub(crate) enum BodyCompressor {
    Gzip(GzEncoder<Writer>),
    Deflate(ZlibEncoder<Writer>),
}

impl BodyCompressor {
    pub(crate) fn new(coding: ContentCoding, level: u32) -> Self {
        let level = Compression::new(level);
        match coding {
            ContentCoding::Gzip => Self::Gzip(GzEncoder::new(Writer::new(), level)),
            ContentCoding::Deflate => Self::Deflate(ZlibEncoder::new(Writer::new(), level)),
        }
    }

    /// Compresses `data`, returning whatever output the encoder produced so far.
    pub(crate) fn compress(&mut self, data: &[u8]) -> io::Result<Bytes> {
        match self {
            Self::Gzip(encoder) => {
                encoder.write_all(data)?;
                Ok(encoder.get_mut().take())
            }
            Self::Deflate(encoder) => {
                encoder.write_all(data)?;
                Ok(encoder.get_mut().take())
            }
        }
    }

    /// Ends the stream, returning the remaining output including the trailer.
    pub(crate) fn finish(self) -> io::Result<Bytes> {
        let mut writer = match self {
            Self::Gzip(encoder) => encoder.finish()?,
            Self::Deflate(encoder) => encoder.finish()?,
        };
        trace!("finished compressed body");
        Ok(writer.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{HeaderCharset, HeaderMultiMap};
    use flate2::read::{GzDecoder, ZlibDecoder};
    use http::{Method, Uri};
    use std::io::Read;

    fn request(version: Version, accept_encoding: &'static str) -> RequestHead {
        let mut map = HeaderMap::new();
        map.insert(ACCEPT_ENCODING, HeaderValue::from_static(accept_encoding));
        RequestHead::new(Method::GET, Uri::from_static("/"), version, HeaderMultiMap::new(map, HeaderCharset::Latin1))
    }

    fn response(content_type: &'static str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        map
    }

    #[test]
    fn gates() {
        let config = CompressionConfig::default();
        let text = response("text/plain; charset=utf-8");
        let large = Some(500 * 1024);

        assert_eq!(select_coding(&request(Version::HTTP_11, "gzip, deflate"), &text, large, &config), Some(ContentCoding::Gzip));
        assert_eq!(select_coding(&request(Version::HTTP_11, "deflate"), &text, large, &config), Some(ContentCoding::Deflate));
        assert_eq!(select_coding(&request(Version::HTTP_11, "gzip;q=0, deflate"), &text, large, &config), Some(ContentCoding::Deflate));
        assert_eq!(select_coding(&request(Version::HTTP_11, "gzip"), &text, None, &config), Some(ContentCoding::Gzip));

        assert_eq!(select_coding(&request(Version::HTTP_10, "gzip, deflate"), &text, large, &config), None);
        assert_eq!(select_coding(&request(Version::HTTP_11, "gzip, deflate"), &text, Some(50), &config), None);
        assert_eq!(select_coding(&request(Version::HTTP_11, "br"), &text, large, &config), None);
        assert_eq!(select_coding(&request(Version::HTTP_11, "gzip"), &response("image/png"), large, &config), None);

        let disabled = CompressionConfig { enabled: false, ..Default::default() };
        assert_eq!(select_coding(&request(Version::HTTP_11, "gzip"), &text, large, &disabled), None);
    }

    #[test]
    fn compressible_types() {
        for content_type in ["text/html", "application/json", "application/ld+json", "image/svg+xml", "text/csv", "application/javascript"] {
            assert!(is_compressible(content_type), "{content_type}");
        }
        for content_type in ["image/jpeg", "application/octet-stream", "video/mp4", "not a mime"] {
            assert!(!is_compressible(content_type), "{content_type}");
        }
    }

    #[test]
    fn vary_is_appended() {
        let mut headers = response("text/plain");
        headers.insert(CONTENT_LENGTH, HeaderValue::from(10));
        headers.insert(VARY, HeaderValue::from_static("Origin"));
        apply_headers(&mut headers, ContentCoding::Gzip);

        assert!(!headers.contains_key(CONTENT_LENGTH));
        assert_eq!(headers.get(CONTENT_ENCODING).unwrap(), "gzip");
        let vary: Vec<_> = headers.get_all(VARY).iter().collect();
        assert_eq!(vary, ["Origin", "Accept-Encoding"]);

        apply_headers(&mut headers, ContentCoding::Gzip);
        assert_eq!(headers.get_all(VARY).iter().count(), 2);
    }

    #[test]
    fn compressors_round_trip() {
        let data = "hatch ".repeat(10_000);

        let mut gzip = BodyCompressor::new(ContentCoding::Gzip, 6);
        let mut compressed = gzip.compress(data.as_bytes()).unwrap().to_vec();
        compressed.extend_from_slice(&gzip.finish().unwrap());
        assert!(compressed.len() < data.len());
        let mut decoded = String::new();
        GzDecoder::new(&compressed[..]).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, data);

        let mut deflate = BodyCompressor::new(ContentCoding::Deflate, 6);
        let mut compressed = deflate.compress(data.as_bytes()).unwrap().to_vec();
        compressed.extend_from_slice(&deflate.finish().unwrap());
        let mut decoded = String::new();
        ZlibDecoder::new(&compressed[..]).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, data);
    }
}
