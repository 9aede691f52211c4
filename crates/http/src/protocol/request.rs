//! Parsed request head: request line plus header block.

use http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{Method, Uri, Version};

use crate::protocol::{HeaderMultiMap, ParseError, PayloadSize};

/// The request line and header block of one request, immutable once parsed.
#[derive(Debug)]
pub struct RequestHead {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMultiMap,
}

impl RequestHead {
    pub fn new(method: Method, uri: Uri, version: Version, headers: HeaderMultiMap) -> Self {
        Self { method, uri, version, headers }
    }

    /// Returns a reference to the request's HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns a reference to the request's URI, always in origin form.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Returns the request's HTTP version.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns a reference to the request's headers.
    pub fn headers(&self) -> &HeaderMultiMap {
        &self.headers
    }

    pub fn host(&self) -> Option<String> {
        self.headers.get_str(HOST).map(|host| host.into_owned())
    }

    /// Whether the client listed `token` in its `Connection` header.
    pub fn has_connection_token(&self, token: &str) -> bool {
        self.headers.has_token(&CONNECTION, token)
    }

    /// Determines how the request body is framed.
    ///
    /// `Transfer-Encoding: chunked` wins over `Content-Length`; a zero length means no body.
    pub fn payload_size(&self) -> Result<PayloadSize, ParseError> {
        if self.version == Version::HTTP_09 {
            return Ok(PayloadSize::Empty);
        }

        // refer: https://www.rfc-editor.org/rfc/rfc9112.html#name-transfer-encoding
        if is_chunked(&self.headers) {
            return Ok(PayloadSize::Chunked);
        }

        match content_length(&self.headers)? {
            None => Ok(PayloadSize::Empty),
            Some(length) => Ok(PayloadSize::from_length(length)),
        }
    }
}

/// Reads `Content-Length`, which may repeat (as separate fields or a comma list) only
/// with one and the same value.
fn content_length(headers: &HeaderMultiMap) -> Result<Option<u64>, ParseError> {
    let mut length = None;
    for field in headers.get_all(CONTENT_LENGTH) {
        for value in field.split(',').map(str::trim) {
            if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ParseError::invalid_content_length(format!("value {value:?} is not a decimal length")));
            }
            let value = value.parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {value} is not u64")))?;
            match length {
                Some(previous) if previous != value => {
                    return Err(ParseError::invalid_content_length(format!("conflicting values {previous} and {value}")));
                }
                _ => length = Some(value),
            }
        }
    }
    Ok(length)
}

/// Checks if the Transfer-Encoding header indicates chunked encoding.
///
/// According to RFC 7230, chunked must be the last encoding if present.
fn is_chunked(headers: &HeaderMultiMap) -> bool {
    headers.tokens(&TRANSFER_ENCODING).last().is_some_and(|last| last.eq_ignore_ascii_case("chunked"))
}
