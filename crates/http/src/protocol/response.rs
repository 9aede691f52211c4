//! HTTP response types.
//!
//! Handlers build a plain `http::Response` whose body is a [`ResponseContent`]; the HTTP
//! adapter consumes it exactly once and drops it afterwards, which releases any file or
//! stream handle the content holds on every exit path.

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use http::Response;
use tokio::io::AsyncRead;

/// Response produced by an HTTP handler.
pub type HttpResponse = Response<ResponseContent>;

/// Type alias for HTTP response headers, before the body is written.
pub type ResponseHead = Response<()>;

/// The body of an [`HttpResponse`].
pub enum ResponseContent {
    /// No body at all.
    Empty,
    /// An in-memory buffer with known length.
    Bytes(Bytes),
    /// A streaming source. An unknown `length` forces chunked (or close-delimited) framing.
    Stream { reader: Pin<Box<dyn AsyncRead + Send>>, length: Option<u64> },
}

impl ResponseContent {
    pub fn stream<R>(reader: R, length: Option<u64>) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        ResponseContent::Stream { reader: Box::pin(reader), length }
    }

    /// Known body length, if any.
    pub fn length(&self) -> Option<u64> {
        match self {
            ResponseContent::Empty => Some(0),
            ResponseContent::Bytes(bytes) => Some(bytes.len() as u64),
            ResponseContent::Stream { length, .. } => *length,
        }
    }
}

impl Default for ResponseContent {
    fn default() -> Self {
        ResponseContent::Empty
    }
}

impl fmt::Debug for ResponseContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseContent::Empty => f.write_str("Empty"),
            ResponseContent::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            ResponseContent::Stream { length, .. } => f.debug_struct("Stream").field("length", length).finish_non_exhaustive(),
        }
    }
}

impl From<Bytes> for ResponseContent {
    fn from(bytes: Bytes) -> Self {
        ResponseContent::Bytes(bytes)
    }
}

impl From<Vec<u8>> for ResponseContent {
    fn from(bytes: Vec<u8>) -> Self {
        ResponseContent::Bytes(bytes.into())
    }
}

impl From<String> for ResponseContent {
    fn from(s: String) -> Self {
        ResponseContent::Bytes(s.into())
    }
}

impl From<&'static str> for ResponseContent {
    fn from(s: &'static str) -> Self {
        ResponseContent::Bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl From<&'static [u8]> for ResponseContent {
    fn from(s: &'static [u8]) -> Self {
        ResponseContent::Bytes(Bytes::from_static(s))
    }
}

impl From<()> for ResponseContent {
    fn from((): ()) -> Self {
        ResponseContent::Empty
    }
}

/// How the response body is delimited on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResponseMode {
    /// `Content-Length` framing.
    FixedLength(u64),
    /// `Transfer-Encoding: chunked` framing.
    Chunked,
    /// Body runs until the connection closes.
    CloseOnComplete,
}

impl ResponseMode {
    pub fn is_close_on_complete(&self) -> bool {
        matches!(self, ResponseMode::CloseOnComplete)
    }
}
