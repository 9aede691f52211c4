use http::StatusCode;
use std::io;
use std::io::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },

    /// A failure that can still be answered with a bare status line.
    #[error("http status {status}: {reason}")]
    Status { status: StatusCode, reason: String },

    /// The connection must be torn down without writing anything further.
    #[error("connection dropped: {reason}")]
    DropConnection { reason: String },
}

impl HttpError {
    pub fn status<S: ToString>(status: StatusCode, reason: S) -> Self {
        Self::Status { status, reason: reason.to_string() }
    }

    pub fn drop_connection<S: ToString>(reason: S) -> Self {
        Self::DropConnection { reason: reason.to_string() }
    }

    /// The status to answer with, if the failure still allows a response.
    pub fn response_status(&self) -> Option<StatusCode> {
        match self {
            HttpError::RequestError { source } => source.status(),
            HttpError::Status { status, .. } => Some(*status),
            HttpError::ResponseError { .. } | HttpError::DropConnection { .. } => None,
        }
    }

    /// Whether this is ordinary network noise rather than a fault worth alarming about.
    pub fn is_transient(&self) -> bool {
        match self {
            HttpError::RequestError { source: ParseError::Io { source } }
            | HttpError::ResponseError { source: SendError::Io { source } } => is_transient_io(source),
            HttpError::RequestError { source: ParseError::Timeout } => true,
            HttpError::DropConnection { .. } => true,
            _ => false,
        }
    }
}

/// Recognizes timeouts, resets and aborted handshakes by kind or, failing that, by message.
pub fn is_transient_io(e: &io::Error) -> bool {
    match e.kind() {
        ErrorKind::TimedOut
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe
        | ErrorKind::UnexpectedEof
        | ErrorKind::NotConnected
        | ErrorKind::WouldBlock => true,
        _ => {
            let message = e.to_string().to_ascii_lowercase();
            ["socket closed", "connection reset", "close_notify", "handshake", "timed out"]
                .iter()
                .any(|needle| message.contains(needle))
        }
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("request line too long, exceed the limit {max_size}")]
    TooLongRequestLine { max_size: usize },

    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0}")]
    InvalidVersion(String),

    #[error("unsupported http version: {0}")]
    UnsupportedVersion(String),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("missing http uri")]
    MissingUri,

    #[error("invalid http uri: {reason}")]
    InvalidUri { reason: String },

    #[error("missing host header")]
    MissingHost,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("read timeout")]
    Timeout,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_long_request_line(max_size: usize) -> Self {
        Self::TooLongRequestLine { max_size }
    }

    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_uri<S: ToString>(str: S) -> Self {
        Self::InvalidUri { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Maps a protocol failure to the status a client should see; I/O failures have none.
    pub fn status(&self) -> Option<StatusCode> {
        let status = match self {
            ParseError::TooLongRequestLine { .. } => StatusCode::URI_TOO_LONG,
            ParseError::TooLargeHeader { .. } | ParseError::TooManyHeaders { .. } => {
                StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
            }
            ParseError::InvalidMethod => StatusCode::METHOD_NOT_ALLOWED,
            ParseError::MissingUri => StatusCode::NOT_FOUND,
            ParseError::UnsupportedVersion(_) => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            ParseError::InvalidHeader { .. }
            | ParseError::InvalidVersion(_)
            | ParseError::InvalidUri { .. }
            | ParseError::MissingHost
            | ParseError::InvalidContentLength { .. }
            | ParseError::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            ParseError::Timeout | ParseError::Io { .. } => return None,
        };
        Some(status)
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("compression error: {source}")]
    Compression { source: io::Error },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn compression(source: io::Error) -> Self {
        Self::Compression { source }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
