//! Response framing and keep-alive negotiation.
//!
//! The decision depends only on the request head, the status and headers chosen by the
//! handler, the body length (if known) and the server configuration, so it is computed
//! before anything is written.

use http::header::{CONNECTION, CONTENT_LENGTH, DATE, HeaderName, TRANSFER_ENCODING};
use http::{HeaderValue, Method, Response, StatusCode, Version};

use crate::adapter::compression::{self, ContentCoding};
use crate::codec::BodyFraming;
use crate::config::ServerConfig;
use crate::date::http_date;
use crate::protocol::{RequestHead, ResponseHead, ResponseMode};

static KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Negotiation {
    pub(crate) mode: ResponseMode,
    pub(crate) keep_alive: bool,
    pub(crate) coding: Option<ContentCoding>,
    /// False for `HEAD` and for statuses that never carry a body.
    pub(crate) write_body: bool,
}

impl Negotiation {
    pub(crate) fn framing(&self) -> BodyFraming {
        if self.write_body { self.mode.into() } else { BodyFraming::None }
    }

    /// Whether another request may follow on the same socket.
    pub(crate) fn reuse_connection(&self) -> bool {
        self.keep_alive && !self.mode.is_close_on_complete()
    }
}

/// Whether both the client and the server want the connection kept open.
pub(crate) fn client_keep_alive(request: &RequestHead, config: &ServerConfig) -> bool {
    if !config.keep_alive_enabled() {
        return false;
    }
    match request.version() {
        Version::HTTP_11 => !request.has_connection_token("close"),
        Version::HTTP_10 => request.has_connection_token("keep-alive"),
        _ => false,
    }
}

/// Picks framing, keep-alive and compression for `response`, rewriting its version and
/// framing headers to match.
pub(crate) fn negotiate(request: &RequestHead, response: &mut ResponseHead, length: Option<u64>, config: &ServerConfig) -> Negotiation {
    let version = request.version();
    *response.version_mut() = version;

    if request.method() == Method::OPTIONS {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    let status = response.status();
    let has_body = !(status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED);
    let write_body = has_body && request.method() != Method::HEAD;

    let coding = if has_body { compression::select_coding(request, response.headers(), length, config.compression()) } else { None };

    let mode = match (version, length) {
        (Version::HTTP_09, _) => ResponseMode::CloseOnComplete,
        _ if !has_body => ResponseMode::FixedLength(0),
        (Version::HTTP_10, Some(length)) => ResponseMode::FixedLength(length),
        (Version::HTTP_10, None) => ResponseMode::CloseOnComplete,
        (_, Some(length)) if coding.is_none() => ResponseMode::FixedLength(length),
        _ => ResponseMode::Chunked,
    };
    let keep_alive = client_keep_alive(request, config) && !mode.is_close_on_complete();

    let negotiation = Negotiation { mode, keep_alive, coding, write_body };
    if version != Version::HTTP_09 {
        write_headers(response, &negotiation, has_body, config);
    }
    negotiation
}

fn write_headers(response: &mut ResponseHead, negotiation: &Negotiation, has_body: bool, config: &ServerConfig) {
    let not_modified = response.status() == StatusCode::NOT_MODIFIED;
    let version = response.version();
    let headers = response.headers_mut();

    headers.remove(TRANSFER_ENCODING);
    match negotiation.mode {
        ResponseMode::FixedLength(length) if has_body => {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        }
        ResponseMode::Chunked => {
            headers.remove(CONTENT_LENGTH);
            headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        }
        // a 304 may describe the representation it stands for
        _ if not_modified => {}
        _ => {
            headers.remove(CONTENT_LENGTH);
        }
    }

    if let Some(coding) = negotiation.coding {
        compression::apply_headers(headers, coding);
    }

    set_connection_headers(headers, version, negotiation.keep_alive, config);
    if !headers.contains_key(DATE) {
        headers.insert(DATE, http_date());
    }
}

fn set_connection_headers(headers: &mut http::HeaderMap, version: Version, keep_alive: bool, config: &ServerConfig) {
    let connection = if keep_alive { "keep-alive" } else { "close" };
    headers.insert(CONNECTION, HeaderValue::from_static(connection));

    if keep_alive && version == Version::HTTP_10 {
        let timeout = config.keep_alive().map(|keep_alive| keep_alive.as_secs()).unwrap_or_default();
        if let Ok(value) = HeaderValue::try_from(format!("timeout={timeout}")) {
            headers.insert(KEEP_ALIVE.clone(), value);
        }
    }
}

/// A bodyless response carrying only `status`, used for protocol-level failures.
pub(crate) fn status_head(version: Version, status: StatusCode, keep_alive: bool, config: &ServerConfig) -> ResponseHead {
    let version = if version == Version::HTTP_09 || version == Version::HTTP_10 { version } else { Version::HTTP_11 };
    let mut head = Response::new(());
    *head.status_mut() = status;
    *head.version_mut() = version;

    let headers = head.headers_mut();
    if !status.is_informational() && status != StatusCode::NO_CONTENT {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(0u64));
    }
    set_connection_headers(headers, version, keep_alive, config);
    headers.insert(DATE, http_date());
    head
}
