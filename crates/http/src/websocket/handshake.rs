//! Opening handshake.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::{CONNECTION, DATE, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_PROTOCOL, UPGRADE};
use http::{HeaderValue, Response, StatusCode, Version};
use sha1::{Digest, Sha1};

use crate::date::http_date;
use crate::protocol::{HeaderMultiMap, ResponseHead};

pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version spoken.
pub const SUPPORTED_VERSION: &str = "13";

/// `Sec-WebSocket-Accept` for a client's `Sec-WebSocket-Key`.
pub fn accept_key(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.trim().as_bytes());
    sha1.update(WS_GUID.as_bytes());
    STANDARD.encode(sha1.finalize())
}

/// The first sub-protocol the client offered, if any.
pub(crate) fn first_subprotocol(headers: &HeaderMultiMap) -> Option<String> {
    headers.tokens(&SEC_WEBSOCKET_PROTOCOL).first().cloned()
}

pub(crate) fn switching_protocols(key: &str, subprotocol: Option<&str>) -> ResponseHead {
    let mut head = Response::new(());
    *head.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    *head.version_mut() = Version::HTTP_11;

    let headers = head.headers_mut();
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    if let Ok(accept) = HeaderValue::try_from(accept_key(key)) {
        headers.insert(SEC_WEBSOCKET_ACCEPT, accept);
    }
    if let Some(protocol) = subprotocol.and_then(|protocol| HeaderValue::try_from(protocol).ok()) {
        headers.insert(SEC_WEBSOCKET_PROTOCOL, protocol);
    }
    headers.insert(DATE, http_date());
    head
}
