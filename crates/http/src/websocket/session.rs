use std::sync::Arc;

use crate::connection::{ConnectionInfo, RequestInfo};

/// What a [`WebSocketHandler`](crate::handler::WebSocketHandler) sees of an upgrade request.
///
/// Unlike [`HttpSession`](crate::adapter::HttpSession) it has no body.
#[derive(Debug)]
pub struct WebSocketSession {
    info: Arc<RequestInfo>,
    key: String,
    version: u8,
    subprotocol: Option<String>,
}

impl WebSocketSession {
    pub(crate) fn new(info: Arc<RequestInfo>, key: String, version: u8, subprotocol: Option<String>) -> Self {
        Self { info, key, version, subprotocol }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Negotiated protocol version, always 13.
    pub fn websocket_version(&self) -> u8 {
        self.version
    }

    pub fn subprotocol(&self) -> Option<&str> {
        self.subprotocol.as_deref()
    }
}

impl ConnectionInfo for WebSocketSession {
    fn request_info(&self) -> &RequestInfo {
        &self.info
    }
}
