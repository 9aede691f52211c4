//! Pluggable protocols served on top of an HTTP/1.x request head.
//!
//! A [`ProtocolAdapter`] runs in three steps per request cycle: `accept` validates the
//! request and builds a session, `handle` runs the user callback, and `process` writes the
//! response and tells the connection whether another request may follow. Adapters are
//! registered by upgrade token in a [`ProtocolRegistry`]; requests without an upgrade go to
//! the `http` adapter.

mod compression;
mod http_adapter;
pub(crate) mod negotiate;
mod session;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::Version;
use http::header::UPGRADE;
use tracing::trace;

pub use compression::ContentCoding;
pub use http_adapter::HttpAdapter;
pub use session::HttpSession;

use crate::connection::Connection;
use crate::handler::{HttpHandler, WebSocketHandler};
use crate::protocol::{HttpError, ParseError, RequestHead};
use crate::websocket::WebSocketAdapter;

/// Name of the adapter serving requests that ask for no upgrade.
pub const DEFAULT_PROTOCOL: &str = "http";

#[async_trait]
pub trait ProtocolAdapter: Send + Sync + 'static {
    type Session: Send;
    type Response: Send;

    /// Validates the request and builds its session.
    ///
    /// [`HttpError::DropConnection`] aborts the cycle without a response.
    async fn accept(&self, connection: &mut Connection<'_>) -> Result<Self::Session, HttpError>;

    /// Runs the user callback. A callback that produces nothing drops the connection.
    async fn handle(&self, session: Self::Session, connection: &mut Connection<'_>) -> Result<Self::Response, HttpError>;

    /// Writes the response, fully flushed, and returns whether the connection stays open.
    async fn process(&self, response: Self::Response, connection: &mut Connection<'_>) -> Result<bool, HttpError>;
}

/// Object-safe form of [`ProtocolAdapter`], so adapters with different session and
/// response types share one registry.
#[async_trait]
pub trait Protocol: Send + Sync {
    async fn serve(&self, connection: &mut Connection<'_>) -> Result<bool, HttpError>;
}

#[async_trait]
impl<A: ProtocolAdapter> Protocol for A {
    async fn serve(&self, connection: &mut Connection<'_>) -> Result<bool, HttpError> {
        let session = self.accept(connection).await?;
        let response = self.handle(session, connection).await?;
        self.process(response, connection).await
    }
}

/// Adapters keyed by lower-cased upgrade token.
#[derive(Default, Clone)]
pub struct ProtocolRegistry {
    adapters: HashMap<String, Arc<dyn Protocol>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry serving plain HTTP with `handler`.
    pub fn http<H: HttpHandler + 'static>(handler: H) -> Self {
        Self::new().register(DEFAULT_PROTOCOL, HttpAdapter::new(handler))
    }

    /// Adds the `websocket` upgrade served by `handler`.
    pub fn with_websocket<W: WebSocketHandler + 'static>(self, handler: W) -> Self {
        self.register(WebSocketAdapter::<W>::PROTOCOL, WebSocketAdapter::new(handler))
    }

    pub fn register<A: ProtocolAdapter>(mut self, name: &str, adapter: A) -> Self {
        self.adapters.insert(name.to_ascii_lowercase(), Arc::new(adapter));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Protocol>> {
        self.adapters.get(&name.to_ascii_lowercase())
    }

    /// Picks the adapter for `request`.
    ///
    /// An HTTP/1.1 request carrying a `Connection: upgrade` token is served by the first of
    /// its `Upgrade` tokens that has an adapter; anything else goes to the default adapter.
    pub fn select(&self, request: &RequestHead) -> Result<Arc<dyn Protocol>, ParseError> {
        if request.version() == Version::HTTP_11 && request.has_connection_token("upgrade") {
            let tokens = request.headers().tokens(&UPGRADE);
            let selected = tokens.iter().find_map(|token| self.get(token).map(|adapter| (token, adapter)));
            return match selected {
                Some((token, adapter)) => {
                    trace!(protocol = %token, "selected upgrade protocol");
                    Ok(Arc::clone(adapter))
                }
                None => Err(ParseError::invalid_header(format!("no protocol registered for upgrade {:?}", tokens))),
            };
        }

        self.get(DEFAULT_PROTOCOL)
            .map(Arc::clone)
            .ok_or_else(|| ParseError::invalid_header("no default protocol registered"))
    }
}

impl fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolRegistry").field("protocols", &self.adapters.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::make_handler;
    use crate::protocol::{HeaderCharset, HeaderMultiMap, HttpResponse};
    use http::{HeaderMap, HeaderValue, Method, Uri};
    use std::convert::Infallible;

    struct Named(&'static str);

    #[async_trait]
    impl ProtocolAdapter for Named {
        type Session = ();
        type Response = ();

        async fn accept(&self, _connection: &mut Connection<'_>) -> Result<(), HttpError> {
            Err(HttpError::drop_connection(self.0))
        }

        async fn handle(&self, _session: (), _connection: &mut Connection<'_>) -> Result<(), HttpError> {
            Ok(())
        }

        async fn process(&self, _response: (), _connection: &mut Connection<'_>) -> Result<bool, HttpError> {
            Ok(false)
        }
    }

    fn request(version: Version, headers: &[(&'static str, &'static str)]) -> RequestHead {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(*name, HeaderValue::from_static(value));
        }
        RequestHead::new(Method::GET, Uri::from_static("/"), version, HeaderMultiMap::new(map, HeaderCharset::Latin1))
    }

    fn registry() -> ProtocolRegistry {
        let handler = make_handler(|_session| async { Ok::<Option<HttpResponse>, Infallible>(None) });
        ProtocolRegistry::http(handler).register("Chat", Named("chat")).register("websocket", Named("websocket"))
    }

    fn selected(registry: &ProtocolRegistry, request: &RequestHead) -> Option<&'static str> {
        let selected = registry.select(request).ok()?;
        ["http", "chat", "websocket"].into_iter().find(|name| registry.get(name).is_some_and(|adapter| Arc::ptr_eq(adapter, &selected)))
    }

    #[test]
    fn selects_by_upgrade_token() {
        let registry = registry();

        assert_eq!(selected(&registry, &request(Version::HTTP_11, &[])), Some("http"));
        assert_eq!(
            selected(&registry, &request(Version::HTTP_11, &[("connection", "keep-alive, Upgrade"), ("upgrade", "h2c, WebSocket, chat")])),
            Some("websocket")
        );
        assert_eq!(selected(&registry, &request(Version::HTTP_11, &[("upgrade", "chat")])), Some("http"));
        assert_eq!(selected(&registry, &request(Version::HTTP_10, &[("connection", "upgrade"), ("upgrade", "chat")])), Some("http"));
    }

    #[test]
    fn unknown_upgrade_is_bad_request() {
        let registry = registry();
        let error = registry.select(&request(Version::HTTP_11, &[("connection", "upgrade"), ("upgrade", "h2c")])).err().unwrap();
        assert_eq!(error.status(), Some(http::StatusCode::BAD_REQUEST));
    }
}
