//! User-facing callbacks.
//!
//! - [`HttpHandler`]: turns an [`HttpSession`] into a response. `Ok(None)` asks the engine to
//!   drop the connection without answering; an error becomes a `500`.
//! - [`WebSocketHandler`]: decides, per upgrade request, which [`WebSocketListener`] serves
//!   the new WebSocket. Returning `None` refuses the upgrade and drops the connection.

use std::error::Error;
use std::future::Future;

use async_trait::async_trait;
use bytes::Bytes;

use crate::adapter::HttpSession;
use crate::protocol::HttpResponse;
use crate::websocket::{CloseReason, WebSocket, WebSocketSession};

pub type BoxError = Box<dyn Error + Send + Sync>;

#[async_trait]
pub trait HttpHandler: Send + Sync {
    type Error: Into<BoxError>;

    async fn call(&self, session: HttpSession) -> Result<Option<HttpResponse>, Self::Error>;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<Err, F, Fut> HttpHandler for HandlerFn<F>
where
    F: Fn(HttpSession) -> Fut + Send + Sync,
    Err: Into<BoxError>,
    Fut: Future<Output = Result<Option<HttpResponse>, Err>> + Send,
{
    type Error = Err;

    async fn call(&self, session: HttpSession) -> Result<Option<HttpResponse>, Self::Error> {
        (self.f)(session).await
    }
}

/// Wraps an async closure into an [`HttpHandler`].
pub fn make_handler<F, Err, Ret>(f: F) -> HandlerFn<F>
where
    Err: Into<BoxError>,
    Ret: Future<Output = Result<Option<HttpResponse>, Err>>,
    F: Fn(HttpSession) -> Ret,
{
    HandlerFn { f }
}

/// Creates the listener for an accepted WebSocket upgrade.
pub trait WebSocketHandler: Send + Sync {
    fn listener(&self, session: &WebSocketSession) -> Option<Box<dyn WebSocketListener>>;
}

impl<F, L> WebSocketHandler for F
where
    F: Fn(&WebSocketSession) -> Option<L> + Send + Sync,
    L: WebSocketListener + 'static,
{
    fn listener(&self, session: &WebSocketSession) -> Option<Box<dyn WebSocketListener>> {
        self(session).map(|listener| Box::new(listener) as Box<dyn WebSocketListener>)
    }
}

/// Callbacks for one WebSocket, invoked from its read loop in frame order.
///
/// Every method is optional. [`WebSocketListener::on_close`] runs exactly once, whether the
/// peer closed, a frame was malformed, or the connection died.
#[async_trait]
pub trait WebSocketListener: Send {
    async fn on_open(&mut self, _socket: &WebSocket) {}

    async fn on_text(&mut self, _socket: &WebSocket, _text: String) {}

    async fn on_binary(&mut self, _socket: &WebSocket, _data: Bytes) {}

    /// Called exactly once. `reason` is the peer's close code, or the code the server closed with
    /// after an error, a read timeout or a server shutdown.
    async fn on_close(&mut self, _reason: Option<CloseReason>) {}
}
