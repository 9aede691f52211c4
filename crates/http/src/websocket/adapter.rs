//! The `websocket` upgrade protocol.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::header::{SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_VERSION};
use http::{HeaderValue, StatusCode};
use tokio::io::AsyncReadExt;
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::adapter::ProtocolAdapter;
use crate::adapter::negotiate::status_head;
use crate::codec::BodyFraming;
use crate::config::WebSocketConfig;
use crate::connection::{Connection, ConnectionInfo, RequestStream};
use crate::handler::{WebSocketHandler, WebSocketListener};
use crate::protocol::{HttpError, Message, ParseError};
use crate::websocket::codec::{FrameCodec, WsMessage};
use crate::websocket::handshake::{SUPPORTED_VERSION, first_subprotocol, switching_protocols};
use crate::websocket::{CloseReason, WebSocket, WebSocketSession};

const READ_SIZE: usize = 4 * 1024;

/// Upgrades requests to WebSocket and runs the session until either side closes.
#[derive(Debug)]
pub struct WebSocketAdapter<W> {
    handler: W,
}

impl<W> WebSocketAdapter<W> {
    pub const PROTOCOL: &'static str = "websocket";

    pub fn new(handler: W) -> Self {
        Self { handler }
    }
}

/// An accepted upgrade, ready to switch protocols.
pub struct WebSocketUpgrade {
    key: String,
    subprotocol: Option<String>,
    listener: Box<dyn WebSocketListener>,
}

impl std::fmt::Debug for WebSocketUpgrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketUpgrade").field("subprotocol", &self.subprotocol).finish_non_exhaustive()
    }
}

#[async_trait]
impl<W> ProtocolAdapter for WebSocketAdapter<W>
where
    W: WebSocketHandler + 'static,
{
    type Session = WebSocketSession;
    type Response = WebSocketUpgrade;

    async fn accept(&self, connection: &mut Connection<'_>) -> Result<WebSocketSession, HttpError> {
        let version = connection.headers().get_str(SEC_WEBSOCKET_VERSION).map(|version| version.trim().to_string());
        if version.as_deref() != Some(SUPPORTED_VERSION) {
            debug!(version = ?version, "rejecting websocket version");
            let mut head = status_head(connection.version(), StatusCode::UPGRADE_REQUIRED, false, connection.config());
            head.headers_mut().insert(SEC_WEBSOCKET_VERSION, HeaderValue::from_static(SUPPORTED_VERSION));
            connection.respond_status(head).await?;
            return Err(HttpError::drop_connection("unsupported websocket version"));
        }

        let key = connection
            .headers()
            .get_str(SEC_WEBSOCKET_KEY)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ParseError::invalid_header("missing Sec-WebSocket-Key"))?;
        connection.fulfil_expect_continue().await?;

        let subprotocol = first_subprotocol(connection.headers());
        Ok(WebSocketSession::new(Arc::clone(connection.info()), key, 13, subprotocol))
    }

    async fn handle(&self, session: WebSocketSession, _connection: &mut Connection<'_>) -> Result<WebSocketUpgrade, HttpError> {
        let listener = self.handler.listener(&session).ok_or_else(|| HttpError::drop_connection("websocket upgrade refused"))?;
        let subprotocol = session.subprotocol().map(str::to_string);
        Ok(WebSocketUpgrade { key: session.key().to_string(), subprotocol, listener })
    }

    async fn process(&self, upgrade: WebSocketUpgrade, connection: &mut Connection<'_>) -> Result<bool, HttpError> {
        let WebSocketUpgrade { key, subprotocol, mut listener } = upgrade;
        {
            let mut writer = connection.writer().lock().await;
            writer.write(Message::<_, Bytes>::Header((switching_protocols(&key, subprotocol.as_deref()), BodyFraming::None)))?;
            writer.flush().await?;
        }

        let config = *connection.config().websocket();
        let fragment_size = usize::try_from(config.max_payload).unwrap_or(usize::MAX).min(connection.guessed_mtu());
        let socket = WebSocket::new(Arc::clone(connection.writer()), fragment_size);
        debug!(subprotocol = ?subprotocol, "websocket opened");

        // the read loop and the ping loop cancel each other, whichever ends first;
        // a server shutdown cancels both through the parent token
        let shutdown = connection.shutdown_token();
        let token = shutdown.child_token();
        let _cancel_on_exit = token.clone().drop_guard();
        let ping_task = connection.config().executor().execute(Box::pin(ping_loop(socket.clone(), config.ping_interval(), token.clone())));

        listener.on_open(&socket).await;
        let reason = read_loop(&socket, listener.as_mut(), connection.reader_mut(), &config, &shutdown, &token).await;
        socket.mark_closed();
        listener.on_close(reason).await;

        token.cancel();
        ping_task.interrupt();
        debug!("websocket closed");
        Ok(false)
    }
}

/// Sends a ping carrying the current time in milliseconds every `interval`.
async fn ping_loop(socket: WebSocket, interval: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    loop {
        tokio::select! {
            () = token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or_default();
        if let Err(e) = socket.ping(Bytes::copy_from_slice(&now.to_be_bytes())).await {
            debug!(cause = %e, "ping failed, closing websocket");
            token.cancel();
            return;
        }
        trace!(timestamp = now, "sent ping");
    }
}

/// Dispatches inbound messages until the peer closes, a frame is invalid, the socket
/// fails, or `token` is cancelled. Returns the close reason reported to the listener.
///
/// When the cancellation comes from `shutdown` the peer is sent a going-away close frame.
async fn read_loop(
    socket: &WebSocket,
    listener: &mut dyn WebSocketListener,
    reader: &mut RequestStream,
    config: &WebSocketConfig,
    shutdown: &CancellationToken,
    token: &CancellationToken,
) -> Option<CloseReason> {
    let mut codec = FrameCodec::new(config.max_payload);
    // frames sent right behind the handshake already sit in the request read buffer
    let mut buf: BytesMut = reader.read_buffer_mut().split();
    let io = reader.get_mut();

    loop {
        let message = match codec.decode(&mut buf) {
            Ok(Some(message)) => message,
            Ok(None) => {
                buf.reserve(READ_SIZE);
                let read = tokio::select! {
                    () = token.cancelled() => {
                        if !shutdown.is_cancelled() {
                            debug!("websocket cancelled");
                            return None;
                        }
                        debug!("server shutting down, closing websocket");
                        let reason = CloseReason::new(CloseReason::GOING_AWAY, "server shutting down");
                        if let Err(e) = socket.close(Some(reason.clone())).await {
                            debug!(cause = %e, "could not send close frame");
                        }
                        return Some(reason);
                    }
                    read = tokio::time::timeout(config.read_timeout, io.read_buf(&mut buf)) => read,
                };
                match read {
                    Ok(Ok(0)) => {
                        debug!("peer went away without a close frame");
                        return None;
                    }
                    Ok(Ok(_)) => continue,
                    Ok(Err(e)) => {
                        debug!(cause = %e, "websocket read failed");
                        return None;
                    }
                    Err(_) => {
                        debug!("websocket read timed out");
                        let reason = CloseReason::new(CloseReason::GOING_AWAY, "read timeout");
                        let _ = socket.close(Some(reason.clone())).await;
                        return Some(reason);
                    }
                }
            }
            Err(e) => {
                debug!(cause = %e, "invalid websocket frame");
                let reason = e.close_code().map(|code| CloseReason::new(code, e.to_string()));
                if reason.is_some() {
                    let _ = socket.close(reason.clone()).await;
                }
                return reason;
            }
        };

        match message {
            WsMessage::Text(text) => listener.on_text(socket, text).await,
            WsMessage::Binary(data) => listener.on_binary(socket, data).await,
            WsMessage::Ping(payload) => {
                if let Err(e) = socket.pong(payload).await {
                    debug!(cause = %e, "pong failed");
                    return None;
                }
            }
            WsMessage::Pong(_) => trace!("received pong"),
            WsMessage::Close(reason) => {
                trace!(code = reason.as_ref().map(|reason| reason.code), "received close frame");
                // echoes the peer's code; a no-op if the server closed first
                let _ = socket.close(reason.clone()).await;
                return reason;
            }
        }
    }
}
