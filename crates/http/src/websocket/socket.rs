use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tracing::trace;

use crate::connection::SharedWriter;
use crate::websocket::codec::FrameEncoder;
use crate::websocket::frame::{Frame, OpCode, fragment};
use crate::websocket::{CloseReason, WebSocketError};

/// Send side of a live WebSocket.
///
/// Cheap to clone and usable from any task. Each message is written under the connection's
/// write lock, so fragments of concurrent messages never interleave; reading goes on
/// independently in the connection's read loop.
#[derive(Debug, Clone)]
pub struct WebSocket {
    writer: SharedWriter,
    fragment_size: usize,
    closed: Arc<AtomicBool>,
}

impl WebSocket {
    pub(crate) fn new(writer: SharedWriter, fragment_size: usize) -> Self {
        Self { writer, fragment_size, closed: Arc::new(AtomicBool::new(false)) }
    }

    /// Sends a text message, fragmented if it exceeds the frame size.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), WebSocketError> {
        self.send_message(OpCode::Text, Bytes::from(text.into())).await
    }

    /// Sends a binary message, fragmented if it exceeds the frame size.
    pub async fn send_binary(&self, data: impl Into<Bytes>) -> Result<(), WebSocketError> {
        self.send_message(OpCode::Binary, data.into()).await
    }

    pub async fn ping(&self, payload: Bytes) -> Result<(), WebSocketError> {
        self.send_frames([Frame::ping(payload)]).await
    }

    pub(crate) async fn pong(&self, payload: Bytes) -> Result<(), WebSocketError> {
        self.send_frames([Frame::pong(payload)]).await
    }

    /// Sends a close frame. Only the first call writes anything; later ones are no-ops.
    pub async fn close(&self, reason: Option<CloseReason>) -> Result<(), WebSocketError> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let frame = Frame::close(reason.as_ref());
        let mut writer = self.writer.lock().await;
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        writer.encode(&mut FrameEncoder, frame)?;
        writer.flush().await?;
        trace!(code = reason.map(|reason| reason.code), "sent close frame");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    async fn send_message(&self, opcode: OpCode, payload: Bytes) -> Result<(), WebSocketError> {
        self.send_frames(fragment(opcode, payload, self.fragment_size)).await
    }

    async fn send_frames<I>(&self, frames: I) -> Result<(), WebSocketError>
    where
        I: IntoIterator<Item = Frame>,
    {
        let mut writer = self.writer.lock().await;
        if self.is_closed() {
            return Err(WebSocketError::Closed);
        }
        for frame in frames {
            writer.encode(&mut FrameEncoder, frame)?;
            if writer.buffered() >= writer.batch_size() {
                writer.flush().await?;
            }
        }
        writer.flush().await?;
        Ok(())
    }
}
