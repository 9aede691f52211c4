use std::sync::Arc;

use futures::StreamExt;
use http::{Response, StatusCode, Version, header};
use tokio::io::AsyncRead;
use tokio::sync::Mutex;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::codec::{BodyFraming, RequestDecoder};
use crate::config::ServerConfig;
use crate::connection::info::{ConnectionInfo, RequestInfo};
use crate::connection::message_writer::MessageWriter;
use crate::protocol::{HttpError, Message, ParseError, PayloadSize, ResponseHead, SendError};

/// Read half of a connection, type-erased so plain and TLS sockets share one driver.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Decoded request stream; its read buffer holds whatever was read past the current message.
pub type RequestStream = FramedRead<BoxedReader, RequestDecoder>;

/// Write half shared between the request cycle and tasks that outlive it (WebSocket sends, pings).
pub type SharedWriter = Arc<Mutex<MessageWriter>>;

/// State of one request/response cycle.
///
/// Created after the request head was parsed and dropped once the adapter finished
/// processing; the socket halves it borrows persist across keep-alive cycles.
pub struct Connection<'c> {
    info: Arc<RequestInfo>,
    payload_size: PayloadSize,
    reader: &'c mut RequestStream,
    writer: SharedWriter,
    config: &'c ServerConfig,
    shutdown: Option<&'c CancellationToken>,
    expect_continue_fulfilled: bool,
}

impl<'c> Connection<'c> {
    pub fn new(
        info: Arc<RequestInfo>,
        payload_size: PayloadSize,
        reader: &'c mut RequestStream,
        writer: SharedWriter,
        config: &'c ServerConfig,
    ) -> Self {
        Self { info, payload_size, reader, writer, config, shutdown: None, expect_continue_fulfilled: false }
    }

    pub fn with_shutdown(mut self, shutdown: &'c CancellationToken) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn info(&self) -> &Arc<RequestInfo> {
        &self.info
    }

    pub fn payload_size(&self) -> PayloadSize {
        self.payload_size
    }

    pub fn config(&self) -> &ServerConfig {
        self.config
    }

    pub fn reader_mut(&mut self) -> &mut RequestStream {
        self.reader
    }

    pub fn writer(&self) -> &SharedWriter {
        &self.writer
    }

    /// Token cancelled when the owning server stops; sessions that outlive the request
    /// cycle should derive a child token from it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.cloned().unwrap_or_else(CancellationToken::new)
    }

    /// Whether body bytes of this request are still on the socket.
    pub fn is_body_pending(&self) -> bool {
        self.reader.decoder().is_payload_pending()
    }

    pub fn expects_continue(&self) -> bool {
        self.version() >= Version::HTTP_11
            && self.headers().get(header::EXPECT).is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue"))
    }

    pub fn is_expect_continue_fulfilled(&self) -> bool {
        self.expect_continue_fulfilled
    }

    /// Sends the interim `100 Continue` status at most once, and only if the client asked for it.
    pub async fn fulfil_expect_continue(&mut self) -> Result<(), SendError> {
        if self.expect_continue_fulfilled || !self.expects_continue() {
            return Ok(());
        }

        let head = Response::builder().status(StatusCode::CONTINUE).version(self.version()).body(()).map_err(SendError::invalid_body)?;
        let mut writer = self.writer.lock().await;
        writer.write(Message::<_, bytes::Bytes>::Header((head, BodyFraming::None)))?;
        writer.flush().await?;
        self.expect_continue_fulfilled = true;
        debug!("sent 100 continue");
        Ok(())
    }

    /// Reads and discards whatever body bytes the handler left unread.
    pub async fn drain_body(&mut self) -> Result<(), ParseError> {
        let read_timeout = self.config.socket_timeout();
        let mut drained = 0usize;
        while self.is_body_pending() {
            let next = tokio::time::timeout(read_timeout, self.reader.next()).await.map_err(|_| ParseError::Timeout)?;
            match next {
                Some(Ok(Message::Payload(item))) => drained += item.as_bytes().map_or(0, |bytes| bytes.len()),
                Some(Ok(Message::Header(_))) => return Err(ParseError::invalid_body("received header while draining body")),
                Some(Err(e)) => return Err(e),
                None => return Err(ParseError::invalid_body("connection closed while draining body")),
            }
        }
        if drained > 0 {
            trace!(drained, "discarded unread request body");
        }
        Ok(())
    }

    /// Writes a status-only response and flushes it.
    pub(crate) async fn respond_status(&mut self, head: ResponseHead) -> Result<(), HttpError> {
        let mut writer = self.writer.lock().await;
        writer.write(Message::<_, bytes::Bytes>::Header((head, BodyFraming::None)))?;
        writer.flush().await?;
        Ok(())
    }
}

impl ConnectionInfo for Connection<'_> {
    fn request_info(&self) -> &RequestInfo {
        &self.info
    }
}

impl std::fmt::Debug for Connection<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("info", &self.info)
            .field("payload_size", &self.payload_size)
            .field("expect_continue_fulfilled", &self.expect_continue_fulfilled)
            .finish_non_exhaustive()
    }
}
