use std::sync::Arc;

use futures::StreamExt;
use http::{StatusCode, Version};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::adapter::ProtocolRegistry;
use crate::adapter::negotiate::{client_keep_alive, status_head};
use crate::codec::{BodyFraming, RequestDecoder};
use crate::config::ServerConfig;
use crate::connection::connection::{BoxedReader, Connection, RequestStream, SharedWriter};
use crate::connection::info::{RequestInfo, SocketInfo};
use crate::connection::message_writer::MessageWriter;
use crate::protocol::{HttpError, Message, ParseError, PayloadSize, RequestHead, ResponseHead};

const INIT_READ_BUFFER: usize = 8 * 1024;

/// Drives one accepted socket through consecutive request cycles.
///
/// Each cycle reads a request head under the socket timeout, picks the protocol adapter,
/// and lets it accept, handle and process the request. The loop ends when the adapter
/// declines keep-alive, the peer goes away or stays idle too long, or an error ends the
/// cycle, or when the shutdown token is cancelled.
pub struct HttpConnection {
    reader: RequestStream,
    writer: SharedWriter,
    socket: Arc<SocketInfo>,
    config: Arc<ServerConfig>,
    registry: Arc<ProtocolRegistry>,
    shutdown: CancellationToken,
}

impl HttpConnection {
    pub fn new<R, W>(reader: R, writer: W, socket: SocketInfo, config: Arc<ServerConfig>, registry: Arc<ProtocolRegistry>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let decoder = RequestDecoder::new(*config.parser_limits(), config.header_charset());
        let reader: BoxedReader = Box::new(reader);
        let writer = MessageWriter::new(Box::new(writer), socket.mtu());
        Self {
            reader: FramedRead::with_capacity(reader, decoder, INIT_READ_BUFFER),
            writer: Arc::new(Mutex::new(writer)),
            socket: Arc::new(socket),
            config,
            registry,
            shutdown: CancellationToken::new(),
        }
    }

    /// Ties the connection to an outer token; upgraded sessions observe it too.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub async fn process(mut self) -> Result<(), HttpError> {
        loop {
            let read = tokio::time::timeout(self.config.socket_timeout(), self.reader.next());
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!("server shutting down, closing connection");
                    return self.close().await;
                }
                next = read => match next {
                    Ok(next) => next,
                    Err(_) => {
                        debug!("connection idle for too long");
                        return self.close().await;
                    }
                },
            };

            match next {
                Some(Ok(Message::Header((head, payload_size)))) => {
                    let head = Arc::new(head);
                    match self.serve(Arc::clone(&head), payload_size).await {
                        Ok(true) => trace!("keeping connection alive"),
                        Ok(false) => return self.close().await,
                        Err(e) => {
                            if !self.recover(&head, &e).await {
                                return Err(e);
                            }
                            debug!(cause = %e, "answered with status, keeping connection alive");
                        }
                    }
                }

                Some(Ok(Message::Payload(_))) => {
                    warn!("received body data while waiting for a request head");
                    let error = ParseError::invalid_body("body data without request head");
                    self.respond_error(Version::HTTP_11, StatusCode::BAD_REQUEST).await;
                    return Err(error.into());
                }

                Some(Err(e)) => {
                    if let Some(status) = e.status() {
                        self.respond_error(Version::HTTP_11, status).await;
                    }
                    return Err(e.into());
                }

                None => {
                    trace!("peer closed the connection");
                    return Ok(());
                }
            }
        }
    }

    async fn serve(&mut self, head: Arc<RequestHead>, payload_size: PayloadSize) -> Result<bool, HttpError> {
        debug!(method = %head.method(), path = head.path(), version = ?head.version(), "serving request");
        let protocol = self.registry.select(&head)?;
        let info = Arc::new(RequestInfo::new(head, Arc::clone(&self.socket), self.config.behind_reverse_proxy()));
        let mut connection = Connection::new(info, payload_size, &mut self.reader, Arc::clone(&self.writer), &self.config)
            .with_shutdown(&self.shutdown);
        protocol.serve(&mut connection).await
    }

    /// Answers a failed cycle with its status where possible, returning whether the
    /// connection is still usable.
    ///
    /// Only a typed status error on a request without unread body keeps the connection;
    /// everything else ends it.
    async fn recover(&mut self, head: &RequestHead, error: &HttpError) -> bool {
        let Some(status) = error.response_status() else {
            return false;
        };

        let keep_alive = matches!(error, HttpError::Status { .. })
            && !self.reader.decoder().is_payload_pending()
            && client_keep_alive(head, &self.config);
        if !keep_alive {
            self.respond_error(head.version(), status).await;
            return false;
        }

        let response = status_head(head.version(), status, true, &self.config);
        match self.write_head(response).await {
            Ok(()) => true,
            Err(e) => {
                debug!(cause = %e, "could not send error status");
                false
            }
        }
    }

    /// Best-effort status response before the connection is closed.
    async fn respond_error(&mut self, version: Version, status: StatusCode) {
        let response = status_head(version, status, false, &self.config);
        if let Err(e) = self.write_head(response).await {
            debug!(cause = %e, "could not send error status");
        }
        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!(cause = %e, "shutdown after error status failed");
        }
    }

    async fn write_head(&mut self, head: ResponseHead) -> Result<(), HttpError> {
        let mut writer = self.writer.lock().await;
        writer.write(Message::<_, bytes::Bytes>::Header((head, BodyFraming::None)))?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(self) -> Result<(), HttpError> {
        if let Err(e) = self.writer.lock().await.shutdown().await {
            trace!(cause = %e, "shutdown after last response failed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnection").field("socket", &self.socket).finish_non_exhaustive()
    }
}
