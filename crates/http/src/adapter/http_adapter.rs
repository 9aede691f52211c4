//! The default `http` protocol.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::header::HOST;
use http::{Response, StatusCode, Version};
use tokio::io::AsyncReadExt;
use tracing::{debug, error};

use crate::adapter::ProtocolAdapter;
use crate::adapter::compression::BodyCompressor;
use crate::adapter::negotiate::negotiate;
use crate::adapter::session::HttpSession;
use crate::connection::{Connection, ConnectionInfo, MessageWriter};
use crate::handler::{BoxError, HttpHandler};
use crate::protocol::body::ReqBody;
use crate::protocol::{HttpError, HttpResponse, Message, ParseError, PayloadItem, ResponseContent, ResponseHead, SendError};

/// Size of each read from a streaming response source.
const STREAM_READ_SIZE: usize = 8 * 1024;

/// Serves plain HTTP requests with an [`HttpHandler`].
#[derive(Debug)]
pub struct HttpAdapter<H> {
    handler: H,
}

impl<H: HttpHandler> HttpAdapter<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<H> ProtocolAdapter for HttpAdapter<H>
where
    H: HttpHandler + 'static,
{
    type Session = HttpSession;
    type Response = HttpResponse;

    async fn accept(&self, connection: &mut Connection<'_>) -> Result<HttpSession, HttpError> {
        if connection.version() == Version::HTTP_11 && !connection.headers().contains(HOST) {
            return Err(ParseError::MissingHost.into());
        }
        connection.fulfil_expect_continue().await?;

        let (body, body_sender) = ReqBody::body_channel(connection.payload_size(), connection.config().socket_timeout());
        Ok(HttpSession::new(Arc::clone(connection.info()), body, body_sender))
    }

    async fn handle(&self, mut session: HttpSession, connection: &mut Connection<'_>) -> Result<HttpResponse, HttpError> {
        let mut body_sender = session.body_sender.take();
        let handler_future = self.handler.call(session);
        tokio::pin!(handler_future);

        // the body is fed to the handler while it runs, so a handler waiting on its body
        // and the read side waiting on the handler cannot deadlock
        let result = match body_sender.as_mut() {
            None => handler_future.await,
            Some(body_sender) => {
                let send_future = body_sender.send_body(connection.reader_mut());
                tokio::pin!(send_future);
                let mut body_done = false;

                loop {
                    tokio::select! {
                        biased;
                        result = &mut handler_future => break result,
                        body_result = &mut send_future, if !body_done => {
                            body_done = true;
                            if let Err(e) = body_result {
                                debug!(cause = %e, "request body ended with error");
                            }
                        }
                    }
                }
            }
        };

        match result {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(HttpError::drop_connection("handler returned no response")),
            Err(e) => {
                let e: BoxError = e.into();
                error!(cause = %e, "handler failed");
                let mut response = Response::new(ResponseContent::Empty);
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                Ok(response)
            }
        }
    }

    async fn process(&self, response: HttpResponse, connection: &mut Connection<'_>) -> Result<bool, HttpError> {
        let (parts, content) = response.into_parts();
        let mut head = ResponseHead::from_parts(parts, ());
        let negotiation = negotiate(connection.request(), &mut head, content.length(), connection.config());
        debug!(status = %head.status(), mode = ?negotiation.mode, keep_alive = negotiation.keep_alive, "writing response");

        {
            let writer = Arc::clone(connection.writer());
            let mut writer = writer.lock().await;
            writer.write(Message::<_, Bytes>::Header((head, negotiation.framing())))?;
            if negotiation.write_body {
                let compressor = negotiation.coding.map(|coding| BodyCompressor::new(coding, connection.config().compression().level));
                write_body(&mut writer, content, compressor).await?;
            }
            writer.flush().await?;
        }

        let mut keep_alive = negotiation.reuse_connection();
        if keep_alive && connection.is_body_pending() {
            if let Err(e) = connection.drain_body().await {
                debug!(cause = %e, "unread request body could not be drained");
                keep_alive = false;
            }
        }
        Ok(keep_alive)
    }
}

/// Writes `content` as payload items, compressing on the way if asked to, and ends the body.
async fn write_body(writer: &mut MessageWriter, content: ResponseContent, mut compressor: Option<BodyCompressor>) -> Result<(), SendError> {
    match content {
        ResponseContent::Empty => {}
        ResponseContent::Bytes(bytes) => write_chunk(writer, &mut compressor, bytes).await?,
        ResponseContent::Stream { mut reader, .. } => {
            let mut buf = BytesMut::with_capacity(STREAM_READ_SIZE);
            loop {
                buf.reserve(STREAM_READ_SIZE);
                if reader.read_buf(&mut buf).await? == 0 {
                    break;
                }
                write_chunk(writer, &mut compressor, buf.split().freeze()).await?;
            }
        }
    }

    if let Some(compressor) = compressor {
        let tail = compressor.finish().map_err(SendError::compression)?;
        if !tail.is_empty() {
            writer.send(Message::Payload(PayloadItem::Chunk(tail))).await?;
        }
    }
    writer.send(Message::<_, Bytes>::Payload(PayloadItem::Eof)).await
}

async fn write_chunk(writer: &mut MessageWriter, compressor: &mut Option<BodyCompressor>, data: Bytes) -> Result<(), SendError> {
    let data = match compressor {
        Some(compressor) => compressor.compress(&data).map_err(SendError::compression)?,
        None => data,
    };
    if data.is_empty() {
        return Ok(());
    }
    writer.send(Message::Payload(PayloadItem::Chunk(data))).await
}
