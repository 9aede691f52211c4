use std::io;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;
use tracing::trace;

use crate::codec::{BodyFraming, ResponseEncoder};
use crate::protocol::{Message, ResponseHead, SendError};

/// Write half of a connection, type-erased so plain and TLS sockets share one driver.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Batches encoded output and writes it to the socket.
///
/// Response heads and body items go through the HTTP [`ResponseEncoder`]; other protocols
/// (WebSocket frames) encode through [`MessageWriter::encode`] into the same batch. The
/// batch is pushed to the socket once it reaches the connection's guessed MTU, or on
/// [`MessageWriter::flush`].
pub struct MessageWriter {
    writer: BoxedWriter,
    buffer: BytesMut,
    batch_size: usize,
    encoder: ResponseEncoder,
}

impl MessageWriter {
    pub fn new(writer: BoxedWriter, batch_size: usize) -> Self {
        Self { writer, buffer: BytesMut::with_capacity(batch_size * 2), batch_size, encoder: ResponseEncoder::new() }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Encodes a response item into the batch without touching the socket.
    #[inline]
    pub fn write<D>(&mut self, item: Message<(ResponseHead, BodyFraming), D>) -> Result<(), SendError>
    where
        D: Buf,
    {
        self.encoder.encode(item, &mut self.buffer)
    }

    /// Encodes a response item and writes the batch out once it is full.
    pub async fn send<D>(&mut self, item: Message<(ResponseHead, BodyFraming), D>) -> Result<(), SendError>
    where
        D: Buf,
    {
        self.write(item)?;
        if self.buffer.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Encodes an arbitrary item with `encoder` into the batch.
    pub fn encode<I, E>(&mut self, encoder: &mut E, item: I) -> Result<(), E::Error>
    where
        E: Encoder<I>,
    {
        encoder.encode(item, &mut self.buffer)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub async fn flush(&mut self) -> Result<(), SendError> {
        if !self.buffer.is_empty() {
            trace!(bytes = self.buffer.len(), "writing batch");
            self.writer.write_all(&self.buffer).await?;
            self.buffer.clear();
        }
        Ok(self.writer.flush().await?)
    }

    /// Flushes what is left and shuts the write half down.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            self.writer.write_all(&self.buffer).await?;
            self.buffer.clear();
        }
        self.writer.shutdown().await
    }
}

impl std::fmt::Debug for MessageWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageWriter")
            .field("buffered", &self.buffer.len())
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}
