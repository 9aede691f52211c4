use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use bytes::Bytes;

use futures::channel::{mpsc, oneshot};
use futures::{FutureExt, SinkExt, Stream, StreamExt};

use http_body::{Body, Frame, SizeHint};
use tracing::{debug, error};

use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHead};

type PayloadResult = Result<PayloadItem, ParseError>;

/// ReqBody implements an asynchronous streaming mechanism for HTTP request bodies.
///
/// # Architecture
///
/// ReqBody uses a channel-based architecture:
/// - `ReqBody`: Consumer side that implements http_body::Body
/// - `ReqBodySender`: Producer side that reads from raw payload stream
/// - They communicate through a mpsc channel and oneshot channels
///
/// The consumer asks for one item at a time, so nothing is read from the socket before the
/// handler actually wants it.
#[derive(Debug)]
pub struct ReqBody {
    signal: mpsc::Sender<oneshot::Sender<PayloadResult>>,
    receiving: Option<oneshot::Receiver<PayloadResult>>,
    payload_size: PayloadSize,
    finished: bool,
}

impl ReqBody {
    fn new(signal: mpsc::Sender<oneshot::Sender<PayloadResult>>, payload_size: PayloadSize) -> Self {
        Self { signal, receiving: None, payload_size, finished: payload_size.is_empty() }
    }

    /// Creates a body streaming channel pair for processing HTTP request bodies.
    ///
    /// The returned ReqBody can be handed to request handlers, while ReqBodySender serves
    /// its chunk requests from the connection's payload stream, giving up on any single read
    /// after `read_timeout`.
    pub fn body_channel(payload_size: PayloadSize, read_timeout: Duration) -> (ReqBody, ReqBodySender) {
        let (tx, receiver) = mpsc::channel(16);

        let req_body = ReqBody::new(tx, payload_size);

        let body_sender = ReqBodySender { receiver, read_timeout, eof: payload_size.is_empty() };

        (req_body, body_sender)
    }

    pub fn payload_size(&self) -> PayloadSize {
        self.payload_size
    }
}

/// ReqBodySender handles reading body chunks from the raw payload stream.
///
/// It runs concurrently with the request handler and serves each chunk request from
/// [`ReqBody`] with exactly one payload item. The stream is only borrowed while serving.
#[derive(Debug)]
pub struct ReqBodySender {
    receiver: mpsc::Receiver<oneshot::Sender<PayloadResult>>,
    read_timeout: Duration,
    eof: bool,
}

impl ReqBodySender {
    /// Streams body chunks from payload stream to ReqBody consumer.
    ///
    /// Returns once the complete body is streamed, the consumer is gone, or reading fails.
    pub async fn send_body<S>(&mut self, payload_stream: &mut S) -> Result<(), ParseError>
    where
        S: Stream<Item = Result<Message<(RequestHead, PayloadSize)>, ParseError>> + Unpin,
    {
        while !self.eof {
            let Some(sender) = self.receiver.next().await else {
                // consumer dropped, leftover body is drained by the connection if needed
                return Ok(());
            };

            match self.read_item(payload_stream).await {
                Ok(payload_item) => {
                    self.eof = payload_item.is_eof();
                    // the consumer may have been dropped while waiting
                    let _ = sender.send(Ok(payload_item));
                }
                Err(e) => {
                    error!(cause = %e, "failed to read request body");
                    let _ = sender.send(Err(ParseError::invalid_body(&e)));
                    self.close();
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn read_item<S>(&self, payload_stream: &mut S) -> Result<PayloadItem, ParseError>
    where
        S: Stream<Item = Result<Message<(RequestHead, PayloadSize)>, ParseError>> + Unpin,
    {
        let next = tokio::time::timeout(self.read_timeout, payload_stream.next()).await.map_err(|_| ParseError::Timeout)?;
        match next {
            Some(Ok(Message::Payload(payload_item))) => Ok(payload_item),
            Some(Ok(Message::Header(_))) => {
                error!("received header from receive body phase");
                Err(ParseError::invalid_body("received header from receive body phase"))
            }
            Some(Err(e)) => Err(e),
            None => {
                debug!("connection closed while reading body");
                Err(ParseError::invalid_body("connection closed while reading body"))
            }
        }
    }

    /// Fails every outstanding and future chunk request.
    fn close(&mut self) {
        self.receiver.close();
        while let Ok(pending) = self.receiver.try_recv() {
            drop(pending);
        }
    }
}

/// Implements standard HTTP body interface for request bodies.
impl Body for ReqBody {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        if self.finished {
            return Poll::Ready(None);
        }

        loop {
            if let Some(oneshot_receiver) = &mut self.receiving {
                let result = ready!(oneshot_receiver.poll_unpin(cx));
                self.receiving.take();
                return match result {
                    Ok(Ok(PayloadItem::Chunk(bytes))) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
                    Ok(Ok(PayloadItem::Eof)) => {
                        self.finished = true;
                        Poll::Ready(None)
                    }
                    Ok(Err(e)) => {
                        self.finished = true;
                        Poll::Ready(Some(Err(e)))
                    }
                    Err(_) => {
                        self.finished = true;
                        Poll::Ready(Some(Err(ParseError::invalid_body("parse body canceled"))))
                    }
                };
            }

            match ready!(self.signal.poll_ready_unpin(cx)) {
                Ok(()) => {
                    let (tx, rx) = oneshot::channel();
                    match self.signal.start_send(tx) {
                        Ok(()) => self.receiving = Some(rx),
                        Err(e) => {
                            self.finished = true;
                            return Poll::Ready(Some(Err(ParseError::invalid_body(e))));
                        }
                    }
                }
                Err(e) => {
                    self.finished = true;
                    return Poll::Ready(Some(Err(ParseError::invalid_body(e))));
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.finished
    }

    fn size_hint(&self) -> SizeHint {
        match self.payload_size {
            PayloadSize::Length(length) => SizeHint::with_exact(length),
            PayloadSize::Chunked => SizeHint::new(),
            PayloadSize::Empty => SizeHint::with_exact(0),
        }
    }
}
