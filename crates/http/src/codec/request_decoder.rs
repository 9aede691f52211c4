//! HTTP request decoder.
//!
//! Drives a [`HeaderDecoder`] until a request head is complete, then a [`PayloadDecoder`]
//! until its body is exhausted, then goes back to the next head. Wrapped in a `FramedRead`,
//! the framed read buffer holds whatever was read past the current boundary, so the next
//! step always sees a continuous stream.
//!
//! ```no_run
//! use bytes::BytesMut;
//! use hatch_http::codec::RequestDecoder;
//! use hatch_http::config::ParserLimits;
//! use hatch_http::protocol::HeaderCharset;
//! use tokio_util::codec::Decoder;
//!
//! let mut decoder = RequestDecoder::new(ParserLimits::default(), HeaderCharset::Latin1);
//! let mut buffer = BytesMut::from("GET / HTTP/1.1\r\nHost: x\r\n\r\n");
//! let result = decoder.decode(&mut buffer);
//! ```

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::config::ParserLimits;
use crate::protocol::{HeaderCharset, Message, ParseError, PayloadItem, PayloadSize, RequestHead};

/// A decoder for HTTP requests that handles both headers and payload
///
/// # State Machine
///
/// The decoder maintains its state through the `payload_decoder` field:
/// - `None`: Currently parsing headers
/// - `Some(PayloadDecoder)`: Currently parsing payload
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
    limits: ParserLimits,
}

impl RequestDecoder {
    pub fn new(limits: ParserLimits, charset: HeaderCharset) -> Self {
        Self { header_decoder: HeaderDecoder::new(limits, charset), payload_decoder: None, limits }
    }

    /// Whether body bytes of the current request are still unread.
    pub fn is_payload_pending(&self) -> bool {
        self.payload_decoder.is_some()
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::new(ParserLimits::default(), HeaderCharset::default())
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHead, PayloadSize)>;
    type Error = ParseError;

    /// Attempts to decode an HTTP request from the provided buffer
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Message::Header(_)))`: Successfully decoded request headers
    /// - `Ok(Some(Message::Payload(_)))`: Successfully decoded a payload chunk
    /// - `Ok(None)`: Need more data to proceed
    /// - `Err(_)`: Encountered a parsing error
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };

            return Ok(message);
        }

        let message = match self.header_decoder.decode(src)? {
            Some((header, payload_size)) => {
                // bodiless requests go straight back to header parsing
                if !payload_size.is_empty() {
                    self.payload_decoder = Some(PayloadDecoder::new(payload_size, self.limits));
                }
                Some(Message::Header((header, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }
}
