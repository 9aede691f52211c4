//! Streaming codecs for HTTP/1.x messages.
//!
//! All codecs implement tokio-util's [`Decoder`](tokio_util::codec::Decoder) /
//! [`Encoder`](tokio_util::codec::Encoder) so they plug into `FramedRead` and the
//! connection's message writer.
//!
//! - Request side: [`RequestDecoder`] alternates between the [`HeaderDecoder`] and a
//!   [`PayloadDecoder`] for the body
//! - Response side: [`ResponseEncoder`] writes a head through the [`HeaderEncoder`], then
//!   body items through a [`PayloadEncoder`] using the negotiated [`BodyFraming`]
//!
//! Every decoder is resumable: `Ok(None)` means "feed me more bytes", never "start over".

mod body;
mod header;
pub(crate) mod line;
mod request_decoder;
mod response_encoder;

pub use body::BodyFraming;
pub use body::ChunkedDecoder;
pub use body::ChunkedEncoder;
pub use body::PayloadDecoder;
pub use body::PayloadEncoder;
pub use header::HeaderDecoder;
pub use header::HeaderEncoder;
pub(crate) use header::FastWrite;
pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
