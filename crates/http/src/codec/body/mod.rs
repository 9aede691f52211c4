//! Body framing for requests and responses.
//!
//! ## Decoders
//! - [`PayloadDecoder`]: request bodies, delegating to the chunked or length decoder
//!
//! ## Encoders
//! - [`PayloadEncoder`]: response bodies, with the [`BodyFraming`] the adapter negotiated
//!
//! Chunked framing follows RFC 9112: extensions and trailers are accepted on the way in and
//! dropped; on the way out every write becomes one chunk.

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use chunked_decoder::ChunkedDecoder;
pub use chunked_encoder::ChunkedEncoder;
pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::BodyFraming;
pub use payload_encoder::PayloadEncoder;
