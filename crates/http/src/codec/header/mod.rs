//! Request head decoding and response head encoding.
//!
//! - [`HeaderDecoder`]: request line plus header block, resumable across partial reads
//! - [`HeaderEncoder`]: status line plus header fields
//!
//! The header block parser is shared with the chunked body decoder, which uses it to read
//! (and discard) trailer fields.

pub(crate) mod header_block;
mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub use header_encoder::HeaderEncoder;
pub(crate) use header_encoder::FastWrite;
