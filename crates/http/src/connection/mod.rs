//! Per-socket driving and per-request state.
//!
//! - [`HttpConnection`]: owns both socket halves for the socket's lifetime and loops over
//!   request cycles while the adapters ask for keep-alive
//! - [`Connection`]: one request cycle; borrows the request stream and shares the writer
//! - [`MessageWriter`]: batches encoded output and writes it to the socket
//! - [`ConnectionInfo`]: read-only request facts shared by every kind of session

#[allow(clippy::module_inception, reason = "the per-cycle type is the heart of this module")]
mod connection;
mod http_connection;
mod info;
mod message_writer;

pub use connection::{BoxedReader, Connection, RequestStream, SharedWriter};
pub use http_connection::HttpConnection;
pub use info::{ConnectionInfo, RequestInfo, SocketInfo};
pub use message_writer::{BoxedWriter, MessageWriter};
