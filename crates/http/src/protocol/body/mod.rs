//! HTTP request body handling implementation.
//!
//! The body handling system consists of two components:
//!
//! - [`ReqBody`]: The consumer side that implements `http_body::Body`
//! - [`ReqBodySender`]: The producer side that reads from the raw payload stream
//!
//! They communicate through channels so the request handler and the socket reads can make
//! progress concurrently, while the connection keeps ownership of the byte stream. Whatever
//! the handler leaves unread is drained by the connection before the next request is read.

mod req_body;

pub use req_body::ReqBody;
pub use req_body::ReqBodySender;
