//! Core HTTP protocol abstractions.
//!
//! # Architecture
//!
//! - **Message Handling** ([`message`]): [`Message`], [`PayloadItem`] and [`PayloadSize`]
//!   flowing out of the request decoder
//! - **Request Processing** ([`request`]): [`RequestHead`], the parsed request line and
//!   header block, over a case-insensitive [`HeaderMultiMap`]
//! - **Response Processing** ([`response`]): [`HttpResponse`], [`ResponseContent`] and the
//!   [`ResponseMode`] chosen for it
//! - **Body Streaming** ([`body`]): [`body::ReqBody`] and its producer side
//! - **Error Handling** ([`error`]): [`HttpError`], [`ParseError`], [`SendError`]

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod headers;
pub use headers::Directives;
pub use headers::HEADER_CHARSET_ENV;
pub use headers::HeaderCharset;
pub use headers::HeaderMultiMap;

mod request;
pub use request::RequestHead;

mod response;
pub use response::HttpResponse;
pub use response::ResponseContent;
pub use response::ResponseHead;
pub use response::ResponseMode;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
pub use error::is_transient_io;

pub mod body;
