//! WebSocket (RFC 6455) served as an upgrade of an HTTP/1.1 request.
//!
//! - [`WebSocketAdapter`]: handshake, session setup, read loop and ping loop
//! - [`FrameCodec`]: frame parsing, unmasking and reassembly of fragmented messages
//! - [`WebSocket`]: the send handle given to listeners
//! - [`WebSocketSession`]: read-only view of the upgrade request

mod adapter;
mod codec;
mod error;
mod frame;
mod handshake;
mod session;
mod socket;

pub use adapter::{WebSocketAdapter, WebSocketUpgrade};
pub use codec::{FrameCodec, FrameEncoder, WsMessage};
pub use error::{CloseReason, WebSocketError};
pub use frame::{Frame, OpCode, fragment};
pub use handshake::{SUPPORTED_VERSION, WS_GUID, accept_key};
pub use session::WebSocketSession;
pub use socket::WebSocket;
