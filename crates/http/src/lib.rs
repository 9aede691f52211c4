//! An asynchronous HTTP/1.x and WebSocket server engine built on tokio.
//!
//! The engine owns the wire: it reads request heads and bodies, negotiates framing and
//! keep-alive, compresses responses, upgrades connections to WebSocket and writes
//! everything back in batches sized to the connection. Applications only provide
//! handlers.
//!
//! # Features
//!
//! - HTTP/0.9, HTTP/1.0 and HTTP/1.1 requests, with keep-alive
//! - Streaming request bodies (`Content-Length`, chunked or read until close)
//! - Fixed length, chunked and close-delimited responses
//! - `Expect: 100-continue`
//! - gzip and deflate response compression
//! - WebSocket (RFC 6455) with fragmentation, ping keep-alive and close handshakes
//! - Optional TLS through `tokio-rustls`
//!
//! # Example
//!
//! ```no_run
//! use std::convert::Infallible;
//! use hatch_http::adapter::{HttpSession, ProtocolRegistry};
//! use hatch_http::config::ServerConfig;
//! use hatch_http::connection::ConnectionInfo;
//! use hatch_http::handler::make_handler;
//! use hatch_http::protocol::HttpResponse;
//! use hatch_http::server::ConnectionServer;
//! use tracing::info;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::builder().address("127.0.0.1:8080").build()?;
//!     let server = ConnectionServer::new(config, ProtocolRegistry::http(make_handler(hello)));
//!     let address = server.start()?;
//!     info!(%address, "listening");
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop(true).await;
//!     Ok(())
//! }
//!
//! async fn hello(session: HttpSession) -> Result<Option<HttpResponse>, Infallible> {
//!     let body = format!("Hello {}!\r\n", session.path());
//!     Ok(Some(HttpResponse::new(body.into())))
//! }
//! ```
//!
//! # Architecture
//!
//! - [`server`]: listening socket, accept loop and client bookkeeping
//! - [`connection`]: the per-connection request loop and the batching writer
//! - [`adapter`]: protocol selection plus the HTTP adapter (negotiation, compression)
//! - [`websocket`]: handshake, frame codec and the WebSocket adapter
//! - [`codec`]: request decoding and response encoding
//! - [`protocol`]: message types and errors
//! - [`handler`]: the callbacks applications implement
//! - [`config`]: server settings
//! - [`executor`]: where connection and ping tasks run
//!
//! # Error handling
//!
//! - [`protocol::ParseError`]: malformed or oversized requests, each mapped to a status
//! - [`protocol::SendError`]: failures while writing a response
//! - [`protocol::HttpError`]: what a connection ends with
//! - [`websocket::WebSocketError`]: frame level violations, each mapped to a close code

pub mod adapter;
pub mod codec;
pub mod config;
pub mod connection;
pub mod executor;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod websocket;

mod date;
mod utils;
pub(crate) use utils::ensure;
