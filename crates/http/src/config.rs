//! Server configuration.
//!
//! Everything the engine needs is threaded through one [`ServerConfig`] value, built with
//! [`ServerConfig::builder`]:
//!
//! ```no_run
//! use std::time::Duration;
//! use hatch_http::config::ServerConfig;
//!
//! let config = ServerConfig::builder()
//!     .address("127.0.0.1:8080")
//!     .keep_alive(Some(Duration::from_secs(30)))
//!     .behind_reverse_proxy(true)
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_rustls::TlsAcceptor;

use crate::executor::{TaskExecutor, TokioExecutor};
use crate::protocol::HeaderCharset;

/// Caps that keep a single request from growing parser buffers without bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserLimits {
    /// Longest accepted request line, including the line terminator.
    pub max_request_line: usize,
    /// Largest accepted header block, including trailers of chunked bodies.
    pub max_header_block: usize,
    pub max_headers: usize,
    /// Longest accepted `<hex>[;ext]` line of a chunked body.
    pub max_chunk_line: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self { max_request_line: 8 * 1024, max_header_block: 16 * 1024, max_headers: 128, max_chunk_line: 1024 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// Bodies of this many bytes or fewer are sent as is.
    pub threshold: u64,
    /// flate2 compression level, 0 to 9.
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self { enabled: true, threshold: 1024, level: 6 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebSocketConfig {
    /// Upper bound for a single frame payload and for a reassembled fragmented message.
    pub max_payload: u64,
    /// How long the read loop waits for any inbound frame before giving up.
    pub read_timeout: Duration,
}

impl WebSocketConfig {
    /// Pings go out twice per read timeout so a live peer always answers in time.
    pub fn ping_interval(&self) -> Duration {
        self.read_timeout / 2
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self { max_payload: 16 * 1024 * 1024, read_timeout: Duration::from_secs(60) }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("address must be set")]
    MissingAddress,
    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("compression level {0} is out of range 0..=9")]
    InvalidCompressionLevel(u32),
}

#[derive(Clone)]
pub struct ServerConfig {
    address: SocketAddr,
    behind_reverse_proxy: bool,
    keep_alive: Option<Duration>,
    min_socket_timeout: Duration,
    header_charset: HeaderCharset,
    parser_limits: ParserLimits,
    compression: CompressionConfig,
    websocket: WebSocketConfig,
    executor: Arc<dyn TaskExecutor>,
    tls: Option<TlsAcceptor>,
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Whether `X-Forwarded-For` hops are trusted as the remote address chain.
    pub fn behind_reverse_proxy(&self) -> bool {
        self.behind_reverse_proxy
    }

    /// `None` disables keep-alive entirely.
    pub fn keep_alive(&self) -> Option<Duration> {
        self.keep_alive
    }

    pub fn keep_alive_enabled(&self) -> bool {
        self.keep_alive.is_some()
    }

    pub fn min_socket_timeout(&self) -> Duration {
        self.min_socket_timeout
    }

    /// Idle timeout armed before every request line read.
    pub fn socket_timeout(&self) -> Duration {
        self.keep_alive.map_or(self.min_socket_timeout, |keep_alive| keep_alive.max(self.min_socket_timeout))
    }

    pub fn header_charset(&self) -> HeaderCharset {
        self.header_charset
    }

    pub fn parser_limits(&self) -> &ParserLimits {
        &self.parser_limits
    }

    pub fn compression(&self) -> &CompressionConfig {
        &self.compression
    }

    pub fn websocket(&self) -> &WebSocketConfig {
        &self.websocket
    }

    pub fn executor(&self) -> &Arc<dyn TaskExecutor> {
        &self.executor
    }

    pub fn tls(&self) -> Option<&TlsAcceptor> {
        self.tls.as_ref()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfigBuilder::new().into_config(SocketAddr::from(([127, 0, 0, 1], 0)))
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("address", &self.address)
            .field("behind_reverse_proxy", &self.behind_reverse_proxy)
            .field("keep_alive", &self.keep_alive)
            .field("min_socket_timeout", &self.min_socket_timeout)
            .field("header_charset", &self.header_charset)
            .field("parser_limits", &self.parser_limits)
            .field("compression", &self.compression)
            .field("websocket", &self.websocket)
            .field("tls", &self.tls.is_some())
            .finish_non_exhaustive()
    }
}

pub struct ServerConfigBuilder {
    address: Option<Result<SocketAddr, ConfigError>>,
    behind_reverse_proxy: bool,
    keep_alive: Option<Duration>,
    min_socket_timeout: Duration,
    header_charset: HeaderCharset,
    parser_limits: ParserLimits,
    compression: CompressionConfig,
    websocket: WebSocketConfig,
    executor: Option<Arc<dyn TaskExecutor>>,
    tls: Option<TlsAcceptor>,
}

impl ServerConfigBuilder {
    fn new() -> Self {
        Self {
            address: None,
            behind_reverse_proxy: false,
            keep_alive: Some(Duration::from_secs(30)),
            min_socket_timeout: Duration::from_secs(5),
            header_charset: HeaderCharset::from_env().unwrap_or_default(),
            parser_limits: ParserLimits::default(),
            compression: CompressionConfig::default(),
            websocket: WebSocketConfig::default(),
            executor: None,
            tls: None,
        }
    }

    /// Binds to the first address `address` resolves to.
    pub fn address<A: ToSocketAddrs + fmt::Display>(mut self, address: A) -> Self {
        let resolved = match address.to_socket_addrs() {
            Ok(mut addrs) => addrs.next().ok_or_else(|| ConfigError::InvalidAddress {
                address: address.to_string(),
                reason: "resolved to nothing".into(),
            }),
            Err(e) => Err(ConfigError::InvalidAddress { address: address.to_string(), reason: e.to_string() }),
        };
        self.address = Some(resolved);
        self
    }

    pub fn behind_reverse_proxy(mut self, behind_reverse_proxy: bool) -> Self {
        self.behind_reverse_proxy = behind_reverse_proxy;
        self
    }

    pub fn keep_alive(mut self, keep_alive: Option<Duration>) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn min_socket_timeout(mut self, timeout: Duration) -> Self {
        self.min_socket_timeout = timeout;
        self
    }

    /// Overrides whatever `HATCH_HEADER_CHARSET` said.
    pub fn header_charset(mut self, charset: HeaderCharset) -> Self {
        self.header_charset = charset;
        self
    }

    pub fn parser_limits(mut self, limits: ParserLimits) -> Self {
        self.parser_limits = limits;
        self
    }

    pub fn compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn websocket(mut self, websocket: WebSocketConfig) -> Self {
        self.websocket = websocket;
        self
    }

    pub fn executor(mut self, executor: impl TaskExecutor) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    pub fn tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    pub fn build(mut self) -> Result<ServerConfig, ConfigError> {
        let address = self.address.take().ok_or(ConfigError::MissingAddress)??;
        if self.compression.level > 9 {
            return Err(ConfigError::InvalidCompressionLevel(self.compression.level));
        }
        Ok(self.into_config(address))
    }

    fn into_config(self, address: SocketAddr) -> ServerConfig {
        ServerConfig {
            address,
            behind_reverse_proxy: self.behind_reverse_proxy,
            keep_alive: self.keep_alive,
            min_socket_timeout: self.min_socket_timeout,
            header_charset: self.header_charset,
            parser_limits: self.parser_limits,
            compression: self.compression,
            websocket: self.websocket,
            executor: self.executor.unwrap_or_else(|| Arc::new(TokioExecutor::new())),
            tls: self.tls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_timeout_never_below_minimum() {
        let config = ServerConfig::builder()
            .address("127.0.0.1:0")
            .keep_alive(Some(Duration::from_secs(1)))
            .min_socket_timeout(Duration::from_secs(3))
            .build()
            .unwrap();
        assert_eq!(config.socket_timeout(), Duration::from_secs(3));

        let config = ServerConfig::builder().address("127.0.0.1:0").keep_alive(None).build().unwrap();
        assert!(!config.keep_alive_enabled());
        assert_eq!(config.socket_timeout(), config.min_socket_timeout());
    }

    #[test]
    fn build_requires_address() {
        assert!(matches!(ServerConfig::builder().build(), Err(ConfigError::MissingAddress)));
        assert!(matches!(ServerConfig::builder().address("not an address").build(), Err(ConfigError::InvalidAddress { .. })));
    }

    #[test]
    fn ping_interval_is_half_read_timeout() {
        let websocket = WebSocketConfig { read_timeout: Duration::from_secs(10), ..Default::default() };
        assert_eq!(websocket.ping_interval(), Duration::from_secs(5));
    }
}
