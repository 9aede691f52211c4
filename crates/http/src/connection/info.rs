//! Read-only facts about a socket and the request currently served on it.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use http::header::HeaderName;
use http::{Method, Uri, Version};

use crate::protocol::{HeaderMultiMap, RequestHead};

const LOOPBACK_MTU: usize = 8192;
const IPV6_MTU: usize = 1240;
const IPV4_MTU: usize = 1440;

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Derived once per accepted socket and shared by every request cycle on it.
#[derive(Debug, Clone)]
pub struct SocketInfo {
    remote_addr: SocketAddr,
    local_addr: SocketAddr,
    tls_version: Option<String>,
    mtu: usize,
}

impl SocketInfo {
    pub fn new(remote_addr: SocketAddr, local_addr: SocketAddr, tls_version: Option<String>) -> Self {
        Self { remote_addr, local_addr, tls_version, mtu: guess_mtu(remote_addr.ip()) }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn tls_version(&self) -> Option<&str> {
        self.tls_version.as_deref()
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }
}

/// Payload size that fits one packet towards `ip`, leaving room for protocol headers.
fn guess_mtu(ip: IpAddr) -> usize {
    let ip = ip.to_canonical();
    if ip.is_loopback() {
        LOOPBACK_MTU
    } else if ip.is_ipv6() {
        IPV6_MTU
    } else {
        IPV4_MTU
    }
}

/// Everything known about one request, before any body is read.
#[derive(Debug)]
pub struct RequestInfo {
    head: Arc<RequestHead>,
    socket: Arc<SocketInfo>,
    remote_chain: Vec<String>,
}

impl RequestInfo {
    pub fn new(head: Arc<RequestHead>, socket: Arc<SocketInfo>, behind_reverse_proxy: bool) -> Self {
        let mut remote_chain = Vec::new();
        if behind_reverse_proxy {
            remote_chain.extend(head.headers().tokens(&X_FORWARDED_FOR).iter().cloned());
        }
        remote_chain.push(socket.remote_addr().ip().to_string());
        Self { head, socket, remote_chain }
    }
}

/// Read-only view shared by HTTP and WebSocket sessions.
pub trait ConnectionInfo {
    fn request_info(&self) -> &RequestInfo;

    fn request(&self) -> &RequestHead {
        &self.request_info().head
    }

    fn method(&self) -> &Method {
        self.request().method()
    }

    fn uri(&self) -> &Uri {
        self.request().uri()
    }

    fn path(&self) -> &str {
        self.request().path()
    }

    fn query(&self) -> Option<&str> {
        self.request().query()
    }

    fn version(&self) -> Version {
        self.request().version()
    }

    fn headers(&self) -> &HeaderMultiMap {
        self.request().headers()
    }

    fn host(&self) -> Option<String> {
        self.request().host()
    }

    /// Peer address of the socket itself.
    fn remote_addr(&self) -> SocketAddr {
        self.request_info().socket.remote_addr()
    }

    /// Client first, then each proxy hop, ending with the socket peer.
    ///
    /// `X-Forwarded-For` is only trusted when the server runs behind a reverse proxy.
    fn remote_chain(&self) -> &[String] {
        &self.request_info().remote_chain
    }

    /// Best guess at the originating client address.
    fn client_address(&self) -> &str {
        self.remote_chain().first().map(String::as_str).unwrap_or_default()
    }

    fn server_port(&self) -> u16 {
        self.request_info().socket.local_addr().port()
    }

    /// Negotiated TLS protocol version, e.g. `TLSv1_3`.
    fn tls_version(&self) -> Option<&str> {
        self.request_info().socket.tls_version()
    }

    fn is_secure(&self) -> bool {
        self.tls_version().is_some()
    }

    fn guessed_mtu(&self) -> usize {
        self.request_info().socket.mtu()
    }
}

impl ConnectionInfo for RequestInfo {
    fn request_info(&self) -> &RequestInfo {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HeaderCharset;
    use http::{HeaderMap, HeaderValue};

    fn info(remote: &str, xff: Option<&'static str>, behind_reverse_proxy: bool) -> RequestInfo {
        let mut map = HeaderMap::new();
        if let Some(xff) = xff {
            map.insert("x-forwarded-for", HeaderValue::from_static(xff));
        }
        let head = RequestHead::new(Method::GET, Uri::from_static("/"), Version::HTTP_11, HeaderMultiMap::new(map, HeaderCharset::Latin1));
        let socket = SocketInfo::new(remote.parse().unwrap(), "10.0.0.1:8443".parse().unwrap(), None);
        RequestInfo::new(Arc::new(head), Arc::new(socket), behind_reverse_proxy)
    }

    #[test]
    fn mtu_by_address_family() {
        assert_eq!(info("127.0.0.1:1000", None, false).guessed_mtu(), 8192);
        assert_eq!(info("[::1]:1000", None, false).guessed_mtu(), 8192);
        assert_eq!(info("[2001:db8::1]:1000", None, false).guessed_mtu(), 1240);
        assert_eq!(info("[::ffff:192.0.2.1]:1000", None, false).guessed_mtu(), 1440);
        assert_eq!(info("192.0.2.1:1000", None, false).guessed_mtu(), 1440);
    }

    #[test]
    fn forwarded_hops_only_behind_proxy() {
        let proxied = info("192.0.2.1:1000", Some("203.0.113.9, 198.51.100.2"), true);
        assert_eq!(proxied.remote_chain(), ["203.0.113.9", "198.51.100.2", "192.0.2.1"]);
        assert_eq!(proxied.client_address(), "203.0.113.9");

        let direct = info("192.0.2.1:1000", Some("203.0.113.9"), false);
        assert_eq!(direct.remote_chain(), ["192.0.2.1"]);
        assert_eq!(direct.server_port(), 8443);
    }
}
