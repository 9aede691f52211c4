use std::convert::Infallible;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hatch_http::adapter::ProtocolRegistry;
use hatch_http::config::{ServerConfig, WebSocketConfig};
use hatch_http::connection::ConnectionInfo;
use hatch_http::handler::{WebSocketListener, make_handler};
use hatch_http::protocol::HttpResponse;
use hatch_http::server::ConnectionServer;
use hatch_http::websocket::{CloseReason, WebSocket, WebSocketSession};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

const HANDSHAKE: &str = "GET /chat HTTP/1.1\r\n\
    Host: localhost\r\n\
    Connection: keep-alive, Upgrade\r\n\
    Upgrade: websocket\r\n\
    Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
    Sec-WebSocket-Protocol: chat, superchat\r\n\
    Sec-WebSocket-Version: 13\r\n\
    \r\n";

struct Echo {
    closed: mpsc::UnboundedSender<Option<CloseReason>>,
}

#[async_trait]
impl WebSocketListener for Echo {
    async fn on_text(&mut self, socket: &WebSocket, text: String) {
        socket.send_text(text).await.unwrap();
    }

    async fn on_binary(&mut self, socket: &WebSocket, data: Bytes) {
        socket.send_binary(data).await.unwrap();
    }

    async fn on_close(&mut self, reason: Option<CloseReason>) {
        self.closed.send(reason).unwrap();
    }
}

async fn start() -> (ConnectionServer, mpsc::UnboundedReceiver<Option<CloseReason>>) {
    start_with(WebSocketConfig::default()).await
}

async fn start_with(websocket: WebSocketConfig) -> (ConnectionServer, mpsc::UnboundedReceiver<Option<CloseReason>>) {
    let (closed_tx, closed_rx) = mpsc::unbounded_channel();
    let http = make_handler(|_session| async { Ok::<_, Infallible>(Some(HttpResponse::new("plain".into()))) });
    let registry = ProtocolRegistry::http(http).with_websocket(move |session: &WebSocketSession| {
        (session.path() == "/chat").then(|| Echo { closed: closed_tx.clone() })
    });
    let config = ServerConfig::builder().address("127.0.0.1:0").websocket(websocket).build().unwrap();
    let server = ConnectionServer::new(config, registry);
    server.start().unwrap();
    (server, closed_rx)
}

async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        let mut byte = [0u8; 1];
        assert_eq!(stream.read(&mut byte).await.unwrap(), 1, "connection closed during head");
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

async fn read_exact(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    timeout(Duration::from_secs(5), stream.read_exact(&mut buf)).await.unwrap().unwrap();
    buf
}

fn masked(first: u8, payload: &[u8]) -> Vec<u8> {
    let mask = [0x37, 0xfa, 0x21, 0x3d];
    let mut frame = vec![first, 0x80 | u8::try_from(payload.len()).unwrap()];
    frame.extend_from_slice(&mask);
    frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
    frame
}

#[tokio::test]
async fn echo_and_close_handshake() {
    let (server, mut closed) = start().await;
    let mut stream = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();

    stream.write_all(HANDSHAKE.as_bytes()).await.unwrap();
    let head = read_head(&mut stream).await.to_ascii_lowercase();
    assert!(head.starts_with("http/1.1 101 switching protocols\r\n"));
    assert!(head.contains("sec-websocket-accept: s3pplmbitxaq9kygzzhzrbk+xoo=\r\n"));
    assert!(head.contains("sec-websocket-protocol: chat\r\n"));
    assert!(head.contains("upgrade: websocket\r\n"));

    // masked "Hello"
    stream.write_all(&[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]).await.unwrap();
    assert_eq!(read_exact(&mut stream, 7).await, b"\x81\x05Hello");

    // fragmented binary message arrives reassembled
    stream.write_all(&masked(0x02, b"abc")).await.unwrap();
    stream.write_all(&masked(0x80, b"def")).await.unwrap();
    assert_eq!(read_exact(&mut stream, 8).await, b"\x82\x06abcdef");

    // pings are answered between messages
    stream.write_all(&masked(0x89, b"hi")).await.unwrap();
    assert_eq!(read_exact(&mut stream, 4).await, b"\x8a\x02hi");

    stream.write_all(&masked(0x88, &[0x03, 0xe8])).await.unwrap();
    assert_eq!(read_exact(&mut stream, 4).await, [0x88, 0x02, 0x03, 0xe8]);

    let mut rest = Vec::new();
    timeout(Duration::from_secs(5), stream.read_to_end(&mut rest)).await.unwrap().unwrap();
    assert!(rest.is_empty());

    let reason = timeout(Duration::from_secs(5), closed.recv()).await.unwrap().unwrap();
    assert_eq!(reason.map(|reason| reason.code), Some(CloseReason::NORMAL));
    server.stop(true).await;
}

#[tokio::test]
async fn protocol_violation_closes_with_1002() {
    let (server, mut closed) = start().await;
    let mut stream = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();
    stream.write_all(HANDSHAKE.as_bytes()).await.unwrap();
    read_head(&mut stream).await;

    // continuation without a message in progress
    stream.write_all(&masked(0x80, b"oops")).await.unwrap();
    let header = read_exact(&mut stream, 2).await;
    assert_eq!(header[0], 0x88);
    let payload = read_exact(&mut stream, usize::from(header[1])).await;
    assert_eq!(payload[..2], [0x03, 0xea]);

    let reason = timeout(Duration::from_secs(5), closed.recv()).await.unwrap().unwrap();
    assert_eq!(reason.map(|reason| reason.code), Some(CloseReason::PROTOCOL_ERROR));
    server.stop(true).await;
}

#[tokio::test]
async fn unsupported_version_gets_426() {
    let (server, _closed) = start().await;
    let mut stream = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();

    stream.write_all(HANDSHAKE.replace("Version: 13", "Version: 8").as_bytes()).await.unwrap();
    let head = read_head(&mut stream).await.to_ascii_lowercase();
    assert!(head.starts_with("http/1.1 426 upgrade required\r\n"));
    assert!(head.contains("sec-websocket-version: 13\r\n"));
    server.stop(true).await;
}

#[tokio::test]
async fn refused_upgrade_drops_connection() {
    let (server, _closed) = start().await;
    let mut stream = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();

    stream.write_all(HANDSHAKE.replace("/chat", "/elsewhere").as_bytes()).await.unwrap();
    let mut rest = Vec::new();
    timeout(Duration::from_secs(5), stream.read_to_end(&mut rest)).await.unwrap().unwrap();
    assert!(rest.is_empty());
    server.stop(true).await;
}

#[tokio::test]
async fn plain_requests_still_reach_http_handler() {
    let (server, _closed) = start().await;
    let mut stream = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();

    stream.write_all(b"GET /chat HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await.unwrap();
    let mut response = Vec::new();
    timeout(Duration::from_secs(5), stream.read_to_end(&mut response)).await.unwrap().unwrap();
    let response = String::from_utf8(response).unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with("plain"));
    server.stop(true).await;
}

#[tokio::test]
async fn idle_session_gets_periodic_pings() {
    let websocket = WebSocketConfig { read_timeout: Duration::from_millis(400), ..Default::default() };
    let (server, mut closed) = start_with(websocket).await;
    let mut stream = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();
    stream.write_all(HANDSHAKE.as_bytes()).await.unwrap();
    read_head(&mut stream).await;

    // answering each ping keeps the session alive past the read timeout
    for _ in 0..2 {
        let ping = read_exact(&mut stream, 10).await;
        assert_eq!(ping[..2], [0x89, 0x08]);
        stream.write_all(&masked(0x8a, &ping[2..])).await.unwrap();
    }
    assert!(closed.try_recv().is_err());

    server.stop(true).await;
}

#[tokio::test]
async fn stop_closes_live_sessions_with_going_away() {
    let (server, mut closed) = start().await;
    let mut stream = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();
    stream.write_all(HANDSHAKE.as_bytes()).await.unwrap();
    read_head(&mut stream).await;

    stream.write_all(&masked(0x81, b"still here")).await.unwrap();
    assert_eq!(read_exact(&mut stream, 12).await, b"\x81\x0astill here");
    assert_eq!(server.connection_count(), 1);

    server.stop(true).await;

    let header = read_exact(&mut stream, 2).await;
    assert_eq!(header[0], 0x88);
    let payload = read_exact(&mut stream, usize::from(header[1])).await;
    assert_eq!(payload[..2], [0x03, 0xe9]);

    let mut rest = Vec::new();
    timeout(Duration::from_secs(5), stream.read_to_end(&mut rest)).await.unwrap().unwrap();
    assert!(rest.is_empty());

    let reason = timeout(Duration::from_secs(5), closed.recv()).await.unwrap().unwrap();
    assert_eq!(reason.map(|reason| reason.code), Some(CloseReason::GOING_AWAY));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.connection_count(), 0);
}
