use std::error::Error;

use async_trait::async_trait;
use bytes::Bytes;
use hatch_http::adapter::ProtocolRegistry;
use hatch_http::config::ServerConfig;
use hatch_http::connection::ConnectionInfo;
use hatch_http::handler::{WebSocketListener, make_handler};
use hatch_http::protocol::HttpResponse;
use hatch_http::server::ConnectionServer;
use hatch_http::websocket::{CloseReason, WebSocket, WebSocketSession};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

struct Echo;

#[async_trait]
impl WebSocketListener for Echo {
    async fn on_open(&mut self, socket: &WebSocket) {
        if let Err(e) = socket.send_text("welcome").await {
            warn!(cause = %e, "failed to greet");
        }
    }

    async fn on_text(&mut self, socket: &WebSocket, text: String) {
        if let Err(e) = socket.send_text(text).await {
            warn!(cause = %e, "failed to echo text");
        }
    }

    async fn on_binary(&mut self, socket: &WebSocket, data: Bytes) {
        if let Err(e) = socket.send_binary(data).await {
            warn!(cause = %e, "failed to echo binary");
        }
    }

    async fn on_close(&mut self, reason: Option<CloseReason>) {
        info!(?reason, "websocket closed");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let page = make_handler(|_session| async {
        Ok::<_, std::convert::Infallible>(Some(HttpResponse::new("connect with a websocket client to /echo\r\n".into())))
    });
    let registry = ProtocolRegistry::http(page).with_websocket(|session: &WebSocketSession| {
        info!(path = session.path(), subprotocol = ?session.subprotocol(), "websocket upgrade");
        (session.path() == "/echo").then_some(Echo)
    });

    let config = ServerConfig::builder().address("127.0.0.1:8080").build()?;
    let server = ConnectionServer::new(config, registry);
    let address = server.start()?;
    info!(%address, "echo server started");

    tokio::signal::ctrl_c().await?;
    server.stop(true).await;
    Ok(())
}
