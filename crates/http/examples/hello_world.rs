use std::error::Error;

use hatch_http::adapter::{HttpSession, ProtocolRegistry};
use hatch_http::config::ServerConfig;
use hatch_http::connection::ConnectionInfo;
use hatch_http::handler::{BoxError, make_handler};
use hatch_http::protocol::HttpResponse;
use hatch_http::server::ConnectionServer;
use http::{Response, StatusCode, header};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = ServerConfig::builder().address("127.0.0.1:8080").build()?;
    let server = ConnectionServer::new(config, ProtocolRegistry::http(make_handler(hello_world)));
    let address = server.start()?;
    info!(%address, "try: curl -v http://{address}/");

    tokio::signal::ctrl_c().await?;
    server.stop(true).await;
    Ok(())
}

async fn hello_world(mut session: HttpSession) -> Result<Option<HttpResponse>, BoxError> {
    let body = session.text().await?;
    info!(path = session.path(), client = %session.client_address(), body = %body, "receiving request");

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body("Hello World!\r\n".into())?;
    Ok(Some(response))
}
