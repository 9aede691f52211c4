//! The listening side: binds the socket, accepts connections and hands each one to an
//! [`HttpConnection`] on its own execution unit.
//!
//! ```no_run
//! use std::convert::Infallible;
//! use hatch_http::adapter::ProtocolRegistry;
//! use hatch_http::config::ServerConfig;
//! use hatch_http::handler::make_handler;
//! use hatch_http::protocol::HttpResponse;
//! use hatch_http::server::ConnectionServer;
//!
//! # async fn run() -> std::io::Result<()> {
//! let handler = make_handler(|_session| async {
//!     Ok::<_, Infallible>(Some(HttpResponse::new("hello".into())))
//! });
//! let config = ServerConfig::builder().address("127.0.0.1:8080").build().unwrap();
//! let server = ConnectionServer::new(config, ProtocolRegistry::http(handler));
//! let address = server.start()?;
//! # server.stop(true).await;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::adapter::ProtocolRegistry;
use crate::config::ServerConfig;
use crate::connection::{HttpConnection, SocketInfo};
use crate::executor::RunningTask;
use crate::protocol::{HttpError, ParseError};

const LISTEN_BACKLOG: u32 = 1024;

// how long a cancelled connection may take to close on its own before it is dropped
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct ConnectionServer {
    config: Arc<ServerConfig>,
    registry: Arc<ProtocolRegistry>,
    listening: Mutex<Option<Listening>>,
    clients: Arc<Clients>,
}

struct Listening {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    accept_task: Box<dyn RunningTask>,
}

/// Live client connections, each cancellable on shutdown.
#[derive(Default)]
struct Clients {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, CancellationToken>>,
}

impl Clients {
    fn register(self: &Arc<Self>) -> (ClientGuard, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.live.lock().unwrap_or_else(PoisonError::into_inner).insert(id, token.clone());
        (ClientGuard { clients: Arc::clone(self), id }, token)
    }

    fn len(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn disconnect_all(&self) {
        let live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        for token in live.values() {
            token.cancel();
        }
    }
}

/// Removes its connection from [`Clients`] however the connection task ends.
struct ClientGuard {
    clients: Arc<Clients>,
    id: u64,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.clients.live.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.id);
    }
}

impl ConnectionServer {
    pub fn new(config: ServerConfig, registry: ProtocolRegistry) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            listening: Mutex::new(None),
            clients: Arc::new(Clients::default()),
        }
    }

    /// Binds and starts accepting, returning the bound address.
    ///
    /// Calling it again while listening only returns the address. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) -> io::Result<SocketAddr> {
        let mut listening = self.listening.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(listening) = listening.as_ref() {
            return Ok(listening.local_addr);
        }

        let listener = bind(self.config.address())?;
        let local_addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let accept_loop = accept_loop(
            listener,
            Arc::clone(&self.config),
            Arc::clone(&self.registry),
            Arc::clone(&self.clients),
            shutdown.clone(),
        );
        let accept_task = self.config.executor().execute(Box::pin(accept_loop));

        info!(address = %local_addr, tls = self.config.tls().is_some(), "start listening");
        *listening = Some(Listening { local_addr, shutdown, accept_task });
        Ok(local_addr)
    }

    /// Closes the listening socket and, if asked to, every open client connection.
    pub async fn stop(&self, disconnect_clients: bool) {
        let listening = self.listening.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(listening) = listening else {
            return;
        };

        listening.shutdown.cancel();
        listening.accept_task.join().await;
        if disconnect_clients {
            self.clients.disconnect_all();
        }
        info!(address = %listening.local_addr, disconnect_clients, "stopped listening");
    }

    pub fn is_alive(&self) -> bool {
        self.listening
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|listening| listening.accept_task.is_alive())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listening.lock().unwrap_or_else(PoisonError::into_inner).as_ref().map(|listening| listening.local_addr)
    }

    /// Number of client connections currently open.
    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl std::fmt::Debug for ConnectionServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionServer")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("local_addr", &self.local_addr())
            .finish_non_exhaustive()
    }
}

fn bind(address: SocketAddr) -> io::Result<TcpListener> {
    let socket = if address.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
    socket.set_reuseaddr(true)?;
    socket.bind(address)?;
    socket.listen(LISTEN_BACKLOG)
}

async fn accept_loop(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    registry: Arc<ProtocolRegistry>,
    clients: Arc<Clients>,
    shutdown: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            () = shutdown.cancelled() => {
                debug!("accept loop stopped");
                return;
            }
            accepted = listener.accept() => accepted,
        };

        let (stream, remote_addr) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        let (guard, token) = clients.register();
        let connection = handle_connection(stream, remote_addr, Arc::clone(&config), Arc::clone(&registry), token);
        let span = info_span!("connection", remote = %remote_addr);
        // the returned handle is not needed: shutdown goes through the client token
        drop(config.executor().execute(Box::pin(
            async move {
                let _guard = guard;
                connection.await;
            }
            .instrument(span),
        )));
    }
}

async fn handle_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    config: Arc<ServerConfig>,
    registry: Arc<ProtocolRegistry>,
    token: CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(cause = %e, "failed to set TCP_NODELAY");
    }

    // the connection sees the token and closes itself; only a stuck one is dropped
    let serve = serve_stream(stream, remote_addr, config, registry, token.clone());
    let stuck = async {
        token.cancelled().await;
        tokio::time::sleep(SHUTDOWN_GRACE).await;
    };
    let result = tokio::select! {
        biased;
        result = serve => result,
        () = stuck => {
            warn!("connection did not close after server shutdown, dropping it");
            return;
        }
    };

    match result {
        Ok(()) => debug!("connection finished"),
        Err(e) if e.is_transient() => debug!(cause = %e, "connection closed"),
        Err(e @ HttpError::RequestError { .. }) => warn!(cause = %e, "bad request, connection closed"),
        Err(e) => error!(cause = %e, "connection failed"),
    }
}

async fn serve_stream(
    stream: TcpStream,
    remote_addr: SocketAddr,
    config: Arc<ServerConfig>,
    registry: Arc<ProtocolRegistry>,
    token: CancellationToken,
) -> Result<(), HttpError> {
    let local_addr = stream.local_addr().map_err(ParseError::io)?;

    let Some(acceptor) = config.tls().cloned() else {
        let (reader, writer) = stream.into_split();
        let socket = SocketInfo::new(remote_addr, local_addr, None);
        return HttpConnection::new(reader, writer, socket, config, registry).with_shutdown(token).process().await;
    };

    let handshake = tokio::time::timeout(config.socket_timeout(), acceptor.accept(stream));
    let tls_stream = tokio::select! {
        () = token.cancelled() => {
            debug!("server shutting down during tls handshake");
            return Ok(());
        }
        handshake = handshake => handshake.map_err(|_| ParseError::Timeout)?.map_err(ParseError::io)?,
    };
    let tls_version = tls_stream.get_ref().1.protocol_version().map(|version| format!("{version:?}"));
    debug!(tls_version = ?tls_version, "tls handshake finished");

    let (reader, writer) = tokio::io::split(tls_stream);
    let socket = SocketInfo::new(remote_addr, local_addr, tls_version);
    HttpConnection::new(reader, writer, socket, config, registry).with_shutdown(token).process().await
}
