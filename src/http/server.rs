//! Proxy server lifecycle and connection handling.
//!
//! # Responsibilities
//! - Own the listening socket: bind on `start`, release on `stop`
//! - Publish every Stopped ⇄ Running transition to observers
//! - Run the accept loop on its own task
//! - Supervise one task per connection: frame → transform → forward
//! - Drain connection tasks on shutdown within a grace period
//!
//! # Connection flow
//! ```text
//! accept ─▶ read_request ─┬─ malformed ─▶ 400, close
//!                         ├─ closed ────▶ close
//!                         └─ request ───▶ POST? apply() : unchanged
//!                                          ─▶ Forwarder::forward ─▶ close
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::http::forward::Forwarder;
use crate::http::request::{read_request, FramingError};
use crate::http::response::{write_error, ErrorResponse};
use crate::lifecycle::{ServerStatus, Shutdown, ShutdownSignal};
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics::{self, RequestOutcome};
use crate::transform::{self, TransformResult};

/// Pause after a failed accept before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Errors returned by [`ProxyServer::start`].
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("invalid backend address {0:?}")]
    InvalidBackendAddress(String),

    #[error("backend address {0} is not a loopback address")]
    BackendNotLoopback(SocketAddr),

    #[error("failed to read bound address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

enum Lifecycle {
    Stopped,
    Running(RunningServer),
}

struct RunningServer {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    accept_task: JoinHandle<()>,
}

/// The intercepting proxy.
///
/// `start` and `stop` may be called concurrently from any task; they are
/// serialized internally and both are idempotent.
pub struct ProxyServer {
    config: ProxyConfig,
    state: Mutex<Lifecycle>,
    status: watch::Sender<ServerStatus>,
    tracker: ConnectionTracker,
}

impl ProxyServer {
    /// Create a stopped server for the given configuration.
    pub fn new(config: ProxyConfig) -> Self {
        let (status, _) = watch::channel(ServerStatus::Stopped);
        Self {
            config,
            state: Mutex::new(Lifecycle::Stopped),
            status,
            tracker: ConnectionTracker::new(),
        }
    }

    /// Bind the listener and start accepting connections.
    ///
    /// Returns the bound address. Calling `start` while running is a no-op
    /// that returns the existing address. Listener and backend addresses must
    /// be loopback. On error the server stays stopped.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let mut state = self.state.lock().await;
        if let Lifecycle::Running(running) = &*state {
            return Ok(running.local_addr);
        }

        let backend: SocketAddr = self
            .config
            .backend
            .address
            .parse()
            .map_err(|_| ServerError::InvalidBackendAddress(self.config.backend.address.clone()))?;
        if !backend.ip().is_loopback() {
            return Err(ServerError::BackendNotLoopback(backend));
        }

        let listener = Listener::bind(&self.config.listener).await?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

        let forwarder = Forwarder::new(backend, self.config.timeouts.connect())
            .with_nodelay(self.config.listener.nodelay);
        let handler = Arc::new(ConnectionHandler {
            forwarder,
            max_header_bytes: self.config.listener.max_header_bytes,
            tracker: self.tracker.clone(),
        });

        let shutdown = Shutdown::new();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            handler,
            shutdown.subscribe(),
            self.config.timeouts.shutdown_grace(),
        ));

        *state = Lifecycle::Running(RunningServer {
            local_addr,
            shutdown,
            accept_task,
        });
        self.publish(ServerStatus::Running);

        tracing::info!(address = %local_addr, backend = %backend, "Proxy server started");
        Ok(local_addr)
    }

    /// Stop accepting, release the socket, and drain connection handlers.
    ///
    /// No-op when already stopped.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let Lifecycle::Running(running) = std::mem::replace(&mut *state, Lifecycle::Stopped) else {
            return;
        };

        running.shutdown.trigger();
        if let Err(e) = running.accept_task.await {
            tracing::error!(error = %e, "Accept loop terminated abnormally");
        }
        self.publish(ServerStatus::Stopped);

        tracing::info!(
            address = %running.local_addr,
            accepted = self.tracker.accepted_count(),
            "Proxy server stopped"
        );
    }

    pub fn status(&self) -> ServerStatus {
        *self.status.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }

    /// Observe status transitions. The receiver starts at the current status.
    pub fn subscribe(&self) -> watch::Receiver<ServerStatus> {
        self.status.subscribe()
    }

    /// Address the listener is bound to while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.state.lock().await {
            Lifecycle::Running(running) => Some(running.local_addr),
            Lifecycle::Stopped => None,
        }
    }

    /// Number of connections currently being handled.
    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Connections accepted since the server was created, across restarts.
    pub fn accepted_connections(&self) -> u64 {
        self.tracker.accepted_count()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    fn publish(&self, status: ServerStatus) {
        self.status.send_replace(status);
        metrics::record_server_running(status.is_running());
    }
}

impl Drop for ProxyServer {
    fn drop(&mut self) {
        if let Lifecycle::Running(running) = self.state.get_mut() {
            running.shutdown.trigger();
        }
    }
}

async fn accept_loop(
    listener: Listener,
    handler: Arc<ConnectionHandler>,
    mut shutdown: ShutdownSignal,
    grace: Duration,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let handler = Arc::clone(&handler);
                    let signal = shutdown.clone();
                    connections.spawn(async move { handler.handle(stream, peer, signal).await });
                }
                Err(e) => back_off_after_accept_error(&e).await,
            },
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = finished {
                    tracing::error!(error = %e, "Connection task failed");
                }
            }
        }
    }

    drop(listener);
    tracing::debug!(in_flight = connections.len(), "Listener closed, draining connections");

    let drained = tokio::time::timeout(grace, async {
        while connections.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        tracing::warn!(
            aborted = connections.len(),
            grace_secs = grace.as_secs(),
            "Connections still open after grace period, aborting"
        );
        connections.shutdown().await;
    }
}

/// Errors such as EMFILE repeat immediately, so pause before accepting again.
async fn back_off_after_accept_error(error: &ListenerError) {
    tracing::warn!(
        error = %error,
        backoff_ms = ACCEPT_ERROR_BACKOFF.as_millis() as u64,
        "Accept failed"
    );
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

/// Per-connection pipeline shared by all connection tasks.
struct ConnectionHandler {
    forwarder: Forwarder,
    max_header_bytes: usize,
    tracker: ConnectionTracker,
}

impl ConnectionHandler {
    async fn handle(&self, mut stream: TcpStream, peer: SocketAddr, shutdown: ShutdownSignal) {
        let guard = self.tracker.track();
        let span = tracing::info_span!("connection", connection_id = %guard.id(), peer = %peer);

        async move {
            self.serve(&mut stream, shutdown).await;
            if let Err(e) = stream.shutdown().await {
                tracing::trace!(error = %e, "Client stream already closed");
            }
            drop(guard);
        }
        .instrument(span)
        .await
    }

    async fn serve(&self, stream: &mut TcpStream, mut shutdown: ShutdownSignal) {
        let framed = tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!("Shutdown before request was received");
                return;
            }
            framed = read_request(stream, self.max_header_bytes) => framed,
        };

        let request = match framed {
            Ok(Some(request)) => request,
            Ok(None) => {
                tracing::debug!("Client closed without sending a request");
                return;
            }
            Err(e) if e.is_client_error() => {
                tracing::warn!(error = %e, "Rejecting malformed request");
                metrics::record_rejected("malformed_request");
                if let Err(e) = write_error(stream, &ErrorResponse::BAD_REQUEST).await {
                    tracing::debug!(error = %e, "Failed to send error response");
                }
                return;
            }
            Err(e) => {
                tracing::debug!(error = %e, "Connection dropped while reading request");
                return;
            }
        };

        let outcome = if request.is_post() {
            transform::apply(request.body())
        } else {
            TransformResult::unchanged(request.body())
        };

        tracing::debug!(
            method = request.method(),
            path = request.path(),
            body_bytes = outcome.body.len(),
            transformed = outcome.modified,
            "Forwarding request"
        );

        let started = Instant::now();
        match self.forwarder.forward(&request, &outcome.body, stream).await {
            Ok(bytes) => {
                tracing::debug!(response_bytes = bytes, "Relayed backend response");
                metrics::record_request(
                    request.method(),
                    RequestOutcome::Relayed,
                    outcome.modified,
                    started,
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Forwarding failed, closing client connection");
                metrics::record_request(
                    request.method(),
                    RequestOutcome::UpstreamError,
                    outcome.modified,
                    started,
                );
            }
        }
    }
}
