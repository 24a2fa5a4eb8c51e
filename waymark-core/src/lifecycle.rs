//! Server states and the per-run network runtime: accept loop, connection
//! tasks and the drain sequence.

use std::fmt;
use std::net::SocketAddr;
use std::future::poll_fn;
use std::sync::{Arc, Mutex};
use std::task::Poll;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::connections::{ConnectionGuard, ConnectionSet};
use crate::http::Router;

/// Lifecycle phase of a [`Server`](crate::Server).
///
/// ```text
/// Idle ──start──▶ Starting ──bound──▶ Running ──stop──▶ Stopping ──drained──▶ Stopped
///   ▲                │                   │                  │                    │
///   └──bind failed───┘                   └────force_stop────┴───────────────────▶│
///                                                                                │
///                          start (from Stopped) ◀────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl ServerState {
    /// `start` is valid and the registries accept changes.
    pub fn is_idle(&self) -> bool {
        matches!(self, ServerState::Idle | ServerState::Stopped)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ServerState::Running)
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::Idle => "idle",
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
            ServerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

// ── Runtime ─────────────────────────────────────────────────────────────

/// Network resources of one Running period.
///
/// The listener lives in a slot shared with the accept loop, so closing it
/// does not wait for that task to be scheduled again. Shutdown escalates
/// through three tokens: `accept` stops the accept loop, `drain` asks every
/// connection to finish its in-flight request and close, `kill` drops
/// connections outright. `forced` releases anyone still waiting in
/// [`Runtime::drain`].
pub(crate) struct Runtime {
    local_addr: SocketAddr,
    accept: CancellationToken,
    drain: CancellationToken,
    kill: CancellationToken,
    forced: CancellationToken,
    listener: ListenerSlot,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    connections: Arc<ConnectionSet>,
}

type ListenerSlot = Arc<Mutex<Option<TcpListener>>>;

impl Runtime {
    /// Spawn the accept loop on `listener`.
    pub(crate) fn spawn(listener: TcpListener, router: Router) -> std::io::Result<Arc<Self>> {
        let local_addr = listener.local_addr()?;
        let accept = CancellationToken::new();
        let drain = CancellationToken::new();
        let kill = CancellationToken::new();
        let connections = Arc::new(ConnectionSet::new());
        let listener: ListenerSlot = Arc::new(Mutex::new(Some(listener)));

        let task = tokio::spawn(accept_loop(
            listener.clone(),
            router,
            Tokens {
                accept: accept.clone(),
                drain: drain.clone(),
                kill: kill.clone(),
            },
            connections.clone(),
        ));

        Ok(Arc::new(Self {
            local_addr,
            accept,
            drain,
            kill,
            forced: CancellationToken::new(),
            listener,
            accept_task: Mutex::new(Some(task)),
            connections,
        }))
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn active_connections(&self) -> usize {
        self.connections.len()
    }

    /// Stop accepting, ask connections to finish, and after `grace` close
    /// whatever is left. Returns early if [`force_close`](Self::force_close)
    /// runs meanwhile.
    pub(crate) async fn drain(&self, grace: Duration) {
        self.close_listener();
        self.accept.cancel();
        self.drain.cancel();

        tokio::select! {
            _ = self.connections.wait_empty() => return,
            _ = self.forced.cancelled() => return,
            _ = tokio::time::sleep(grace) => {}
        }

        tracing::warn!(
            remaining = self.connections.len(),
            grace_ms = grace.as_millis() as u64,
            "grace period elapsed, closing remaining connections"
        );
        self.kill.cancel();

        tokio::select! {
            _ = self.connections.wait_empty() => {}
            _ = self.forced.cancelled() => {}
        }
    }

    /// Abort the accept loop and every connection task right away.
    pub(crate) fn force_close(&self) {
        self.close_listener();
        self.accept.cancel();
        self.drain.cancel();
        self.kill.cancel();
        self.forced.cancel();
        if let Some(task) = self.take_accept_task() {
            task.abort();
        }
        self.connections.abort_all();
        self.connections.clear();
    }

    /// Wait for the accept loop to exit. No-op if it was already joined or
    /// aborted.
    pub(crate) async fn join_accept(&self) {
        if let Some(task) = self.take_accept_task() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::error!(error = %e, "accept loop panicked");
                }
            }
        }
    }

    pub(crate) fn clear_connections(&self) {
        self.connections.clear();
    }

    /// Drop the listener now; the port is free once this returns.
    fn close_listener(&self) {
        let closed = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some();
        if closed {
            tracing::debug!(addr = %self.local_addr, "listener closed");
        }
    }

    fn take_accept_task(&self) -> Option<JoinHandle<()>> {
        self.accept_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

#[derive(Clone)]
struct Tokens {
    accept: CancellationToken,
    drain: CancellationToken,
    kill: CancellationToken,
}

/// Resolves to `None` once the listener has been taken out of the slot.
async fn next_connection(
    slot: &ListenerSlot,
) -> Option<std::io::Result<(TcpStream, SocketAddr)>> {
    poll_fn(|cx| {
        let listener = slot.lock().unwrap_or_else(|e| e.into_inner());
        match listener.as_ref() {
            Some(listener) => listener.poll_accept(cx).map(Some),
            None => Poll::Ready(None),
        }
    })
    .await
}

async fn accept_loop(
    listener: ListenerSlot,
    router: Router,
    tokens: Tokens,
    connections: Arc<ConnectionSet>,
) {
    loop {
        tokio::select! {
            biased;
            _ = tokens.accept.cancelled() => break,
            accepted = next_connection(&listener) => {
                let (stream, remote_addr) = match accepted {
                    None => break,
                    Some(Ok(conn)) => conn,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };
                let guard = connections.register();
                let id = guard.id();
                let task = tokio::spawn(serve_connection(
                    stream,
                    remote_addr,
                    router.clone(),
                    tokens.clone(),
                    guard,
                ));
                connections.attach(id, task.abort_handle());
            }
        }
    }
    tracing::debug!("accept loop stopped");
}

async fn serve_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    router: Router,
    tokens: Tokens,
    _guard: ConnectionGuard,
) {
    let service = TowerToHyperService::new(router);
    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        res = conn.as_mut() => res,
        _ = tokens.drain.cancelled() => {
            conn.as_mut().graceful_shutdown();
            tokio::select! {
                res = conn.as_mut() => res,
                _ = tokens.kill.cancelled() => {
                    tracing::debug!(%remote_addr, "connection closed after grace period");
                    return;
                }
            }
        }
        _ = tokens.kill.cancelled() => return,
    };

    if let Err(e) = result {
        tracing::debug!(%remote_addr, error = %e, "connection error");
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix. For use with
/// [`Server::run_until`](crate::Server::run_until).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
