//! Start/stop state machine shared by every listening component
//!
//! Each listener (API, health, debug, metric sink endpoints) is an [`HttpService`]:
//! - `start` flips the running flag false -> true, binds, and spawns the accept loop
//! - `stop` flips the flag true -> false and drains in-flight requests within a deadline
//!
//! Redundant calls are no-op successes. A failed bind rolls the flag back so the
//! caller may retry.

use async_trait::async_trait;
use axum::extract::ConnectInfo;
use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tower::ServiceExt;
use tracing::{debug, info, warn};

/// Errors surfaced by a listener's start/stop transitions
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{name}: failed to bind {addr}: {source}")]
    Bind {
        name: String,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("{name}: could not stop gracefully within {timeout:?}, listener force-closed")]
    ShutdownTimeout { name: String, timeout: Duration },

    #[error("{name}: listener task panicked")]
    Panicked { name: String },
}

/// A component with the Stopped -> Running -> Stopped lifecycle
#[async_trait]
pub trait Service: Send + Sync {
    /// Name used in logs and coordinator reports
    fn name(&self) -> &str;

    /// Begin serving. No-op if already running.
    async fn start(&self) -> Result<(), LifecycleError>;

    /// Stop serving. No-op if not running. The component is stopped when this
    /// returns, even if the result is an error.
    async fn stop(&self) -> Result<(), LifecycleError>;

    fn is_running(&self) -> bool;
}

/// A bound listener and the task driving its accept loop
struct Listening {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Accept connections until `shutdown` fires, then drain the open ones
///
/// Every connection task lives in a `JoinSet` owned by this future. Aborting
/// the surrounding task drops the set, which aborts each connection along with
/// whatever request it is still serving.
async fn serve(
    name: String,
    listener: TcpListener,
    router: Router,
    mut shutdown: oneshot::Receiver<()>,
) {
    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, remote_addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(component = %name, error = %e, "Failed to accept connection");
                        continue;
                    }
                };

                let router = router.clone();
                let service = service_fn(move |request: hyper::Request<Incoming>| {
                    let mut request = request.map(axum::body::Body::new);
                    request.extensions_mut().insert(ConnectInfo(remote_addr));
                    router.clone().oneshot(request)
                });

                let connection = graceful.watch(
                    http1::Builder::new()
                        .timer(TokioTimer::new())
                        .serve_connection(TokioIo::new(socket), service),
                );
                let name = name.clone();
                connections.spawn(async move {
                    if let Err(e) = connection.await {
                        debug!(
                            component = %name,
                            remote_addr = %remote_addr,
                            error = %e,
                            "Connection closed with error"
                        );
                    }
                });
            }
            // A dropped sender also means stop
            _ = &mut shutdown => break,
        }

        while connections.try_join_next().is_some() {}
    }

    drop(listener);
    graceful.shutdown().await;
    while connections.join_next().await.is_some() {}
}

/// An axum router bound to one address under the lifecycle contract
pub struct HttpService {
    name: String,
    addr: SocketAddr,
    router: Router,
    shutdown_timeout: Duration,
    running: Arc<AtomicBool>,
    // Serializes transitions so a stop can never interleave with a half-finished start
    listening: Mutex<Option<Listening>>,
}

impl HttpService {
    pub fn new(
        name: impl Into<String>,
        addr: SocketAddr,
        router: Router,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            addr,
            router,
            shutdown_timeout,
            running: Arc::new(AtomicBool::new(false)),
            listening: Mutex::new(None),
        }
    }

    /// Configured bind address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Address actually bound while running (differs from `addr` for port 0)
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        if !self.is_running() {
            return None;
        }
        self.listening.lock().await.as_ref().map(|l| l.local_addr)
    }
}

#[async_trait]
impl Service for HttpService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        let mut listening = self.listening.lock().await;

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        let listener = match TcpListener::bind(self.addr).await {
            Ok(listener) => listener,
            Err(source) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(LifecycleError::Bind {
                    name: self.name.clone(),
                    addr: self.addr,
                    source,
                });
            }
        };
        let local_addr = listener.local_addr().unwrap_or(self.addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(serve(
            self.name.clone(),
            listener,
            self.router.clone(),
            shutdown_rx,
        ));

        info!(component = %self.name, addr = %local_addr, "Listening");

        *listening = Some(Listening {
            local_addr,
            shutdown: shutdown_tx,
            task,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        let mut listening = self.listening.lock().await;

        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        let Some(Listening {
            shutdown, mut task, ..
        }) = listening.take()
        else {
            return Ok(());
        };

        info!(component = %self.name, "Stopping listener");
        let _ = shutdown.send(());

        match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
            Ok(Ok(())) => {
                info!(component = %self.name, "Listener stopped");
                Ok(())
            }
            Ok(Err(_)) => Err(LifecycleError::Panicked {
                name: self.name.clone(),
            }),
            Err(_) => {
                warn!(
                    component = %self.name,
                    timeout = ?self.shutdown_timeout,
                    "Graceful shutdown did not complete, force-closing listener and connections"
                );
                task.abort();
                let _ = task.await;
                Err(LifecycleError::ShutdownTimeout {
                    name: self.name.clone(),
                    timeout: self.shutdown_timeout,
                })
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
