//! Graceful shutdown handling for the service.
//!
//! This module coordinates the process lifecycle:
//! 1. Serve requests until a termination signal arrives
//! 2. Stop accepting connections and drain in-flight requests, bounded by a timeout
//! 3. Close the PostgreSQL pool exactly once, after the listener is gone

use std::future::{Future, IntoFuture};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::time::timeout;

use crate::config::ShutdownSettings;
use crate::postgres::PostgresPool;

/// Lifecycle phases, in the only order they can occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Starting,
    Serving,
    Draining,
    Stopped,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Serving => "serving",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        }
    }
}

/// Shared, forward-only view of the process lifecycle.
#[derive(Clone)]
pub struct Lifecycle {
    state: Arc<watch::Sender<LifecycleState>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Starting);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Move to `next` if it lies ahead of the current state.
    ///
    /// Returns `false` for backward or repeated transitions, which leave the
    /// state untouched.
    pub fn advance(&self, next: LifecycleState) -> bool {
        let advanced = self.state.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });

        if advanced {
            tracing::debug!(state = next.as_str(), "Lifecycle state changed");
        }
        advanced
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for in-flight requests to complete (default: 10 seconds)
    pub drain_timeout: Duration,
    /// Time to wait for pooled connections to be released (default: 5 seconds)
    pub pool_close_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
            pool_close_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&ShutdownSettings> for ShutdownConfig {
    fn from(settings: &ShutdownSettings) -> Self {
        Self {
            drain_timeout: Duration::from_secs(settings.drain_timeout_secs),
            ..Self::default()
        }
    }
}

/// Serves an app until shutdown, then drains and releases the pool.
pub struct GracefulShutdown {
    lifecycle: Lifecycle,
    pool: PostgresPool,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(lifecycle: Lifecycle, pool: PostgresPool, config: ShutdownConfig) -> Self {
        Self {
            lifecycle,
            pool,
            config,
        }
    }

    /// Serve `app` on `listener` until `signal` completes, then drain.
    ///
    /// The pool is closed only after the listener has been dropped, whether
    /// the drain finished, timed out, or the server failed.
    pub async fn run<F>(self, listener: TcpListener, app: Router, signal: F) -> ShutdownResult
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut result = ShutdownResult::default();
        let (draining_tx, draining_rx) = oneshot::channel::<()>();

        let lifecycle = self.lifecycle.clone();
        let shutdown = async move {
            signal.await;
            lifecycle.advance(LifecycleState::Draining);
            tracing::info!("Shutdown signal received, draining in-flight requests");
            let _ = draining_tx.send(());
        };

        let drain_timeout = self.config.drain_timeout;
        let drain_deadline = async move {
            match draining_rx.await {
                Ok(()) => tokio::time::sleep(drain_timeout).await,
                // Server finished without a signal
                Err(_) => std::future::pending::<()>().await,
            }
        };

        self.lifecycle.advance(LifecycleState::Serving);

        let server = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .into_future();

        let started = Instant::now();
        tokio::select! {
            served = server => match served {
                Ok(()) => {
                    result.drained = true;
                    tracing::info!("Server stopped accepting connections, all requests drained");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Server error");
                    result.server_error = Some(e);
                }
            },
            _ = drain_deadline => {
                tracing::warn!(
                    timeout_secs = drain_timeout.as_secs(),
                    "Drain timeout elapsed with requests still active, forcing shutdown"
                );
            }
        }

        // Draining can be skipped when the server fails before any signal
        self.lifecycle.advance(LifecycleState::Draining);
        result.pool_closed = self.close_pool().await;
        self.lifecycle.advance(LifecycleState::Stopped);
        result.duration = started.elapsed();

        tracing::info!(
            drained = result.drained,
            pool_closed = result.pool_closed,
            duration_ms = result.duration.as_millis(),
            "Shutdown complete"
        );

        result
    }

    async fn close_pool(&self) -> bool {
        match timeout(self.config.pool_close_timeout, self.pool.close()).await {
            Ok(closed) => closed,
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.config.pool_close_timeout.as_secs(),
                    "Timed out waiting for pooled connections to be released"
                );
                false
            }
        }
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether every in-flight request finished before the drain timeout
    pub drained: bool,
    /// Whether this shutdown closed the pool within its timeout
    pub pool_closed: bool,
    /// Listener failure that ended serving, if any
    pub server_error: Option<io::Error>,
    /// Time between the start of serving and the end of shutdown
    pub duration: Duration,
}

impl ShutdownResult {
    pub fn is_clean(&self) -> bool {
        self.drained && self.server_error.is_none()
    }
}

/// Wait for SIGTERM or SIGINT.
///
/// Returns the signal name that was received. A handler that cannot be
/// registered is logged and left pending so the other signal still works.
#[cfg(unix)]
pub async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    let interrupt = async {
        match signal(SignalKind::interrupt()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGINT handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
            "SIGTERM"
        }
        _ = interrupt => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
            "SIGINT"
        }
    }
}

/// Wait for Ctrl+C (non-unix platforms)
#[cfg(not(unix))]
pub async fn wait_for_signal() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to wait for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    "CTRL_C"
}
