//! Coordinated graceful shutdown
//!
//! The dead-letter sweep and every per-connection stream timer run on
//! child tokens of one controller; in-flight pipeline dispatches register
//! a guard so shutdown can drain them before the process exits.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 30;

/// Coordinates cancellation and draining across background work
pub struct ShutdownController {
    cancel_token: CancellationToken,
    shutdown_initiated: AtomicBool,
    active_dispatches: AtomicU32,
    drain_timeout: Duration,
}

impl ShutdownController {
    /// Create a controller with the default drain timeout
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_drain_timeout(Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS))
    }

    /// Create a controller with a custom drain timeout
    #[must_use]
    pub fn with_drain_timeout(drain_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            cancel_token: CancellationToken::new(),
            shutdown_initiated: AtomicBool::new(false),
            active_dispatches: AtomicU32::new(0),
            drain_timeout,
        })
    }

    /// Child token for a background component or stream connection
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// Whether shutdown has been initiated
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Register an in-flight dispatch; the guard decrements on drop
    pub fn register_dispatch(&self) -> DispatchGuard<'_> {
        self.active_dispatches.fetch_add(1, Ordering::SeqCst);
        DispatchGuard { controller: self }
    }

    /// Count of in-flight dispatches
    #[must_use]
    pub fn active_dispatches(&self) -> u32 {
        self.active_dispatches.load(Ordering::SeqCst)
    }

    /// Initiate shutdown: cancel all child tokens, then wait for in-flight
    /// dispatches to drain, up to the drain timeout. Idempotent.
    pub async fn shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("shutdown already initiated");
            return;
        }

        info!("shutting down");
        self.cancel_token.cancel();

        let drain_start = std::time::Instant::now();
        loop {
            let active = self.active_dispatches();
            if active == 0 {
                info!("all dispatches drained");
                break;
            }
            if drain_start.elapsed() >= self.drain_timeout {
                warn!(
                    active_dispatches = active,
                    timeout_secs = self.drain_timeout.as_secs(),
                    "drain timeout exceeded, exiting with dispatches in flight"
                );
                break;
            }
            debug!(active_dispatches = active, "waiting for dispatches to drain");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Tracks one in-flight dispatch; decrements the count when dropped
pub struct DispatchGuard<'a> {
    controller: &'a ShutdownController,
}

impl DispatchGuard<'_> {
    /// Whether shutdown was requested while this dispatch ran
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.controller.cancel_token.is_cancelled()
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.controller.active_dispatches.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Wait for Ctrl+C or SIGTERM
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
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
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C");
        }
        _ = terminate => {
            info!("received SIGTERM");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_cancels_child_tokens() {
        let controller = ShutdownController::new();
        let token = controller.token();
        assert!(!token.is_cancelled());
        assert!(!controller.is_shutting_down());

        controller.shutdown().await;

        assert!(token.is_cancelled());
        assert!(controller.is_shutting_down());
    }

    #[tokio::test]
    async fn test_dispatch_guards_track_in_flight_work() {
        let controller = ShutdownController::new();
        assert_eq!(controller.active_dispatches(), 0);
        {
            let _a = controller.register_dispatch();
            let _b = controller.register_dispatch();
            assert_eq!(controller.active_dispatches(), 2);
        }
        assert_eq!(controller.active_dispatches(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_drain() {
        let controller = ShutdownController::with_drain_timeout(Duration::from_secs(5));
        let worker = controller.clone();
        let handle = tokio::spawn(async move {
            let guard = worker.register_dispatch();
            tokio::time::sleep(Duration::from_millis(150)).await;
            drop(guard);
        });

        // Give the worker time to register
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.shutdown().await;
        assert_eq!(controller.active_dispatches(), 0);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_drain_timeout_does_not_hang() {
        let controller = ShutdownController::with_drain_timeout(Duration::from_millis(200));
        let _stuck = controller.register_dispatch();

        let start = std::time::Instant::now();
        controller.shutdown().await;
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(controller.active_dispatches(), 1);
    }

    #[tokio::test]
    async fn test_double_shutdown_is_idempotent() {
        let controller = ShutdownController::new();
        controller.shutdown().await;
        controller.shutdown().await;
        assert!(controller.is_shutting_down());
    }
}
