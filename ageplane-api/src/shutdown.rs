//! Graceful shutdown handling
//!
//! Waits for SIGTERM/SIGINT and lets the HTTP server drain in-flight
//! requests before the process exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Shutdown coordinator for graceful termination
#[derive(Clone)]
pub struct ShutdownCoordinator {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    /// Flag indicating shutdown has started
    is_shutting_down: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            shutdown_tx,
            shutdown_rx,
            is_shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a receiver for shutdown signals
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Check if shutdown is in progress
    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }

    /// Initiate graceful shutdown
    pub fn shutdown(&self) {
        if self.is_shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Initiating graceful shutdown...");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for a termination signal from the OS, then trigger shutdown
    pub async fn wait_for_signal(&self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(mut sigterm), Ok(mut sigint)) => {
                    tokio::select! {
                        _ = sigterm.recv() => info!("Received SIGTERM"),
                        _ = sigint.recv() => info!("Received SIGINT"),
                    }
                }
                _ => {
                    warn!("Failed to register signal handlers, falling back to Ctrl+C");
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Failed to listen for Ctrl+C: {}", e);
                        return;
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                return;
            }
            info!("Received Ctrl+C");
        }

        self.shutdown();
    }

    /// Future that resolves once shutdown has been requested
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Future for `axum::serve(..).with_graceful_shutdown`
    pub fn signal(self) -> impl std::future::Future<Output = ()> + Send + 'static {
        async move {
            let waiter = self.clone();
            tokio::select! {
                _ = self.wait_for_signal() => {}
                _ = waiter.wait() => {}
            }
            info!("Shutdown signal received, draining connections");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
