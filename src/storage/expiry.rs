//! Eviction Sweeper
//!
//! This module implements a background task that periodically asks the active
//! backend to drop expired entries. This is "active expiry", as opposed to the
//! "lazy expiry" `get` performs on access.
//!
//! ## Purpose
//!
//! Lazy expiry alone is correct but leaks: a conversation that is never
//! looked up again would stay on disk (or in memory) forever. The sweeper
//! bounds that growth. It is purely a reclamation optimization; correctness
//! of expiry never depends on it.
//!
//! ## Design
//!
//! Each iteration of the task:
//! 1. Sleeps for the configured interval
//! 2. Runs one backend sweep on the blocking pool (the durable sweep does
//!    file I/O and takes per-key locks)
//! 3. Logs what was reclaimed
//!
//! Locks are only ever held for one entry's check-and-delete, never across a
//! whole pass, and never across the sleep.

use crate::storage::Backend;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

/// How often the sweeper wakes up.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Pause between passes (default: 60s)
    pub interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Owns the background eviction task.
///
/// Dropping the handle signals the task to exit.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Flipped to `true` to request exit
    shutdown_tx: watch::Sender<bool>,
    /// The sweeper task, taken by `shutdown`
    handle: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Spawns the eviction task for `backend` on the current Tokio runtime.
    ///
    /// The first pass runs one `interval` after start.
    pub fn start(backend: Arc<Backend>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let interval = config.interval;
        let handle = tokio::spawn(sweeper_loop(backend, config, shutdown_rx));

        info!(interval_secs = interval.as_secs(), "Eviction sweeper started");

        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Signals the sweeper to stop.
    ///
    /// This is called automatically when the handle is dropped. A pass that
    /// is already running finishes first.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stops the sweeper and waits for the task to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Expiry sweeper task failed");
            }
        }
        info!("Eviction sweeper stopped");
    }

    /// Returns true once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|handle| handle.is_finished())
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleeps, sweeps, repeats until told to stop.
async fn sweeper_loop(
    backend: Arc<Backend>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Eviction sweeper exiting");
                    return;
                }
            }
        }

        let target = Arc::clone(&backend);
        match tokio::task::spawn_blocking(move || target.sweep_expired()).await {
            Ok(Ok(0)) => trace!("Sweep found nothing to reclaim"),
            Ok(Ok(removed)) => debug!(removed = removed, "Expired entries cleaned up"),
            Ok(Err(e)) => error!(error = %e, "Expiry sweep failed"),
            Err(e) => error!(error = %e, "Expiry sweep panicked"),
        }
    }
}
