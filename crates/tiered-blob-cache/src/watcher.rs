//! Background poller for the durable clear marker
//!
//! Independent processes that share one durable namespace have no other
//! channel to each other: raising the marker makes every instance's watcher
//! wipe its own RAM tier (and the namespace) on its next poll.

use crate::cache::Cache;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Handle to a running clear-marker poller.
///
/// The loop runs until [`ClearWatcher::shutdown`] is called. Dropping the
/// handle also stops it at its next wakeup.
pub struct ClearWatcher {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ClearWatcher {
    /// Start polling for `cache`.
    ///
    /// Returns `None` when the cache has no durable tier or polling is
    /// disabled in its configuration.
    pub fn spawn(cache: &Cache) -> Option<Self> {
        if !cache.has_durable() {
            return None;
        }
        let period = cache.clear_poll_interval()?;
        if period.is_zero() {
            return None;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(cache.clone(), period, shutdown_rx));
        info!(interval = ?period, "Clear watcher started");
        Some(Self {
            shutdown_tx,
            handle,
        })
    }

    /// Stop polling and wait for an in-progress cycle to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Clear watcher task ended abnormally");
        }
        info!("Clear watcher stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

async fn run(cache: Cache, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match cache.apply_clear_signal().await {
                    Ok(true) => info!("Cache cleared by durable clear signal"),
                    Ok(false) => debug!("No durable clear signal"),
                    Err(e) => warn!(error = %e, "Clear signal poll failed"),
                }
            }
            // Fires on shutdown and when the handle is dropped
            _ = shutdown_rx.changed() => break,
        }
    }
}
