//! Background reaping of expired window entries.
//!
//! The reaper wakes on a fixed interval, snapshots the store's keys and
//! removes eligible entries in bounded batches, re-checking each entry under
//! its shard lock. The shutdown signal is checked between batches.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::key::ThrottleKey;
use super::registry::CategoryRegistry;
use super::store::CounterStore;

/// Periodic cleaner for the counter store.
pub struct Reaper {
    store: Arc<CounterStore>,
    registry: Arc<CategoryRegistry>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    batch_size: usize,
}

impl Reaper {
    /// Create a reaper over the given store.
    pub fn new(
        store: Arc<CounterStore>,
        registry: Arc<CategoryRegistry>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            registry,
            clock,
            interval,
            batch_size: batch_size.max(1),
        }
    }

    /// Run one full sweep and return the number of entries removed.
    pub fn sweep(&self) -> usize {
        self.store
            .keys()
            .chunks(self.batch_size)
            .map(|batch| self.reap_batch(batch))
            .sum()
    }

    /// Spawn the reaper loop on the current tokio runtime.
    pub fn spawn(self) -> ReaperHandle {
        let (signal, shutdown) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown));
        ReaperHandle { signal, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        info!(
            interval_secs = self.interval.as_secs_f64(),
            batch_size = self.batch_size,
            "Reaper started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let reaped = self.sweep_cancellable(&shutdown).await;
                    debug!(
                        reaped = reaped,
                        remaining = self.store.len(),
                        "Reaper sweep completed"
                    );
                }
            }
        }

        info!("Reaper stopped");
    }

    async fn sweep_cancellable(&self, shutdown: &watch::Receiver<bool>) -> usize {
        let keys = self.store.keys();
        let mut reaped = 0;

        for batch in keys.chunks(self.batch_size) {
            if *shutdown.borrow() {
                debug!(reaped = reaped, "Reaper sweep interrupted by shutdown");
                break;
            }
            reaped += self.reap_batch(batch);
            tokio::task::yield_now().await;
        }

        reaped
    }

    fn reap_batch(&self, batch: &[ThrottleKey]) -> usize {
        let now = self.clock.now();
        batch
            .iter()
            .filter(|key| match self.registry.get_policy(key.category) {
                Ok(policy) => self.store.reap_if(key, |entry| entry.is_reapable(policy, now)),
                Err(_) => false,
            })
            .count()
    }
}

/// Handle to a running reaper task.
pub struct ReaperHandle {
    signal: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signal the reaper to stop and wait up to `timeout` for it to finish.
    ///
    /// The task is aborted if it does not finish in time. Returns once the
    /// outcome is known either way.
    pub async fn shutdown(mut self, timeout: Duration) {
        let _ = self.signal.send(true);

        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(())) => debug!("Reaper joined"),
            Ok(Err(e)) => warn!(error = %e, "Reaper task ended abnormally"),
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs_f64(),
                    "Reaper did not stop in time, aborting"
                );
                self.task.abort();
            }
        }
    }
}
