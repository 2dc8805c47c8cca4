//! Periodic sweeps for in-memory stores.
//!
//! A [`SweepTask`] owns a background tokio task that calls [`Sweep::sweep`]
//! on a fixed interval. The task holds only a `Weak` reference, so it never
//! keeps its store alive, and it exits on its own once the store is dropped.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time;

use crate::observability::metrics;

/// A store with expiring entries.
pub trait Sweep: Send + Sync + 'static {
    /// Label for logs and metrics.
    fn store_name(&self) -> &'static str;

    /// Remove entries expired at `now`, returning how many were removed.
    fn sweep(&self, now: Instant) -> usize;
}

/// Handle to a running sweep. Dropping it aborts the task.
pub struct SweepTask {
    name: &'static str,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SweepTask {
    /// Spawn a sweep for `store` on the current tokio runtime.
    pub fn spawn<T: Sweep>(store: &Arc<T>, interval: Duration) -> Self {
        let name = store.store_name();
        let weak: Weak<T> = Arc::downgrade(store);
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            // First tick fires immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(store) = weak.upgrade() else {
                            tracing::debug!(store = name, "Store dropped, sweep exiting");
                            break;
                        };
                        let removed = store.sweep(Instant::now());
                        if removed > 0 {
                            tracing::debug!(store = name, removed, "Swept expired entries");
                            metrics::record_sweep(name, removed);
                        }
                    }
                    _ = &mut stop_rx => {
                        tracing::debug!(store = name, "Sweep stopped");
                        break;
                    }
                }
            }
        });

        tracing::info!(store = name, interval_ms = interval.as_millis() as u64, "Sweep started");

        Self {
            name,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Signal the sweep to stop and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::error!(store = self.name, error = %e, "Sweep task failed");
                }
            }
        }
    }
}

impl Drop for SweepTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    impl Sweep for Counting {
        fn store_name(&self) -> &'static str {
            "counting"
        }

        fn sweep(&self, _now: Instant) -> usize {
            self.calls.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    #[tokio::test]
    async fn test_sweep_runs_and_stops() {
        let store = Arc::new(Counting { calls: AtomicUsize::new(0) });
        let task = SweepTask::spawn(&store, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(80)).await;
        task.stop().await;

        let seen = store.calls.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected several sweeps, saw {seen}");
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.calls.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_sweep_does_not_keep_store_alive() {
        let store = Arc::new(Counting { calls: AtomicUsize::new(0) });
        let task = SweepTask::spawn(&store, Duration::from_millis(10));
        let weak = Arc::downgrade(&store);
        drop(store);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(weak.upgrade().is_none());
        assert!(task.is_finished());
    }
}
