//! Background tasks: the fixed-interval tick loop and the abortable
//! insight watcher.

use chrono::Utc;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::machine::SessionMachine;

/// Run `machine.tick` every `tick_interval_ms` until `shutdown` flips to true.
///
/// Late ticks are skipped rather than bursted.
pub fn spawn_tick_loop(machine: SessionMachine, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let period = Duration::from_millis(machine.config().tick_interval_ms.max(1));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_ms = period.as_millis() as u64, "Tick loop started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    machine.tick(Utc::now()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Tick loop stopped");
    })
}

/// Holds at most one in-flight insight task. Starting a new one aborts the
/// previous.
#[derive(Clone, Default)]
pub struct InsightWatcher {
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl InsightWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let next = tokio::spawn(task);
        if let Ok(mut slot) = self.handle.lock() {
            if let Some(stale) = slot.replace(next) {
                if !stale.is_finished() {
                    debug!("Aborting stale insight check");
                }
                stale.abort();
            }
        }
    }

    pub fn abort(&self) {
        if let Ok(mut slot) = self.handle.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }

    /// Whether a task is still running.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_new_check_aborts_stale_one() {
        let watcher = InsightWatcher::new();
        let completed = Arc::new(AtomicUsize::new(0));

        let c = completed.clone();
        watcher.start(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            c.fetch_add(1, Ordering::SeqCst);
        });

        let c = completed.clone();
        watcher.start(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            c.fetch_add(10, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 10);
        assert!(!watcher.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_cancels() {
        let watcher = InsightWatcher::new();
        let completed = Arc::new(AtomicUsize::new(0));
        let c = completed.clone();
        watcher.start(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            c.fetch_add(1, Ordering::SeqCst);
        });
        watcher.abort();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 0);
    }
}
