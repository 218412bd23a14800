//! Fixed-interval tick source for the view refresh.
//!
//! Each tick spawns its own task and the loop moves on without waiting for
//! it, so a slow refresh never delays the next tick. Overlapping refreshes
//! are reconciled by the consumer (see `view_sync`).

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

struct ActiveLoop {
    /// Held while a tick is being fired; `false` once stopped.
    running: Arc<Mutex<bool>>,
    cancel_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct PollingScheduler {
    active: Mutex<Option<ActiveLoop>>,
    ticks: Arc<AtomicU64>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PollingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SchedulerState {
        if lock(&self.active).is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    /// Ticks fired since this scheduler was created.
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Start firing `on_tick` every `interval`, first tick one interval from
    /// now. A running loop is stopped and replaced. Must be called from within
    /// a tokio runtime.
    pub fn start<F, Fut>(&self, interval: Duration, on_tick: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut guard = lock(&self.active);
        if let Some(previous) = guard.take() {
            Self::shutdown(previous);
        }

        let running = Arc::new(Mutex::new(true));
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let ticks = self.ticks.clone();
        let running_for_loop = running.clone();

        let handle = tokio::spawn(async move {
            info!(
                interval_ms = interval.as_millis() as u64,
                "Polling loop started"
            );
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    changed = cancel_rx.changed() => {
                        if changed.is_err() || *cancel_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let still_running = lock(&running_for_loop);
                        if !*still_running {
                            break;
                        }
                        let n = ticks.fetch_add(1, Ordering::SeqCst) + 1;
                        debug!(tick = n, "poll tick");
                        tokio::spawn(on_tick());
                    }
                }
            }
            info!("Polling loop stopped");
        });

        *guard = Some(ActiveLoop {
            running,
            cancel_tx,
            handle,
        });
    }

    /// Stop ticking. Idempotent. No tick fires after this returns; work
    /// already spawned by earlier ticks is left to finish.
    pub fn stop(&self) {
        if let Some(active) = lock(&self.active).take() {
            Self::shutdown(active);
        }
    }

    fn shutdown(active: ActiveLoop) {
        *lock(&active.running) = false;
        let _ = active.cancel_tx.send(true);
        active.handle.abort();
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
