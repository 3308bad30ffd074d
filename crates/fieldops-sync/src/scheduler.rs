//! # Sync Scheduler
//!
//! Background task that decides *when* to sync. Every route ends in the same
//! `QueueFacade::start_sync`, so concurrent triggers coalesce onto one run.
//!
//! ## Trigger Routes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  connectivity ──(→ online)──┐                                           │
//! │                              │                                          │
//! │  poll interval ──(tick)──────┼──► run_sync() ──► start_sync().wait()   │
//! │                              │         │                                │
//! │  SchedulerHandle::trigger ───┤         ├── clean     → reset backoff   │
//! │                              │         └── failures  → retry_at =      │
//! │  backoff timer ──(retry_at)──┘                          now + backoff   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ticks are skipped while a backoff retry is pending. Coming back online
//! resets the backoff and syncs straight away.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use fieldops_core::{AbortReason, RunState};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::queue::QueueFacade;

/// Control handle for a spawned scheduler. Dropping it stops the task.
#[derive(Debug)]
pub struct SchedulerHandle {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Requests a sync now. Ignores any pending backoff.
    pub async fn trigger(&self) -> SyncResult<()> {
        self.trigger_tx
            .send(())
            .await
            .map_err(|_| SyncError::ShuttingDown)
    }

    /// Stops the scheduler and waits for it to exit. A run in progress is
    /// awaited to completion first, so this returns only once it is done.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

pub struct SyncScheduler {
    queue: QueueFacade,
    poll_interval: std::time::Duration,
    sync_on_reconnect: bool,
    backoff: ExponentialBackoff,
}

impl SyncScheduler {
    /// Spawns the scheduler on the current tokio runtime.
    ///
    /// Fails with `InvalidConfig` if the timing settings are unusable (a zero
    /// poll interval would panic the interval timer).
    pub fn spawn(queue: QueueFacade, config: &SyncConfig) -> SyncResult<SchedulerHandle> {
        config.validate()?;

        let scheduler = SyncScheduler {
            queue,
            poll_interval: config.poll_interval(),
            sync_on_reconnect: config.sync.sync_on_reconnect,
            backoff: create_backoff(config),
        };

        let (trigger_tx, trigger_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(scheduler.run(trigger_rx, shutdown_rx));

        Ok(SchedulerHandle {
            trigger_tx,
            shutdown_tx,
            task,
        })
    }

    async fn run(mut self, mut trigger_rx: mpsc::Receiver<()>, mut shutdown_rx: mpsc::Receiver<()>) {
        let mut connectivity = self.queue.connectivity().watch();
        let mut interval =
            tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut retry_at: Option<Instant> = None;

        info!(
            poll_secs = self.poll_interval.as_secs(),
            sync_on_reconnect = self.sync_on_reconnect,
            "Sync scheduler started"
        );

        loop {
            tokio::select! {
                Ok(()) = connectivity.changed() => {
                    let state = *connectivity.borrow_and_update();
                    if state.is_online() && self.sync_on_reconnect {
                        info!("Connectivity restored, syncing");
                        self.backoff.reset();
                        retry_at = self.run_sync().await;
                    }
                }

                _ = interval.tick() => {
                    if retry_at.is_some() {
                        debug!("Poll tick skipped, backoff pending");
                        continue;
                    }
                    retry_at = self.run_sync().await;
                }

                _ = tokio::time::sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    debug!("Backoff elapsed, retrying");
                    retry_at = self.run_sync().await;
                }

                Some(()) = trigger_rx.recv() => {
                    debug!("Manual sync requested");
                    retry_at = self.run_sync().await;
                }

                _ = shutdown_rx.recv() => {
                    info!("Sync scheduler received shutdown");
                    break;
                }
            }
        }

        info!("Sync scheduler stopped");
    }

    /// Runs (or joins) one sync and returns when the next automatic retry is
    /// due, if any.
    async fn run_sync(&mut self) -> Option<Instant> {
        let session = self.queue.start_sync().into_handle().wait().await;

        let retry = match &session.state {
            RunState::Completed => session.failed > session.dead_letter_count(),
            RunState::Aborted(AbortReason::StoreUnavailable(_)) => true,
            _ => false,
        };

        if !retry {
            if session.state == RunState::Completed {
                self.backoff.reset();
            }
            return None;
        }

        let delay = self.backoff.next_backoff()?;
        warn!(
            run_id = session.run_id,
            failed = session.failed,
            remaining = session.remaining,
            delay_ms = delay.as_millis() as u64,
            "Sync left failures behind, backing off"
        );
        Some(Instant::now() + delay)
    }
}

fn create_backoff(config: &SyncConfig) -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: config.initial_backoff(),
        initial_interval: config.initial_backoff(),
        max_interval: config.max_backoff(),
        multiplier: 2.0,
        max_elapsed_time: None,
        ..Default::default()
    }
}
