//! Background reconciliation scheduler.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::{ChatError, Result};
use crate::sync::backoff::Backoff;
use crate::sync::coordinator::SyncCoordinator;

/// Idle interval grows to at most this multiple of the base interval.
const MAX_INTERVAL_FACTOR: u32 = 8;

/// Cloneable cancellation signal.
///
/// Cancelling drops the only sender, which wakes every clone blocked in
/// [`CancelToken::wait`].
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    sender: Arc<Mutex<Option<Sender<()>>>>,
    receiver: Receiver<()>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(0);
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            sender: Arc::new(Mutex::new(Some(sender))),
            receiver,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.sender.lock().take();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep for `timeout` unless cancelled first. Returns true if cancelled.
    #[must_use]
    pub fn wait(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        match self.receiver.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => self.is_cancelled(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }
}

/// Totals accumulated by a scheduler run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SchedulerStats {
    pub passes: u64,
    pub advanced: u64,
    pub failed_passes: u64,
}

/// Runs reconciliation passes on a dedicated thread until cancelled.
pub struct ReconcileScheduler {
    coordinator: Arc<SyncCoordinator>,
    interval: Duration,
}

impl ReconcileScheduler {
    #[must_use]
    pub fn new(coordinator: Arc<SyncCoordinator>) -> Self {
        let interval = coordinator.settings().reconcile_interval;
        Self {
            coordinator,
            interval,
        }
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Start the background thread. The first pass runs immediately.
    pub fn spawn(self) -> Result<SchedulerHandle> {
        let token = CancelToken::new();
        let worker_token = token.clone();
        let thread = thread::Builder::new()
            .name("chatsync-reconcile".to_string())
            .spawn(move || self.run(&worker_token))?;
        Ok(SchedulerHandle {
            token,
            thread: Some(thread),
        })
    }

    fn run(&self, token: &CancelToken) -> SchedulerStats {
        let interval = self.interval.max(Duration::from_millis(1));
        let mut idle = Backoff::new(
            interval,
            interval.saturating_mul(MAX_INTERVAL_FACTOR),
            self.coordinator.settings().backoff_jitter,
        );
        let mut stats = SchedulerStats::default();
        info!(?interval, "reconcile scheduler started");

        loop {
            if token.is_cancelled() {
                break;
            }

            let clean = match self.coordinator.reconcile_pass(Some(token)) {
                Ok(report) => {
                    debug!(summary = %report.summary_line(), "scheduled pass");
                    stats.passes += 1;
                    stats.advanced += report.advanced as u64;
                    report.skipped || report.is_clean()
                }
                Err(err) => {
                    error!(error = %err, "reconcile pass failed");
                    false
                }
            };

            let delay = if clean {
                idle.reset();
                interval
            } else {
                stats.failed_passes += 1;
                idle.next_delay()
            };
            debug!(?delay, clean, "next reconcile pass scheduled");

            if token.wait(delay) {
                break;
            }
        }

        info!(
            passes = stats.passes,
            advanced = stats.advanced,
            "reconcile scheduler stopped"
        );
        stats
    }
}

/// Handle to a running scheduler. Dropping it cancels and joins the thread.
pub struct SchedulerHandle {
    token: CancelToken,
    thread: Option<JoinHandle<SchedulerStats>>,
}

impl SchedulerHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel and wait for the current pass to finish.
    pub fn shutdown(mut self) -> Result<SchedulerStats> {
        self.token.cancel();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| ChatError::Config("reconcile scheduler thread panicked".to_string())),
            None => Ok(SchedulerStats::default()),
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
