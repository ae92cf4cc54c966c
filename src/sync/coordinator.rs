//! Synchronization coordinator
//!
//! Owns the write path (ledger insert, replica write, status update) and the
//! reconciliation of rows whose replication never completed. The local insert
//! is the only step that can fail a `submit`; everything after it is absorbed
//! into the row's `sync_status`.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::SyncSettings;
use crate::core::message::{Message, NewMessage, now_utc};
use crate::error::{ChatError, Result};
use crate::storage::ledger::Ledger;
use crate::storage::replica::{PushOutcome, Replica};
use crate::sync::backoff::Backoff;
use crate::sync::scheduler::CancelToken;

/// What a single replica attempt did to a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Synchronized { commit_ref: String, push: PushOutcome },
    Failed { reason: String },
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub attempted: usize,
    pub advanced: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    /// A push-only retry went through.
    pub pushed: bool,
    /// Commits exist that the remote has not received yet.
    pub push_deferred: bool,
    /// Another pass held the lock; nothing was done.
    pub skipped: bool,
    pub cancelled: bool,
    pub duration_ms: u128,
}

impl ReconcileReport {
    /// True when the pass left nothing to retry.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.errors.is_empty() && !self.push_deferred && !self.cancelled
    }

    #[must_use]
    pub fn summary_line(&self) -> String {
        format!(
            "attempted {} advanced {} failed {} push {}",
            self.attempted,
            self.advanced,
            self.failed,
            if self.push_deferred {
                "deferred"
            } else if self.pushed {
                "retried"
            } else {
                "ok"
            }
        )
    }
}

pub struct SyncCoordinator {
    ledger: Arc<Ledger>,
    replica: Arc<dyn Replica>,
    settings: SyncSettings,
    pass_lock: Mutex<()>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("ledger", &self.ledger)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    pub fn new(ledger: Arc<Ledger>, replica: Arc<dyn Replica>, settings: SyncSettings) -> Self {
        Self {
            ledger,
            replica,
            settings,
            pass_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    #[must_use]
    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Validate, insert and attempt one replica write.
    pub fn submit(&self, content: &str, sender: &str) -> Result<Message> {
        let input = NewMessage::new(content, sender)?;
        self.submit_new(&input)
    }

    /// Insert an already validated message and attempt one replica write.
    ///
    /// Returns the row as stored after the attempt. Replica failures and
    /// timeouts leave it `failed`; only a ledger failure is an error.
    pub fn submit_new(&self, input: &NewMessage) -> Result<Message> {
        let inserted = self.ledger.insert_new(input)?;
        let id = inserted.id;

        match self.attempt_bounded(&inserted) {
            Ok(AttemptOutcome::Synchronized { commit_ref, push }) => {
                debug!(id, commit_ref, ?push, "submit synchronized");
            }
            Ok(AttemptOutcome::Failed { reason }) => {
                debug!(id, reason, "submit left message unsynchronized");
            }
            Err(err) => {
                error!(id, error = %err, "failed to record sync outcome");
            }
        }

        Ok(self.ledger.get(id)?.unwrap_or(inserted))
    }

    fn attempt_bounded(&self, message: &Message) -> Result<AttemptOutcome> {
        let timeout = self.settings.submit_timeout;
        if timeout.is_zero() {
            return record_attempt(&self.ledger, self.replica.as_ref(), message);
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        let ledger = Arc::clone(&self.ledger);
        let replica = Arc::clone(&self.replica);
        let owned = message.clone();
        let spawned = thread::Builder::new()
            .name(format!("chatsync-submit-{}", message.id))
            .spawn(move || {
                let outcome = record_attempt(&ledger, replica.as_ref(), &owned);
                let _ = tx.send(outcome);
            });
        if let Err(err) = spawned {
            warn!(error = %err, "could not spawn submit worker, attempting inline");
            return record_attempt(&self.ledger, self.replica.as_ref(), message);
        }

        match rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                let reason = ChatError::Timeout(format!("replica write exceeded {timeout:?}"))
                    .to_string();
                warn!(id = message.id, ?timeout, "replica attempt timed out");
                self.ledger
                    .mark_failed_with_reason(message.id, now_utc(), Some(&reason))?;
                Ok(AttemptOutcome::Failed { reason })
            }
            Err(RecvTimeoutError::Disconnected) => {
                let reason = "replica worker exited without reporting".to_string();
                error!(id = message.id, "{reason}");
                self.ledger
                    .mark_failed_with_reason(message.id, now_utc(), Some(&reason))?;
                Ok(AttemptOutcome::Failed { reason })
            }
        }
    }

    /// Retry every pending or failed row once; returns how many advanced.
    pub fn reconcile(&self) -> Result<usize> {
        Ok(self.reconcile_pass(None)?.advanced)
    }

    /// One reconciliation pass over a snapshot of unsynchronized rows,
    /// followed by a push-only retry if the remote is behind.
    ///
    /// Only one pass runs at a time; a concurrent call returns a skipped
    /// report immediately.
    pub fn reconcile_pass(&self, cancel: Option<&CancelToken>) -> Result<ReconcileReport> {
        let Some(_pass) = self.pass_lock.try_lock() else {
            debug!("reconcile pass already running");
            return Ok(ReconcileReport {
                skipped: true,
                ..ReconcileReport::default()
            });
        };

        let start = Instant::now();
        let mut report = ReconcileReport::default();
        let pending = self.ledger.list_pending()?;
        let mut backoff = Backoff::from_settings(&self.settings);
        let mut delay = Duration::ZERO;

        for message in &pending {
            if !delay.is_zero() && wait_or_cancelled(cancel, delay) {
                report.cancelled = true;
                break;
            }
            if cancel.is_some_and(CancelToken::is_cancelled) {
                report.cancelled = true;
                break;
            }

            report.attempted += 1;
            match record_attempt(&self.ledger, self.replica.as_ref(), message) {
                Ok(AttemptOutcome::Synchronized { push, .. }) => {
                    report.advanced += 1;
                    if push.is_deferred() {
                        report.push_deferred = true;
                    }
                    backoff.reset();
                    delay = Duration::ZERO;
                }
                Ok(AttemptOutcome::Failed { .. }) => {
                    report.failed += 1;
                    delay = backoff.next_delay();
                }
                Err(err) => {
                    error!(id = message.id, error = %err, "reconcile could not record outcome");
                    report.errors.push(format!("message {}: {err}", message.id));
                    delay = backoff.next_delay();
                }
            }
        }

        if !report.cancelled {
            self.retry_push(&mut report);
        }

        report.duration_ms = start.elapsed().as_millis();
        if report.attempted > 0 || report.pushed || !report.is_clean() {
            info!(
                attempted = report.attempted,
                advanced = report.advanced,
                failed = report.failed,
                pushed = report.pushed,
                push_deferred = report.push_deferred,
                duration_ms = report.duration_ms,
                "reconcile pass finished"
            );
        }
        Ok(report)
    }

    /// Push without committing when the remote is missing the branch tip.
    ///
    /// A write that deferred during this pass always forces a push attempt;
    /// only a successful push clears `push_deferred`.
    fn retry_push(&self, report: &mut ReconcileReport) {
        if !report.push_deferred {
            match self.replica.tip_is_pushed() {
                Ok(true) => return,
                Ok(false) => {}
                Err(err) => {
                    warn!(error = %err, "could not determine push state");
                    report.errors.push(format!("push state: {err}"));
                    return;
                }
            }
        }

        match self.replica.push() {
            Ok(PushOutcome::Pushed) => {
                info!("push-only retry succeeded");
                report.pushed = true;
                report.push_deferred = false;
            }
            Ok(PushOutcome::Deferred { reason }) => {
                debug!(reason, "push still deferred");
                report.push_deferred = true;
            }
            Ok(PushOutcome::Disabled) => {}
            Err(err) => {
                warn!(error = %err, "push-only retry failed");
                report.push_deferred = true;
                report.errors.push(format!("push: {err}"));
            }
        }
    }
}

/// One replica write followed by the matching ledger update.
fn record_attempt(
    ledger: &Ledger,
    replica: &dyn Replica,
    message: &Message,
) -> Result<AttemptOutcome> {
    match replica.write(message) {
        Ok(receipt) => {
            ledger.mark_synchronized(message.id, &receipt.commit_ref, now_utc())?;
            Ok(AttemptOutcome::Synchronized {
                commit_ref: receipt.commit_ref,
                push: receipt.push,
            })
        }
        Err(err) if err.is_replica_failure() => {
            let reason = err.to_string();
            ledger.mark_failed_with_reason(message.id, now_utc(), Some(&reason))?;
            Ok(AttemptOutcome::Failed { reason })
        }
        Err(err) => Err(err),
    }
}

fn wait_or_cancelled(cancel: Option<&CancelToken>, delay: Duration) -> bool {
    match cancel {
        Some(token) => token.wait(delay),
        None => {
            thread::sleep(delay);
            false
        }
    }
}
