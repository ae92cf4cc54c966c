//! Synchronization between the ledger and the git replica.

pub mod backoff;
pub mod coordinator;
pub mod query;
pub mod scheduler;

pub use backoff::Backoff;
pub use coordinator::{AttemptOutcome, ReconcileReport, SyncCoordinator};
pub use query::{MAX_PAGE_SIZE, QueryFacade};
pub use scheduler::{CancelToken, ReconcileScheduler, SchedulerHandle, SchedulerStats};
