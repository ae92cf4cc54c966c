//! Storage layer for chatsync
//!
//! Dual persistence: the SQLite ledger is the source of truth for reads,
//! the git replica is the durable audit copy.

pub mod canonical;
pub mod ledger;
pub mod lock;
pub mod migrations;
pub mod replica;

pub use canonical::{ReplicaDocument, render_message, replica_path};
pub use ledger::{Ledger, SyncDiagnostics, SyncStats};
pub use lock::{LockHolder, ReplicaLock};
pub use replica::{GitReplica, PushOutcome, Replica, ReplicaReceipt};
