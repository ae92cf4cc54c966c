//! chatsync: a message ledger in SQLite with a git-backed replica.
//!
//! Every submitted message is committed to the ledger first and then written
//! as one canonical JSON file into a git repository, committed and pushed on a
//! best-effort basis. Replica failures never lose a message; they leave it
//! `pending` or `failed` until a reconciliation pass catches up.

pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod storage;
pub mod sync;

pub use error::{ChatError, Result};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
