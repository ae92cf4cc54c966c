//! Core message types

pub mod message;

pub use message::{Message, NewMessage, SyncStatus};
