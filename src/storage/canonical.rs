//! Canonical replica file format
//!
//! A replica file is a pretty-printed JSON object with a fixed key order and
//! a trailing newline. Rendering the same message twice yields identical
//! bytes, so a retried write never produces a spurious diff.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::message::{Message, format_timestamp};
use crate::error::{ChatError, Result};

/// Directory inside the replica repository holding message files.
pub const MESSAGES_DIR: &str = "messages";

const MAX_SLUG_LEN: usize = 48;

/// On-disk shape of a replica file. Field order is part of the format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaDocument {
    pub id: i64,
    pub sender: String,
    pub created_at: String,
    pub content: String,
}

impl ReplicaDocument {
    #[must_use]
    pub fn from_message(message: &Message) -> Self {
        Self {
            id: message.id,
            sender: message.sender.clone(),
            created_at: format_timestamp(&message.created_at),
            content: message.content.clone(),
        }
    }

    pub fn render(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|err| ChatError::ReplicaWrite(format!("unreadable replica file: {err}")))
    }
}

/// Render the canonical bytes for a message.
pub fn render_message(message: &Message) -> Result<Vec<u8>> {
    ReplicaDocument::from_message(message).render()
}

/// Repository-relative path of a message's replica file.
///
/// Derived only from `id` and `sender`; the zero-padded id keeps directory
/// listings in insertion order.
#[must_use]
pub fn replica_path(id: i64, sender: &str) -> PathBuf {
    PathBuf::from(MESSAGES_DIR).join(format!("{id:010}_{}.json", sender_slug(sender)))
}

/// Filesystem-safe rendering of a sender identity.
#[must_use]
pub fn sender_slug(sender: &str) -> String {
    let mut slug: String = sender
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .take(MAX_SLUG_LEN)
        .collect();
    if slug.chars().all(|c| c == '_') {
        slug = "anonymous".to_string();
    }
    slug
}
