//! Read-side facade over the ledger.

use std::sync::Arc;

use crate::core::message::Message;
use crate::error::Result;
use crate::storage::ledger::{DEFAULT_PAGE_SIZE, Ledger};

/// Largest page a single read may request.
pub const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone)]
pub struct QueryFacade {
    ledger: Arc<Ledger>,
}

impl QueryFacade {
    #[must_use]
    pub const fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    /// Newest messages first. `limit` defaults to 50 and is capped at
    /// [`MAX_PAGE_SIZE`]; non-positive limits are rejected by the ledger.
    pub fn recent(&self, limit: Option<i64>, before_id: Option<i64>) -> Result<Vec<Message>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
        self.ledger.list_recent(limit, before_id)
    }
}
