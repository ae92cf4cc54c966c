//! SQLite ledger of chat messages
//!
//! The ledger assigns message identity and is the source of truth for reads.
//! Writes go through a dedicated writer connection inside an immediate
//! transaction; reads use a separate connection so they see a consistent WAL
//! snapshot without waiting behind writers.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::message::{
    Message, NewMessage, SyncStatus, format_timestamp, now_utc, parse_timestamp,
};
use crate::error::{ChatError, Result};
use crate::storage::migrations;

pub const DEFAULT_PAGE_SIZE: i64 = 50;

const MESSAGE_COLUMNS: &str =
    "id, content, sender, created_at, updated_at, sync_status, commit_ref";

/// Local transactional store of message rows.
pub struct Ledger {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    schema_version: u32,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("schema_version", &self.schema_version)
            .finish_non_exhaustive()
    }
}

/// Row counts per sync status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub pending: u64,
    pub synchronized: u64,
    pub failed: u64,
}

impl SyncStats {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.pending + self.synchronized + self.failed
    }
}

/// Retry bookkeeping for a single row. Operator-facing only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncDiagnostics {
    pub id: i64,
    pub sync_status: SyncStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl Ledger {
    /// Open the ledger at the given path, running pending migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = Connection::open(path)?;
        Self::configure_pragmas(&writer)?;
        let found = migrations::current_version(&writer)?;
        if found < migrations::SCHEMA_VERSION {
            info!(
                from = found,
                to = migrations::SCHEMA_VERSION,
                "ledger schema out of date, migrating"
            );
        }
        let schema_version = migrations::run_migrations(&mut writer)?;

        let reader = Connection::open(path)?;
        Self::configure_pragmas(&reader)?;

        debug!(path = %path.display(), schema_version, "opened ledger");
        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            schema_version,
        })
    }

    /// Current schema version after migrations.
    #[must_use]
    pub const fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Insert a new pending message and return it with its assigned id.
    pub fn insert(&self, content: &str, sender: &str) -> Result<Message> {
        let input = NewMessage::new(content, sender)?;
        self.insert_new(&input)
    }

    /// Insert an already validated message.
    pub fn insert_new(&self, input: &NewMessage) -> Result<Message> {
        let now = now_utc();
        let stamp = format_timestamp(&now);

        let mut conn = self.writer.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO messages (content, sender, created_at, updated_at, sync_status, commit_ref)
             VALUES (?, ?, ?, ?, ?, NULL)",
            params![
                input.content(),
                input.sender(),
                stamp,
                stamp,
                SyncStatus::Pending.as_str()
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        debug!(id, sender = input.sender(), "inserted message");
        Ok(Message {
            id,
            content: input.content().to_string(),
            sender: input.sender().to_string(),
            created_at: now,
            updated_at: now,
            sync_status: SyncStatus::Pending,
            commit_ref: None,
        })
    }

    /// Fetch a single message by id.
    pub fn get(&self, id: i64) -> Result<Option<Message>> {
        let conn = self.reader.lock();
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?");
        let row = conn
            .query_row(&sql, [id], message_from_row)
            .optional()?;
        row.transpose()
    }

    /// Record a successful replica commit.
    ///
    /// Re-applying the same `commit_ref` is a no-op; a different one is a
    /// conflict because it would orphan the earlier replica commit.
    pub fn mark_synchronized(&self, id: i64, commit_ref: &str, at: DateTime<Utc>) -> Result<()> {
        if commit_ref.trim().is_empty() {
            return Err(ChatError::Validation(
                "commit_ref must not be empty".to_string(),
            ));
        }

        let mut conn = self.writer.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = current_state(&tx, id)?;
        match current {
            None => return Err(ChatError::NotFound(format!("message {id}"))),
            Some((SyncStatus::Synchronized, Some(existing))) => {
                if existing == commit_ref {
                    debug!(id, commit_ref, "message already synchronized");
                    return Ok(());
                }
                return Err(ChatError::Conflict(format!(
                    "message {id} already synchronized at {existing}, refusing {commit_ref}"
                )));
            }
            Some(_) => {}
        }

        tx.execute(
            "UPDATE messages
             SET sync_status = ?, commit_ref = ?, updated_at = ?,
                 sync_attempts = sync_attempts + 1, last_error = NULL
             WHERE id = ?",
            params![
                SyncStatus::Synchronized.as_str(),
                commit_ref,
                format_timestamp(&at),
                id
            ],
        )?;
        tx.commit()?;

        info!(id, commit_ref, "message synchronized");
        Ok(())
    }

    /// Record a failed replica attempt. Never downgrades a synchronized row.
    pub fn mark_failed(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        self.mark_failed_with_reason(id, at, None)
    }

    pub fn mark_failed_with_reason(
        &self,
        id: i64,
        at: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<()> {
        let mut conn = self.writer.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        match current_state(&tx, id)? {
            None => return Err(ChatError::NotFound(format!("message {id}"))),
            Some((SyncStatus::Synchronized, _)) => {
                debug!(id, "ignoring failure for synchronized message");
                return Ok(());
            }
            Some(_) => {}
        }

        tx.execute(
            "UPDATE messages
             SET sync_status = ?, updated_at = ?,
                 sync_attempts = sync_attempts + 1, last_error = ?
             WHERE id = ?",
            params![SyncStatus::Failed.as_str(), format_timestamp(&at), reason, id],
        )?;
        tx.commit()?;

        warn!(id, reason = reason.unwrap_or("unknown"), "message sync failed");
        Ok(())
    }

    /// Newest messages first, optionally only those with `id < before_id`.
    pub fn list_recent(&self, limit: i64, before_id: Option<i64>) -> Result<Vec<Message>> {
        if limit <= 0 {
            return Err(ChatError::Validation(format!(
                "limit must be positive, got {limit}"
            )));
        }

        let conn = self.reader.lock();
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE (?1 IS NULL OR id < ?1)
             ORDER BY id DESC LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![before_id, limit], message_from_row)?;
        collect_messages(rows)
    }

    /// All pending or failed rows, oldest first.
    pub fn list_pending(&self) -> Result<Vec<Message>> {
        let conn = self.reader.lock();
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE sync_status IN ('pending', 'failed')
             ORDER BY id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], message_from_row)?;
        collect_messages(rows)
    }

    pub fn count_by_status(&self) -> Result<SyncStats> {
        let conn = self.reader.lock();
        let mut stmt =
            conn.prepare("SELECT sync_status, COUNT(*) FROM messages GROUP BY sync_status")?;
        let mut rows = stmt.query([])?;
        let mut stats = SyncStats::default();
        while let Some(row) = rows.next()? {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            let count = count.max(0) as u64;
            match status.parse::<SyncStatus>()? {
                SyncStatus::Pending => stats.pending = count,
                SyncStatus::Synchronized => stats.synchronized = count,
                SyncStatus::Failed => stats.failed = count,
            }
        }
        Ok(stats)
    }

    pub fn sync_diagnostics(&self, id: i64) -> Result<Option<SyncDiagnostics>> {
        let conn = self.reader.lock();
        let row = conn
            .query_row(
                "SELECT id, sync_status, sync_attempts, last_error FROM messages WHERE id = ?",
                [id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, status, attempts, last_error)| {
            Ok(SyncDiagnostics {
                id,
                sync_status: status.parse()?,
                attempts: u32::try_from(attempts.max(0)).unwrap_or(u32::MAX),
                last_error,
            })
        })
        .transpose()
    }

    /// Run SQLite's integrity check.
    pub fn integrity_check(&self) -> Result<bool> {
        let conn = self.reader.lock();
        let result: String = conn.query_row("PRAGMA integrity_check;", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    fn configure_pragmas(conn: &Connection) -> Result<()> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(())
    }
}

fn current_state(conn: &Connection, id: i64) -> Result<Option<(SyncStatus, Option<String>)>> {
    let row = conn
        .query_row(
            "SELECT sync_status, commit_ref FROM messages WHERE id = ?",
            [id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
        )
        .optional()?;
    row.map(|(status, commit_ref)| Ok((status.parse()?, commit_ref)))
        .transpose()
}

struct MessageRow {
    id: i64,
    content: String,
    sender: String,
    created_at: String,
    updated_at: String,
    sync_status: String,
    commit_ref: Option<String>,
}

impl TryFrom<MessageRow> for Message {
    type Error = ChatError;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            content: row.content,
            sender: row.sender,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            sync_status: row.sync_status.parse()?,
            commit_ref: row.commit_ref,
        })
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Result<Message>> {
    let raw = MessageRow {
        id: row.get(0)?,
        content: row.get(1)?,
        sender: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        sync_status: row.get(5)?,
        commit_ref: row.get(6)?,
    };
    Ok(Message::try_from(raw))
}

fn collect_messages<I>(rows: I) -> Result<Vec<Message>>
where
    I: Iterator<Item = rusqlite::Result<Result<Message>>>,
{
    let mut results = Vec::new();
    for row in rows {
        results.push(row??);
    }
    Ok(results)
}
