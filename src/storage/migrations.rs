//! Ledger schema migrations

use rusqlite::Connection;
use tracing::info;

use crate::error::{ChatError, Result};

const MIGRATIONS: [&str; 2] = [
    include_str!("../../migrations/001_initial_schema.sql"),
    include_str!("../../migrations/002_add_sync_diagnostics.sql"),
];

pub const SCHEMA_VERSION: u32 = MIGRATIONS.len() as u32;

/// Schema revision recorded in the database file.
pub fn current_version(conn: &Connection) -> Result<u32> {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .map_err(|err| ChatError::Migration(err.to_string()))
}

/// Run all pending migrations, each in its own transaction.
pub fn run_migrations(conn: &mut Connection) -> Result<u32> {
    let current = current_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(ChatError::Migration(format!(
            "database schema version {current} is newer than supported version {SCHEMA_VERSION}"
        )));
    }

    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let target_version = (idx + 1) as u32;
        if current >= target_version {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql).map_err(|err| {
            ChatError::Migration(format!("migration {target_version} failed: {err}"))
        })?;
        tx.pragma_update(None, "user_version", target_version)
            .map_err(|err| {
                ChatError::Migration(format!(
                    "failed to set user_version {target_version}: {err}"
                ))
            })?;
        tx.commit()?;
        info!(version = target_version, "applied ledger migration");
    }

    Ok(SCHEMA_VERSION)
}
