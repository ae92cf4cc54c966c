//! chatsync status - sync counts and replica state

use clap::Args;
use serde::Serialize;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::error::{ChatError, Result};
use crate::storage::{LockHolder, ReplicaLock, SyncDiagnostics, SyncStats};
use crate::storage::replica::Replica;

#[derive(Args, Debug, Default)]
pub struct StatusArgs {
    /// Show retry diagnostics for one message
    #[arg(long, value_name = "ID")]
    pub id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    schema_version: u32,
    integrity_ok: bool,
    messages: SyncStats,
    replica_commits: usize,
    remote_url: Option<String>,
    latest_commit: Option<String>,
    latest_pushed: Option<bool>,
    lock_holder: Option<LockHolder>,
}

pub fn run(ctx: &AppContext, args: &StatusArgs) -> Result<()> {
    if let Some(id) = args.id {
        return diagnostics(ctx, id);
    }

    let latest_commit = ctx.replica.head_commit()?;
    let latest_pushed = match latest_commit {
        Some(_) if ctx.config.replica.pushes() => Some(ctx.replica.tip_is_pushed()?),
        _ => None,
    };

    let report = StatusReport {
        schema_version: ctx.ledger.schema_version(),
        integrity_ok: ctx.ledger.integrity_check()?,
        messages: ctx.ledger.count_by_status()?,
        replica_commits: ctx.replica.commit_count()?,
        remote_url: ctx.config.replica.remote_url.clone(),
        latest_commit,
        latest_pushed,
        lock_holder: ReplicaLock::holder(ctx.replica.root())?,
    };

    if ctx.robot_mode {
        return emit_json(&report);
    }

    let mut layout = HumanLayout::new();
    layout
        .title("chatsync status")
        .section("Ledger")
        .kv("Schema", &report.schema_version.to_string())
        .kv("Integrity", if report.integrity_ok { "ok" } else { "FAILED" })
        .kv("Synchronized", &report.messages.synchronized.to_string())
        .kv("Pending", &report.messages.pending.to_string())
        .kv("Failed", &report.messages.failed.to_string())
        .blank()
        .section("Replica")
        .kv("Path", &ctx.replica.root().display().to_string())
        .kv("Commits", &report.replica_commits.to_string())
        .kv("Remote", report.remote_url.as_deref().unwrap_or("(none)"))
        .kv("Latest commit", report.latest_commit.as_deref().unwrap_or("-"))
        .kv(
            "Pushed",
            match report.latest_pushed {
                Some(true) => "yes",
                Some(false) => "no (push deferred)",
                None => "-",
            },
        );
    emit_human(layout);
    Ok(())
}

fn diagnostics(ctx: &AppContext, id: i64) -> Result<()> {
    let diag: SyncDiagnostics = ctx
        .ledger
        .sync_diagnostics(id)?
        .ok_or_else(|| ChatError::NotFound(format!("message {id}")))?;

    if ctx.robot_mode {
        return emit_json(&diag);
    }

    let mut layout = HumanLayout::new();
    layout
        .title(&format!("Message {id}"))
        .kv("Status", diag.sync_status.as_str())
        .kv("Attempts", &diag.attempts.to_string())
        .kv("Last error", diag.last_error.as_deref().unwrap_or("-"));
    emit_human(layout);
    Ok(())
}
