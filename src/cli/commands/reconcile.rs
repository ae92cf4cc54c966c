//! chatsync reconcile - one synchronization pass

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::error::Result;

#[derive(Args, Debug, Default)]
pub struct ReconcileArgs {}

pub fn run(ctx: &AppContext, _args: &ReconcileArgs) -> Result<()> {
    let report = ctx.coordinator.reconcile_pass(None)?;

    if ctx.robot_mode {
        return emit_json(&report);
    }

    let mut layout = HumanLayout::new();
    layout
        .title("Reconcile")
        .kv("Attempted", &report.attempted.to_string())
        .kv("Advanced", &report.advanced.to_string())
        .kv("Failed", &report.failed.to_string())
        .kv(
            "Push",
            if report.push_deferred {
                "deferred"
            } else if report.pushed {
                "retried"
            } else {
                "up to date"
            },
        )
        .kv("Duration (ms)", &report.duration_ms.to_string());
    for err in &report.errors {
        layout.bullet(err);
    }
    emit_human(layout);
    Ok(())
}
