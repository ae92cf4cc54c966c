//! chatsync daemon - background reconciliation until Ctrl-C

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tracing::{info, warn};

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::error::Result;
use crate::sync::ReconcileScheduler;

#[derive(Args, Debug, Default)]
pub struct DaemonArgs {
    /// Pass interval, overriding sync.reconcile_interval (e.g. "15s")
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    pub interval: Option<Duration>,
}

pub fn run(ctx: &AppContext, args: &DaemonArgs) -> Result<()> {
    let mut scheduler = ReconcileScheduler::new(Arc::clone(&ctx.coordinator));
    if let Some(interval) = args.interval {
        scheduler = scheduler.with_interval(interval);
    }
    let handle = scheduler.spawn()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "signal handler failed, stopping");
        }
    });
    info!("shutdown requested");

    let stats = handle.shutdown()?;
    if ctx.robot_mode {
        return emit_json(&stats);
    }

    let mut layout = HumanLayout::new();
    layout
        .title("Daemon stopped")
        .kv("Passes", &stats.passes.to_string())
        .kv("Advanced", &stats.advanced.to_string())
        .kv("Failed passes", &stats.failed_passes.to_string());
    emit_human(layout);
    Ok(())
}
