//! chatsync init - create the database and replica repository

use std::fs;
use std::path::Path;

use clap::Args;
use tracing::info;

use crate::cli::Cli;
use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::storage::{GitReplica, Ledger};

#[derive(Args, Debug, Default)]
pub struct InitArgs {
    /// Clone the replica from an existing remote instead of starting empty
    #[arg(long, value_name = "URL")]
    pub clone: Option<String>,

    /// Remote the replica pushes to, written into the generated config
    #[arg(long, value_name = "URL", conflicts_with = "clone")]
    pub remote: Option<String>,

    /// Branch to commit and push on
    #[arg(long)]
    pub branch: Option<String>,
}

/// Runs before an `AppContext` exists, since it creates what the context opens.
pub fn run_without_context(cli: &Cli, args: &InitArgs) -> Result<()> {
    let root = cli.root.as_path();
    fs::create_dir_all(root)?;

    let config_file = root.join("config.toml");
    let wrote_config = if cli.config.is_none() && !config_file.exists() {
        write_starter_config(&config_file, args)?;
        true
    } else {
        false
    };

    let config = Config::load(cli.config.as_deref(), root)?;
    let db_path = config.storage.db_path(root);
    let replica_path = config.storage.replica_path(root);

    let ledger = Ledger::open(&db_path)?;
    let replica = match args.clone.as_deref() {
        Some(url) => GitReplica::clone_from(url, &replica_path, config.replica.clone())?,
        None => GitReplica::open(&replica_path, config.replica.clone())?,
    };
    let commits = replica.commit_count()?;
    info!(root = %root.display(), "initialized chatsync");

    if cli.robot {
        return emit_json(&serde_json::json!({
            "status": "ok",
            "root": root.display().to_string(),
            "config": wrote_config.then(|| config_file.display().to_string()),
            "database": db_path.display().to_string(),
            "schema_version": ledger.schema_version(),
            "replica": replica_path.display().to_string(),
            "replica_commits": commits,
            "remote_url": config.replica.remote_url,
        }));
    }

    let mut layout = HumanLayout::new();
    layout
        .title("Initialized chatsync")
        .kv("Root", &root.display().to_string())
        .kv("Database", &db_path.display().to_string())
        .kv("Schema", &ledger.schema_version().to_string())
        .kv("Replica", &replica_path.display().to_string())
        .kv("Commits", &commits.to_string())
        .kv(
            "Remote",
            config.replica.remote_url.as_deref().unwrap_or("(none)"),
        );
    if wrote_config {
        layout.kv("Config", &config_file.display().to_string());
    }
    emit_human(layout);
    Ok(())
}

fn write_starter_config(path: &Path, args: &InitArgs) -> Result<()> {
    let mut config = Config::default();
    config.replica.remote_url = args.remote.clone().or_else(|| args.clone.clone());
    config.replica.branch = args.branch.clone();

    let body = toml::to_string_pretty(&config)
        .map_err(|err| ChatError::Config(format!("render config: {err}")))?;
    fs::write(path, body)?;
    Ok(())
}
