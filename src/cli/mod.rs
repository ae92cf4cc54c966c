//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod commands;
pub mod output;

/// Chat messages in SQLite, replicated to a git repository.
#[derive(Parser, Debug)]
#[command(name = "chatsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Emit JSON on stdout and JSON logs on stderr
    #[arg(long, global = true)]
    pub robot: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress logging
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file path (default: <root>/config.toml and ~/.config/chatsync/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding the database and replica
    #[arg(long, global = true, env = "CHATSYNC_ROOT", default_value = ".chatsync")]
    pub root: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database and replica repository
    Init(commands::init::InitArgs),

    /// Submit a message
    Post(commands::post::PostArgs),

    /// Show recent messages, newest first
    List(commands::list::ListArgs),

    /// Retry synchronization of pending and failed messages
    Reconcile(commands::reconcile::ReconcileArgs),

    /// Show sync counts, schema version and replica state
    Status(commands::status::StatusArgs),

    /// Run reconciliation in the background until interrupted
    Daemon(commands::daemon::DaemonArgs),
}
