//! Command implementations

pub mod daemon;
pub mod init;
pub mod list;
pub mod post;
pub mod reconcile;
pub mod status;

use crate::app::AppContext;
use crate::cli::{Cli, Commands};
use crate::error::Result;

pub fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Init(args) => init::run_without_context(cli, args),
        Commands::Post(args) => with_context(cli, |ctx| post::run(ctx, args)),
        Commands::List(args) => with_context(cli, |ctx| list::run(ctx, args)),
        Commands::Reconcile(args) => with_context(cli, |ctx| reconcile::run(ctx, args)),
        Commands::Status(args) => with_context(cli, |ctx| status::run(ctx, args)),
        Commands::Daemon(args) => with_context(cli, |ctx| daemon::run(ctx, args)),
    }
}

fn with_context(cli: &Cli, run: impl FnOnce(&AppContext) -> Result<()>) -> Result<()> {
    let ctx = AppContext::from_cli(cli)?;
    run(&ctx)
}
