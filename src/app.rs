//! Application context shared by CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::cli::Cli;
use crate::config::Config;
use crate::error::Result;
use crate::storage::{GitReplica, Ledger};
use crate::sync::{QueryFacade, SyncCoordinator};

pub struct AppContext {
    pub root: PathBuf,
    pub config_path: Option<PathBuf>,
    pub config: Config,
    pub robot_mode: bool,
    pub verbosity: u8,
    pub ledger: Arc<Ledger>,
    pub replica: Arc<GitReplica>,
    pub coordinator: Arc<SyncCoordinator>,
    pub queries: QueryFacade,
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config = Config::load(cli.config.as_deref(), &cli.root)?;
        Self::open(
            cli.root.clone(),
            cli.config.clone(),
            config,
            cli.robot,
            cli.verbose,
        )
    }

    /// Open the ledger and replica under `root` and wire the coordinator.
    pub fn open(
        root: PathBuf,
        config_path: Option<PathBuf>,
        config: Config,
        robot_mode: bool,
        verbosity: u8,
    ) -> Result<Self> {
        let ledger = Arc::new(Ledger::open(config.storage.db_path(&root))?);
        let replica = Arc::new(GitReplica::open(
            config.storage.replica_path(&root),
            config.replica.clone(),
        )?);
        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::clone(&ledger),
            replica.clone(),
            config.sync.clone(),
        ));
        let queries = QueryFacade::new(Arc::clone(&ledger));
        debug!(root = %root.display(), "application context ready");

        Ok(Self {
            root,
            config_path,
            config,
            robot_mode,
            verbosity,
            ledger,
            replica,
            coordinator,
            queries,
        })
    }
}
