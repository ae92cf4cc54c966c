use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chatsync::config::{ReplicaConfig, SyncSettings};
use chatsync::core::Message;
use chatsync::storage::{GitReplica, Ledger, PushOutcome, Replica, ReplicaReceipt};
use chatsync::sync::{QueryFacade, SyncCoordinator};
use chatsync::{ChatError, Result};
use git2::Repository;
use tempfile::TempDir;

/// Git replica that can be made unreachable for writes.
pub struct FlakyReplica {
    inner: Arc<GitReplica>,
    offline: AtomicBool,
}

impl FlakyReplica {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

impl Replica for FlakyReplica {
    fn write(&self, message: &Message) -> Result<ReplicaReceipt> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ChatError::ReplicaWrite("replica target unreachable".to_string()));
        }
        self.inner.write(message)
    }

    fn is_pushed(&self, commit_ref: &str) -> Result<bool> {
        self.inner.is_pushed(commit_ref)
    }

    fn tip_is_pushed(&self) -> Result<bool> {
        self.inner.tip_is_pushed()
    }

    fn push(&self) -> Result<PushOutcome> {
        self.inner.push()
    }
}

pub struct TestFixture {
    pub dir: TempDir,
    pub remote: PathBuf,
    pub ledger: Arc<Ledger>,
    pub git: Arc<GitReplica>,
    pub replica: Arc<FlakyReplica>,
    pub coordinator: Arc<SyncCoordinator>,
    pub queries: QueryFacade,
}

pub fn fast_settings() -> SyncSettings {
    SyncSettings {
        submit_timeout: Duration::from_secs(30),
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(10),
        backoff_jitter: 0.0,
        ..SyncSettings::default()
    }
}

impl TestFixture {
    /// Fixture whose remote is a bare repository that already exists.
    pub fn with_remote() -> Self {
        let fixture = Self::build(true);
        Repository::init_bare(&fixture.remote).unwrap();
        fixture
    }

    /// Fixture whose remote path does not exist yet, so every push defers.
    pub fn with_missing_remote() -> Self {
        Self::build(true)
    }

    /// Fixture with no remote configured.
    pub fn local_only() -> Self {
        Self::build(false)
    }

    fn build(remote: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let remote_path = dir.path().join("remote.git");
        let config = ReplicaConfig {
            remote_url: remote.then(|| remote_path.to_string_lossy().to_string()),
            branch: Some("main".to_string()),
            ..ReplicaConfig::default()
        };

        let ledger = Arc::new(Ledger::open(dir.path().join("database/messages.db")).unwrap());
        let git = Arc::new(GitReplica::open(dir.path().join("replica"), config).unwrap());
        let replica = Arc::new(FlakyReplica {
            inner: Arc::clone(&git),
            offline: AtomicBool::new(false),
        });
        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::clone(&ledger),
            replica.clone(),
            fast_settings(),
        ));
        let queries = QueryFacade::new(Arc::clone(&ledger));

        Self {
            dir,
            remote: remote_path,
            ledger,
            git,
            replica,
            coordinator,
            queries,
        }
    }

    pub fn replica_root(&self) -> &Path {
        self.git.root()
    }

    pub fn remote_head(&self) -> Option<String> {
        let bare = Repository::open_bare(&self.remote).ok()?;
        bare.refname_to_id("refs/heads/main")
            .ok()
            .map(|oid| oid.to_string())
    }

    pub fn message(&self, id: i64) -> Message {
        self.ledger.get(id).unwrap().unwrap()
    }
}
