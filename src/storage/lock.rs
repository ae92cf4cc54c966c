//! Cross-process lock on a replica working tree.
//!
//! A CLI `post` and a running daemon may share one replica checkout. The
//! in-process mutex in `GitReplica` does not cover that, so every stage,
//! commit and push also holds an advisory file lock inside `.git/`.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ChatError, Result};

const LOCK_FILENAME: &str = "chatsync.lock";
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Who holds the lock; written into the lock file for operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    pub hostname: String,
    pub acquired_at: DateTime<Utc>,
}

/// Exclusive advisory lock, released on drop.
pub struct ReplicaLock {
    file: File,
    path: PathBuf,
}

impl ReplicaLock {
    fn lock_path(replica_root: &Path) -> PathBuf {
        replica_root.join(".git").join(LOCK_FILENAME)
    }

    fn open_file(path: &Path) -> Result<File> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|err| ChatError::LockFailed(format!("open {}: {err}", path.display())))
    }

    /// Try once without blocking.
    pub fn try_acquire(replica_root: &Path) -> Result<Option<Self>> {
        let path = Self::lock_path(replica_root);
        let mut file = Self::open_file(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                debug!(path = %path.display(), "replica lock held elsewhere");
                return Ok(None);
            }
            Err(err) => {
                return Err(ChatError::LockFailed(format!(
                    "lock {}: {err}",
                    path.display()
                )));
            }
        }

        let holder = LockHolder {
            pid: std::process::id(),
            hostname: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string()),
            acquired_at: Utc::now(),
        };
        // Holder info is advisory; failing to record it does not void the lock.
        if let Ok(json) = serde_json::to_vec(&holder) {
            let _ = file.set_len(0);
            let _ = file.seek(SeekFrom::Start(0));
            let _ = file.write_all(&json);
        }

        Ok(Some(Self { file, path }))
    }

    /// Poll until the lock is free or `timeout` elapses.
    pub fn acquire_timeout(replica_root: &Path, timeout: Duration) -> Result<Self> {
        let start = Instant::now();
        loop {
            if let Some(lock) = Self::try_acquire(replica_root)? {
                return Ok(lock);
            }
            if start.elapsed() >= timeout {
                let holder = Self::holder(replica_root).ok().flatten();
                warn!(
                    waited = ?start.elapsed(),
                    holder_pid = holder.as_ref().map(|h| h.pid),
                    "timed out waiting for replica lock"
                );
                return Err(ChatError::LockFailed(format!(
                    "replica lock busy after {:?}",
                    start.elapsed()
                )));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Last recorded holder, if the file has one.
    pub fn holder(replica_root: &Path) -> Result<Option<LockHolder>> {
        let path = Self::lock_path(replica_root);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        Ok(serde_json::from_str(&content).ok())
    }
}

impl Drop for ReplicaLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            debug!(path = %self.path.display(), error = %err, "failed to release replica lock");
        }
    }
}
