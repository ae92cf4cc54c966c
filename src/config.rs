use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub replica: ReplicaConfig,
    #[serde(default)]
    pub sync: SyncSettings,
}

impl Config {
    /// Resolve configuration: defaults, then global and project files (or an
    /// explicit file), then environment overrides.
    pub fn load(explicit_path: Option<&Path>, root: &Path) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("CHATSYNC_CONFIG").ok().map(PathBuf::from));

        if let Some(path) = explicit {
            let patch = Self::load_patch(&path)?
                .ok_or_else(|| ChatError::Config(format!("config not found: {}", path.display())))?;
            config.merge_patch(patch);
        } else {
            if let Some(global) = Self::load_global()? {
                config.merge_patch(global);
            }
            if let Some(project) = Self::load_patch(&root.join("config.toml"))? {
                config.merge_patch(project);
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    fn load_global() -> Result<Option<ConfigPatch>> {
        let Some(base) = dirs::config_dir() else {
            return Ok(None);
        };
        Self::load_patch(&base.join("chatsync/config.toml"))
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| ChatError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| ChatError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.storage {
            self.storage.merge(patch);
        }
        if let Some(patch) = patch.replica {
            self.replica.merge(patch);
        }
        if let Some(patch) = patch.sync {
            self.sync.merge(patch);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = env_string("CHATSYNC_DB_PATH") {
            self.storage.db_path = Some(PathBuf::from(value));
        }
        if let Some(value) = env_string("CHATSYNC_REPLICA_PATH") {
            self.storage.replica_path = Some(PathBuf::from(value));
        }

        if let Some(value) = env_string("CHATSYNC_REMOTE_URL") {
            self.replica.remote_url = if value.is_empty() { None } else { Some(value) };
        }
        if let Some(value) = env_string("CHATSYNC_BRANCH") {
            self.replica.branch = Some(value);
        }
        if let Some(value) = env_bool("CHATSYNC_PUSH") {
            self.replica.push = value;
        }

        if let Some(value) = env_duration("CHATSYNC_SUBMIT_TIMEOUT")? {
            self.sync.submit_timeout = value;
        }
        if let Some(value) = env_duration("CHATSYNC_RECONCILE_INTERVAL")? {
            self.sync.reconcile_interval = value;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.sync.reconcile_interval.is_zero() {
            return Err(ChatError::Config(
                "sync.reconcile_interval must be greater than zero".to_string(),
            ));
        }
        if self.sync.backoff_base > self.sync.backoff_max {
            return Err(ChatError::Config(
                "sync.backoff_base must not exceed sync.backoff_max".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.sync.backoff_jitter) {
            return Err(ChatError::Config(
                "sync.backoff_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.replica.remote_name.trim().is_empty() {
            return Err(ChatError::Config(
                "replica.remote_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub replica_path: Option<PathBuf>,
}

impl StorageConfig {
    #[must_use]
    pub fn db_path(&self, root: &Path) -> PathBuf {
        resolve_under(root, self.db_path.as_deref(), "database/messages.db")
    }

    #[must_use]
    pub fn replica_path(&self, root: &Path) -> PathBuf {
        resolve_under(root, self.replica_path.as_deref(), "replica")
    }

    fn merge(&mut self, patch: StoragePatch) {
        if let Some(value) = patch.db_path {
            self.db_path = Some(value);
        }
        if let Some(value) = patch.replica_path {
            self.replica_path = Some(value);
        }
    }
}

/// Credentials for the replica remote. Secrets are only ever read from the
/// environment variables named here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum RemoteAuth {
    SshKey {
        key_path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        public_key: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        passphrase_env: Option<String>,
    },
    Token {
        token_env: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaConfig {
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default = "default_remote_name")]
    pub remote_name: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default = "default_true")]
    pub push: bool,
    #[serde(default = "default_committer_name")]
    pub committer_name: String,
    #[serde(default = "default_committer_email")]
    pub committer_email: String,
    #[serde(default = "default_author_domain")]
    pub author_domain: String,
    #[serde(default)]
    pub auth: Option<RemoteAuth>,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            remote_name: default_remote_name(),
            branch: None,
            push: true,
            committer_name: default_committer_name(),
            committer_email: default_committer_email(),
            author_domain: default_author_domain(),
            auth: None,
        }
    }
}

impl ReplicaConfig {
    /// True when a remote is configured and pushing is enabled.
    #[must_use]
    pub const fn pushes(&self) -> bool {
        self.push && self.remote_url.is_some()
    }

    fn merge(&mut self, patch: ReplicaPatch) {
        if let Some(value) = patch.remote_url {
            self.remote_url = Some(value);
        }
        if let Some(value) = patch.remote_name {
            self.remote_name = value;
        }
        if let Some(value) = patch.branch {
            self.branch = Some(value);
        }
        if let Some(value) = patch.push {
            self.push = value;
        }
        if let Some(value) = patch.committer_name {
            self.committer_name = value;
        }
        if let Some(value) = patch.committer_email {
            self.committer_email = value;
        }
        if let Some(value) = patch.author_domain {
            self.author_domain = value;
        }
        if let Some(value) = patch.auth {
            self.auth = Some(value);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Bound on the replica attempt made inside `submit`. Zero runs the
    /// attempt inline on the caller's thread.
    #[serde(default = "default_submit_timeout", with = "humantime_serde")]
    pub submit_timeout: Duration,
    #[serde(default = "default_reconcile_interval", with = "humantime_serde")]
    pub reconcile_interval: Duration,
    #[serde(default = "default_backoff_base", with = "humantime_serde")]
    pub backoff_base: Duration,
    #[serde(default = "default_backoff_max", with = "humantime_serde")]
    pub backoff_max: Duration,
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            submit_timeout: default_submit_timeout(),
            reconcile_interval: default_reconcile_interval(),
            backoff_base: default_backoff_base(),
            backoff_max: default_backoff_max(),
            backoff_jitter: default_backoff_jitter(),
        }
    }
}

impl SyncSettings {
    fn merge(&mut self, patch: SyncPatch) {
        if let Some(value) = patch.submit_timeout {
            self.submit_timeout = value;
        }
        if let Some(value) = patch.reconcile_interval {
            self.reconcile_interval = value;
        }
        if let Some(value) = patch.backoff_base {
            self.backoff_base = value;
        }
        if let Some(value) = patch.backoff_max {
            self.backoff_max = value;
        }
        if let Some(value) = patch.backoff_jitter {
            self.backoff_jitter = value;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub storage: Option<StoragePatch>,
    pub replica: Option<ReplicaPatch>,
    pub sync: Option<SyncPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StoragePatch {
    pub db_path: Option<PathBuf>,
    pub replica_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ReplicaPatch {
    pub remote_url: Option<String>,
    pub remote_name: Option<String>,
    pub branch: Option<String>,
    pub push: Option<bool>,
    pub committer_name: Option<String>,
    pub committer_email: Option<String>,
    pub author_domain: Option<String>,
    pub auth: Option<RemoteAuth>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SyncPatch {
    #[serde(default, with = "humantime_serde")]
    pub submit_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub reconcile_interval: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub backoff_base: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub backoff_max: Option<Duration>,
    pub backoff_jitter: Option<f64>,
}

fn resolve_under(root: &Path, configured: Option<&Path>, default: &str) -> PathBuf {
    match configured {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => root.join(path),
        None => root.join(default),
    }
}

fn default_true() -> bool {
    true
}

fn default_remote_name() -> String {
    "origin".to_string()
}

fn default_committer_name() -> String {
    "chatsync".to_string()
}

fn default_committer_email() -> String {
    "chatsync@localhost".to_string()
}

fn default_author_domain() -> String {
    "users.chatsync.local".to_string()
}

const fn default_submit_timeout() -> Duration {
    Duration::from_secs(10)
}

const fn default_reconcile_interval() -> Duration {
    Duration::from_secs(30)
}

const fn default_backoff_base() -> Duration {
    Duration::from_millis(250)
}

const fn default_backoff_max() -> Duration {
    Duration::from_secs(30)
}

const fn default_backoff_jitter() -> f64 {
    0.1
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|value| {
        matches!(
            value.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_duration(key: &str) -> Result<Option<Duration>> {
    match std::env::var(key) {
        Ok(value) => humantime_serde::re::humantime::parse_duration(&value)
            .map(Some)
            .map_err(|err| ChatError::Config(format!("invalid {key} value {value}: {err}"))),
        Err(_) => Ok(None),
    }
}
