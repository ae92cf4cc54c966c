//! Git-backed message replica
//!
//! One canonical file per synchronized message, committed to a local
//! repository and pushed to a remote on a best-effort basis. All access to the
//! working tree goes through a single lock held across stage, commit and push.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use git2::{
    Commit, Cred, ErrorCode, ObjectType, Oid, RemoteCallbacks, Repository, Signature, Sort,
};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{RemoteAuth, ReplicaConfig};
use crate::core::message::Message;
use crate::error::{ChatError, Result};
use crate::storage::canonical::{MESSAGES_DIR, render_message, replica_path, sender_slug};
use crate::storage::lock::ReplicaLock;

const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of the push half of a replica write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PushOutcome {
    /// The remote branch now contains the commit.
    Pushed,
    /// Commit exists locally but the push did not go through.
    Deferred { reason: String },
    /// No remote configured or pushing switched off.
    Disabled,
}

impl PushOutcome {
    #[must_use]
    pub const fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicaReceipt {
    pub commit_ref: String,
    pub path: PathBuf,
    /// False when an earlier attempt had already committed identical bytes.
    pub newly_committed: bool,
    pub push: PushOutcome,
}

/// Durable replica target used by the coordinator.
pub trait Replica: Send + Sync {
    /// Serialize, stage, commit and try to push a message.
    ///
    /// Errors mean no commit was produced; a failed push is reported through
    /// [`ReplicaReceipt::push`] instead.
    fn write(&self, message: &Message) -> Result<ReplicaReceipt>;

    /// Whether the remote branch is known to contain `commit_ref`.
    fn is_pushed(&self, commit_ref: &str) -> Result<bool>;

    /// Whether the remote branch contains the local branch tip, and with it
    /// every commit made so far.
    fn tip_is_pushed(&self) -> Result<bool>;

    /// Push the current branch without creating a commit.
    fn push(&self) -> Result<PushOutcome>;
}

/// Replica stored in a git repository.
pub struct GitReplica {
    repo: Mutex<Repository>,
    root: PathBuf,
    config: ReplicaConfig,
    lock_timeout: Duration,
}

impl std::fmt::Debug for GitReplica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitReplica")
            .field("root", &self.root)
            .field("remote_url", &self.config.remote_url)
            .finish_non_exhaustive()
    }
}

impl GitReplica {
    /// Open an existing repository or initialize a new one.
    pub fn open(path: impl AsRef<Path>, config: ReplicaConfig) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let repo = match Repository::open(&root) {
            Ok(repo) => repo,
            Err(_) => {
                info!(path = %root.display(), "initializing replica repository");
                Repository::init(&root)?
            }
        };

        ensure_structure(&root)?;
        if let Some(url) = config.remote_url.as_deref() {
            ensure_remote_url(&repo, &config.remote_name, url)?;
        }
        if let Some(branch) = config.branch.as_deref() {
            if repo.head().is_err_and(|err| err.code() == ErrorCode::UnbornBranch) {
                repo.set_head(&format!("refs/heads/{branch}"))?;
            }
        }

        Ok(Self {
            repo: Mutex::new(repo),
            root,
            config,
            lock_timeout: LOCK_TIMEOUT,
        })
    }

    /// How long a write or push waits for the in-process and on-disk locks.
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Clone `url` into `path` unless a repository already exists there.
    pub fn clone_from(url: &str, path: impl AsRef<Path>, config: ReplicaConfig) -> Result<Self> {
        let path = path.as_ref();
        let mut config = config;
        config.remote_url.get_or_insert_with(|| url.to_string());

        if path.join(".git").exists() {
            debug!(path = %path.display(), "replica already present, skipping clone");
            return Self::open(path, config);
        }

        let auth = resolve_auth(config.auth.as_ref())?;
        let mut fetch = git2::FetchOptions::new();
        fetch.remote_callbacks(build_callbacks(&auth));

        let mut builder = git2::build::RepoBuilder::new();
        builder.fetch_options(fetch);
        if let Some(branch) = config.branch.as_deref() {
            builder.branch(branch);
        }
        let remote_name = config.remote_name.clone();
        builder.remote_create(move |repo, _name, url| repo.remote(&remote_name, url));
        builder.clone(url, path)?;
        info!(url, path = %path.display(), "cloned replica repository");

        Self::open(path, config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock_repo(&self) -> Result<MutexGuard<'_, Repository>> {
        self.repo.try_lock_for(self.lock_timeout).ok_or_else(|| {
            ChatError::LockFailed(format!(
                "replica {} busy for {:?}",
                self.root.display(),
                self.lock_timeout
            ))
        })
    }

    /// Committed bytes of a message's replica file.
    ///
    /// Reads from the message's own `commit_ref` when it has one, otherwise
    /// from HEAD.
    pub fn read_replica(&self, message: &Message) -> Result<Option<Vec<u8>>> {
        if let Some(commit_ref) = message.commit_ref.as_deref() {
            return self.read_at(commit_ref, message);
        }
        let head = {
            let repo = self.lock_repo()?;
            head_oid(&repo)?
        };
        match head {
            Some(oid) => self.read_at(&oid.to_string(), message),
            None => Ok(None),
        }
    }

    /// Bytes of a message's replica file as recorded in `commit_ref`.
    pub fn read_at(&self, commit_ref: &str, message: &Message) -> Result<Option<Vec<u8>>> {
        let oid = parse_oid(commit_ref)?;
        let rel = replica_path(message.id, &message.sender);
        let repo = self.lock_repo()?;
        let commit = repo.find_commit(oid)?;
        let tree = commit.tree()?;
        match tree.get_path(&rel) {
            Ok(entry) => {
                let blob = repo.find_blob(entry.id())?;
                Ok(Some(blob.content().to_vec()))
            }
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Commit at the tip of the local branch.
    pub fn head_commit(&self) -> Result<Option<String>> {
        let repo = self.lock_repo()?;
        Ok(head_oid(&repo)?.map(|oid| oid.to_string()))
    }

    /// Number of commits reachable from HEAD.
    pub fn commit_count(&self) -> Result<usize> {
        let repo = self.lock_repo()?;
        let Some(head) = head_oid(&repo)? else {
            return Ok(0);
        };
        let mut revwalk = repo.revwalk()?;
        revwalk.push(head)?;
        Ok(revwalk.count())
    }

    fn commit_message(&self, message: &Message) -> Result<ReplicaReceipt> {
        let bytes = render_message(message)?;
        let rel = replica_path(message.id, &message.sender);
        let blob = Oid::hash_object(ObjectType::Blob, &bytes)?;

        let repo = self.lock_repo()?;
        let _guard = ReplicaLock::acquire_timeout(&self.root, self.lock_timeout)?;

        let (oid, newly_committed) = match head_entry(&repo, &rel)? {
            Some(existing) if existing == blob => {
                let oid = introducing_commit(&repo, &rel, blob)?.ok_or_else(|| {
                    ChatError::ReplicaWrite(format!(
                        "{} present in HEAD but no introducing commit found",
                        rel.display()
                    ))
                })?;
                debug!(id = message.id, commit = %oid, "replica already committed");
                (oid, false)
            }
            Some(_) => {
                return Err(ChatError::ReplicaWrite(format!(
                    "{} already committed with different content",
                    rel.display()
                )));
            }
            None => (self.stage_and_commit(&repo, message, &rel, &bytes)?, true),
        };

        let push = self.push_locked(&repo);
        Ok(ReplicaReceipt {
            commit_ref: oid.to_string(),
            path: rel,
            newly_committed,
            push,
        })
    }

    fn stage_and_commit(
        &self,
        repo: &Repository,
        message: &Message,
        rel: &Path,
        bytes: &[u8],
    ) -> Result<Oid> {
        let abs = self.root.join(rel);
        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&abs, bytes)?;

        // Another process may have committed through the same checkout.
        let mut index = repo.index()?;
        index.read(true)?;
        index.add_path(rel)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;

        let author = Signature::now(
            &signature_name(&message.sender),
            &format!("{}@{}", sender_slug(&message.sender), self.config.author_domain),
        )?;
        let committer = Signature::now(&self.config.committer_name, &self.config.committer_email)?;
        let summary = format!(
            "Add message {} from {}\n\nMessage-Id: {}\nSender: {}\n",
            message.id, message.sender, message.id, message.sender
        );

        let oid = commit_with_parents(repo, &author, &committer, &tree, &summary)?;
        info!(id = message.id, commit = %oid, path = %rel.display(), "committed replica file");
        Ok(oid)
    }

    fn push_locked(&self, repo: &Repository) -> PushOutcome {
        if !self.config.pushes() {
            return PushOutcome::Disabled;
        }
        match push_branch(repo, &self.config) {
            Ok(()) => PushOutcome::Pushed,
            Err(err) => {
                warn!(error = %err, "push deferred");
                PushOutcome::Deferred {
                    reason: err.to_string(),
                }
            }
        }
    }
}

impl Replica for GitReplica {
    fn write(&self, message: &Message) -> Result<ReplicaReceipt> {
        self.commit_message(message).map_err(|err| match err {
            ChatError::ReplicaWrite(_) => err,
            other => ChatError::ReplicaWrite(other.to_string()),
        })
    }

    fn is_pushed(&self, commit_ref: &str) -> Result<bool> {
        if !self.config.pushes() {
            return Ok(true);
        }
        let oid = parse_oid(commit_ref)?;
        let repo = self.lock_repo()?;
        if repo.find_commit(oid).is_err() {
            warn!(commit_ref, "commit not present in local replica");
            return Ok(false);
        }
        tracking_contains(&repo, &self.config, oid)
    }

    fn tip_is_pushed(&self) -> Result<bool> {
        if !self.config.pushes() {
            return Ok(true);
        }
        let repo = self.lock_repo()?;
        match head_oid(&repo)? {
            Some(tip) => tracking_contains(&repo, &self.config, tip),
            None => Ok(true),
        }
    }

    fn push(&self) -> Result<PushOutcome> {
        let repo = self.lock_repo()?;
        if head_oid(&repo)?.is_none() {
            return Ok(PushOutcome::Disabled);
        }
        let _guard = ReplicaLock::acquire_timeout(&self.root, self.lock_timeout)?;
        let outcome = self.push_locked(&repo);
        if outcome == PushOutcome::Pushed {
            info!("pushed replica branch");
        }
        Ok(outcome)
    }
}

fn ensure_structure(root: &Path) -> Result<()> {
    fs::create_dir_all(root.join(MESSAGES_DIR))?;
    let readme = root.join("README.md");
    if !readme.exists() {
        fs::write(
            &readme,
            "# chat archive\n\nOne JSON file per message under `messages/`.\n",
        )?;
    }
    Ok(())
}

fn ensure_remote_url(repo: &Repository, name: &str, url: &str) -> Result<()> {
    match repo.find_remote(name) {
        Ok(remote) => {
            if remote.url() != Some(url) {
                repo.remote_set_url(name, url)?;
            }
        }
        Err(_) => {
            repo.remote(name, url)?;
        }
    }
    Ok(())
}

/// Whether the remote-tracking ref for the configured branch reaches `oid`.
fn tracking_contains(repo: &Repository, config: &ReplicaConfig, oid: Oid) -> Result<bool> {
    let branch = resolve_branch_name(repo, config.branch.as_deref())?;
    let tracking = format!("refs/remotes/{}/{branch}", config.remote_name);
    let remote_head = match repo.refname_to_id(&tracking) {
        Ok(oid) => oid,
        Err(err) if err.code() == ErrorCode::NotFound => return Ok(false),
        Err(err) => return Err(err.into()),
    };
    if remote_head == oid {
        return Ok(true);
    }
    Ok(repo.graph_descendant_of(remote_head, oid)?)
}

fn head_oid(repo: &Repository) -> Result<Option<Oid>> {
    match repo.head() {
        Ok(head) => Ok(head.target()),
        Err(err) if err.code() == ErrorCode::UnbornBranch => Ok(None),
        Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Blob id of `rel` in the HEAD tree, if any.
fn head_entry(repo: &Repository, rel: &Path) -> Result<Option<Oid>> {
    let Some(head) = head_oid(repo)? else {
        return Ok(None);
    };
    let tree = repo.find_commit(head)?.tree()?;
    match tree.get_path(rel) {
        Ok(entry) => Ok(Some(entry.id())),
        Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Oldest commit in the unbroken run from HEAD whose tree holds `blob` at `rel`.
fn introducing_commit(repo: &Repository, rel: &Path, blob: Oid) -> Result<Option<Oid>> {
    let Some(head) = head_oid(repo)? else {
        return Ok(None);
    };
    let mut revwalk = repo.revwalk()?;
    revwalk.push(head)?;
    revwalk.set_sorting(Sort::TOPOLOGICAL)?;

    let mut found = None;
    for oid in revwalk {
        let oid = oid?;
        let tree = repo.find_commit(oid)?.tree()?;
        match tree.get_path(rel) {
            Ok(entry) if entry.id() == blob => found = Some(oid),
            Ok(_) => break,
            Err(err) if err.code() == ErrorCode::NotFound => break,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(found)
}

fn commit_with_parents(
    repo: &Repository,
    author: &Signature,
    committer: &Signature,
    tree: &git2::Tree<'_>,
    message: &str,
) -> Result<Oid> {
    let parents = match head_oid(repo)? {
        Some(oid) => vec![repo.find_commit(oid)?],
        None => Vec::new(),
    };

    let parent_refs: Vec<&Commit<'_>> = parents.iter().collect();
    let oid = repo.commit(Some("HEAD"), author, committer, message, tree, &parent_refs)?;
    Ok(oid)
}

fn push_branch(repo: &Repository, config: &ReplicaConfig) -> Result<()> {
    let auth = resolve_auth(config.auth.as_ref())?;
    let mut callbacks = build_callbacks(&auth);
    callbacks.push_update_reference(|refname, status| match status {
        Some(reason) => Err(git2::Error::from_str(&format!(
            "remote rejected {refname}: {reason}"
        ))),
        None => Ok(()),
    });

    let mut remote = repo.find_remote(&config.remote_name)?;
    let branch = resolve_branch_name(repo, config.branch.as_deref())?;
    let local_ref = format!("refs/heads/{branch}");
    let refspec = format!("{local_ref}:{local_ref}");

    let mut push_options = git2::PushOptions::new();
    push_options.remote_callbacks(callbacks);
    remote.push(&[refspec], Some(&mut push_options))?;

    let pushed = repo.refname_to_id(&local_ref)?;
    let tracking = format!("refs/remotes/{}/{branch}", config.remote_name);
    repo.reference(&tracking, pushed, true, "chatsync: push")?;
    Ok(())
}

fn resolve_branch_name(repo: &Repository, branch_override: Option<&str>) -> Result<String> {
    if let Some(branch) = branch_override {
        return Ok(branch.to_string());
    }
    let head = repo.head()?;
    Ok(head.shorthand().unwrap_or("main").to_string())
}

fn parse_oid(commit_ref: &str) -> Result<Oid> {
    Oid::from_str(commit_ref)
        .map_err(|err| ChatError::Validation(format!("invalid commit_ref {commit_ref}: {err}")))
}

/// Author name for a sender; git rejects angle brackets and newlines.
fn signature_name(sender: &str) -> String {
    let cleaned: String = sender
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '\n' | '\r'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        sender_slug(sender)
    } else {
        cleaned.to_string()
    }
}

#[derive(Debug, Clone)]
enum ResolvedAuth {
    Default,
    Token {
        token: String,
        username: Option<String>,
    },
    SshKey {
        key_path: PathBuf,
        public_key: Option<PathBuf>,
        passphrase: Option<String>,
    },
}

fn resolve_auth(auth: Option<&RemoteAuth>) -> Result<ResolvedAuth> {
    match auth {
        None => Ok(ResolvedAuth::Default),
        Some(RemoteAuth::Token {
            token_env,
            username,
        }) => {
            let token = std::env::var(token_env)
                .map_err(|_| ChatError::MissingConfig(format!("token env var {token_env}")))?;
            Ok(ResolvedAuth::Token {
                token,
                username: username.clone(),
            })
        }
        Some(RemoteAuth::SshKey {
            key_path,
            public_key,
            passphrase_env,
        }) => {
            let passphrase = match passphrase_env {
                Some(env) => Some(std::env::var(env).map_err(|_| {
                    ChatError::MissingConfig(format!("passphrase env var {env}"))
                })?),
                None => None,
            };
            Ok(ResolvedAuth::SshKey {
                key_path: key_path.clone(),
                public_key: public_key.clone(),
                passphrase,
            })
        }
    }
}

fn build_callbacks(auth: &ResolvedAuth) -> RemoteCallbacks<'static> {
    let auth = auth.clone();
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, _allowed| match &auth {
        ResolvedAuth::Default => Cred::default(),
        ResolvedAuth::Token { token, username } => {
            let user = username
                .as_deref()
                .or(username_from_url)
                .unwrap_or("x-access-token");
            Cred::userpass_plaintext(user, token)
        }
        ResolvedAuth::SshKey {
            key_path,
            public_key,
            passphrase,
        } => {
            let user = username_from_url.unwrap_or("git");
            Cred::ssh_key(
                user,
                public_key.as_deref(),
                key_path.as_path(),
                passphrase.as_deref(),
            )
        }
    });
    callbacks
}
