use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Replica write failed: {0}")]
    ReplicaWrite(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing required config: {0}")]
    MissingConfig(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Lock failed: {0}")]
    LockFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl ChatError {
    /// Failures of the replica path. The coordinator absorbs these into a
    /// `failed` sync status instead of failing the caller.
    #[must_use]
    pub const fn is_replica_failure(&self) -> bool {
        matches!(
            self,
            Self::ReplicaWrite(_) | Self::Git(_) | Self::Timeout(_) | Self::LockFailed(_)
        )
    }

    /// HTTP status the transport layer should answer with.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let err = ChatError::Validation("content must not be empty".to_string());
        assert_eq!(err.http_status(), 400);
        assert!(!err.is_replica_failure());
    }

    #[test]
    fn unexpected_failures_map_to_server_error() {
        let err = ChatError::Io(io::Error::other("disk gone"));
        assert_eq!(err.http_status(), 500);
        let err = ChatError::Migration("migration 2 failed".to_string());
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn replica_failures_are_classified() {
        assert!(ChatError::ReplicaWrite("index locked".to_string()).is_replica_failure());
        assert!(ChatError::Git(git2::Error::from_str("boom")).is_replica_failure());
        assert!(ChatError::LockFailed("busy".to_string()).is_replica_failure());
        assert!(!ChatError::Conflict("x".to_string()).is_replica_failure());
    }
}
