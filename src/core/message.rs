//! Message data model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// Replication state of a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Inserted, no replica attempt has finished yet
    Pending,
    /// Replica file committed; `commit_ref` is set
    Synchronized,
    /// Last replica attempt failed; eligible for reconciliation
    Failed,
}

impl SyncStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synchronized => "synchronized",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = ChatError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "synchronized" => Ok(Self::Synchronized),
            "failed" => Ok(Self::Failed),
            other => Err(ChatError::Validation(format!(
                "unknown sync status: {other}"
            ))),
        }
    }
}

/// A chat message as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub content: String,
    pub sender: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sync_status: SyncStatus,
    pub commit_ref: Option<String>,
}

impl Message {
    #[must_use]
    pub const fn is_synchronized(&self) -> bool {
        matches!(self.sync_status, SyncStatus::Synchronized)
    }
}

/// Validated input for creating a message.
///
/// Validation happens once here; everything downstream trusts the fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawNewMessage")]
pub struct NewMessage {
    content: String,
    sender: String,
}

#[derive(Deserialize)]
struct RawNewMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    sender: Option<String>,
}

impl TryFrom<RawNewMessage> for NewMessage {
    type Error = ChatError;

    fn try_from(raw: RawNewMessage) -> Result<Self> {
        Self::new(
            raw.content.unwrap_or_default(),
            raw.sender.unwrap_or_default(),
        )
    }
}

impl NewMessage {
    pub fn new(content: impl Into<String>, sender: impl Into<String>) -> Result<Self> {
        let content = content.into();
        let sender = sender.into();
        if content.trim().is_empty() {
            return Err(ChatError::Validation(
                "content must not be empty".to_string(),
            ));
        }
        if sender.trim().is_empty() {
            return Err(ChatError::Validation("sender must not be empty".to_string()));
        }
        Ok(Self { content, sender })
    }

    /// Parse a JSON request body of the form `{"content": ..., "sender": ...}`.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let raw: RawNewMessage = serde_json::from_slice(body)
            .map_err(|err| ChatError::Validation(format!("invalid JSON body: {err}")))?;
        Self::try_from(raw)
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }
}

/// Current time truncated to microseconds, the precision the ledger stores.
#[must_use]
pub fn now_utc() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

/// Fixed-width RFC 3339 rendering used for both ledger columns and replica files.
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| ChatError::Validation(format!("invalid timestamp {raw}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_message_rejects_blank_fields() {
        assert!(matches!(
            NewMessage::new("   ", "alice"),
            Err(ChatError::Validation(_))
        ));
        assert!(matches!(
            NewMessage::new("hello", "\t"),
            Err(ChatError::Validation(_))
        ));
        let msg = NewMessage::new("  hello ", "alice").unwrap();
        assert_eq!(msg.content(), "  hello ");
    }

    #[test]
    fn new_message_from_json() {
        let msg = NewMessage::from_json(br#"{"content":"hi","sender":"bob"}"#).unwrap();
        assert_eq!(msg.sender(), "bob");

        let err = NewMessage::from_json(br#"{"content":"hi"}"#).unwrap_err();
        assert!(err.to_string().contains("sender"));

        let err = NewMessage::from_json(b"not json").unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn sync_status_round_trips_through_str() {
        for status in [
            SyncStatus::Pending,
            SyncStatus::Synchronized,
            SyncStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
        assert!("done".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn timestamps_survive_formatting() {
        let ts = now_utc();
        let rendered = format_timestamp(&ts);
        assert!(rendered.ends_with('Z'));
        assert_eq!(parse_timestamp(&rendered).unwrap(), ts);
    }
}
