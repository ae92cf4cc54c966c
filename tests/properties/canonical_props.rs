use chrono::{DateTime, Utc};
use proptest::prelude::*;

use chatsync::core::{Message, NewMessage, SyncStatus};
use chatsync::storage::canonical::{ReplicaDocument, render_message, replica_path, sender_slug};

fn message(id: i64, sender: String, content: String, micros: i64) -> Message {
    let created_at = DateTime::<Utc>::from_timestamp_micros(micros).unwrap();
    Message {
        id,
        content,
        sender,
        created_at,
        updated_at: created_at,
        sync_status: SyncStatus::Pending,
        commit_ref: None,
    }
}

proptest! {
    #[test]
    fn render_depends_only_on_id_sender_created_at_content(
        id in 1i64..1_000_000,
        sender in "\\PC{1,40}",
        content in "\\PC{1,200}",
        micros in 0i64..4_000_000_000_000_000,
        commit in "[0-9a-f]{40}",
    ) {
        let pending = message(id, sender, content, micros);
        let mut synced = pending.clone();
        synced.sync_status = SyncStatus::Synchronized;
        synced.commit_ref = Some(commit);
        synced.updated_at = Utc::now();

        let a = render_message(&pending).unwrap();
        let b = render_message(&synced).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.last(), Some(&b'\n'));

        let doc = ReplicaDocument::parse(&a).unwrap();
        prop_assert_eq!(doc, ReplicaDocument::from_message(&pending));
    }

    #[test]
    fn replica_path_stays_inside_messages_dir(id in 1i64..i64::MAX, sender in "\\PC{0,80}") {
        let path = replica_path(id, &sender);
        let mut components = path.components();
        prop_assert_eq!(components.next().unwrap().as_os_str(), "messages");
        let file = components.next().unwrap().as_os_str().to_string_lossy().to_string();
        prop_assert!(components.next().is_none());
        prop_assert!(file.ends_with(".json"));
        prop_assert!(!file.contains('/'));
        prop_assert!(!file.contains(".."));
    }

    #[test]
    fn sender_slug_is_ascii_and_non_empty(sender in "\\PC{0,100}") {
        let slug = sender_slug(&sender);
        prop_assert!(!slug.is_empty());
        prop_assert!(slug.len() <= 48);
        prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_'));
    }

    #[test]
    fn blank_fields_never_validate(ws in "[ \\t\\n]{0,8}", other in "[a-z]{1,8}") {
        prop_assert!(NewMessage::new(ws.clone(), other.clone()).is_err());
        prop_assert!(NewMessage::new(other, ws).is_err());
    }
}
