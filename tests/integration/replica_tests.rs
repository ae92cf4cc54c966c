use chatsync::config::ReplicaConfig;
use chatsync::storage::{GitReplica, PushOutcome, Replica, ReplicaDocument, replica_path};
use git2::Repository;
use tempfile::TempDir;

use crate::fixture::TestFixture;

#[test]
fn replica_files_parse_back_to_message_fields() {
    let fx = TestFixture::local_only();
    let msg = fx
        .coordinator
        .submit("line one\nline \"two\"", "Eve <eve@example.com>")
        .unwrap();

    let bytes = fx.git.read_replica(&msg).unwrap().unwrap();
    let doc = ReplicaDocument::parse(&bytes).unwrap();
    assert_eq!(doc.id, msg.id);
    assert_eq!(doc.sender, msg.sender);
    assert_eq!(doc.content, msg.content);
}

#[test]
fn commit_records_sender_and_id() {
    let fx = TestFixture::local_only();
    let msg = fx.coordinator.submit("audit me", "frank").unwrap();

    let repo = Repository::open(fx.replica_root()).unwrap();
    let commit = repo
        .find_commit(git2::Oid::from_str(msg.commit_ref.as_deref().unwrap()).unwrap())
        .unwrap();
    assert_eq!(commit.author().name(), Some("frank"));
    assert!(commit.message().unwrap().starts_with("Add message 1 from frank"));
}

#[test]
fn fresh_clone_sees_pushed_history() {
    let fx = TestFixture::with_remote();
    for i in 0..3 {
        fx.coordinator.submit(&format!("m{i}"), "grace").unwrap();
    }

    let target = TempDir::new().unwrap();
    let clone = GitReplica::clone_from(
        &fx.remote.to_string_lossy(),
        target.path().join("replica"),
        ReplicaConfig {
            branch: Some("main".to_string()),
            ..ReplicaConfig::default()
        },
    )
    .unwrap();
    assert_eq!(clone.commit_count().unwrap(), 3);

    let latest = fx.message(3);
    assert!(clone.is_pushed(latest.commit_ref.as_deref().unwrap()).unwrap());
}

#[test]
fn push_without_remote_is_disabled() {
    let fx = TestFixture::local_only();
    fx.coordinator.submit("local", "heidi").unwrap();
    assert_eq!(fx.replica.push().unwrap(), PushOutcome::Disabled);
    assert!(fx.replica.is_pushed("0000000000000000000000000000000000000001").unwrap());
}

#[test]
fn second_handle_on_same_checkout_keeps_all_files() {
    let fx = TestFixture::local_only();
    let other = GitReplica::open(
        fx.replica_root(),
        ReplicaConfig {
            branch: Some("main".to_string()),
            ..ReplicaConfig::default()
        },
    )
    .unwrap();

    let messages: Vec<_> = (0..3)
        .map(|i| fx.ledger.insert(&format!("m{i}"), "alice").unwrap())
        .collect();
    fx.git.write(&messages[0]).unwrap();
    other.write(&messages[1]).unwrap();
    let last = fx.git.write(&messages[2]).unwrap();

    let repo = Repository::open(fx.replica_root()).unwrap();
    let head = repo.head().unwrap().peel_to_commit().unwrap();
    assert_eq!(head.id().to_string(), last.commit_ref);
    let tree = head.tree().unwrap();
    for message in &messages {
        let rel = replica_path(message.id, &message.sender);
        assert!(tree.get_path(&rel).is_ok(), "{} missing from HEAD", rel.display());
    }
    assert_eq!(fx.git.commit_count().unwrap(), 3);
    assert_eq!(other.commit_count().unwrap(), 3);
}
