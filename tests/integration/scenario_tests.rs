use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::thread;

use chatsync::core::SyncStatus;
use chatsync::storage::{Replica, render_message};

use crate::fixture::TestFixture;

#[test]
fn unreachable_then_restored_replica_converges() {
    let fx = TestFixture::with_remote();

    fx.replica.set_offline(true);
    let first = fx.coordinator.submit("one", "alice").unwrap();
    let second = fx.coordinator.submit("two", "alice").unwrap();
    fx.replica.set_offline(false);
    let third = fx.coordinator.submit("three", "alice").unwrap();

    assert_eq!((first.id, second.id, third.id), (1, 2, 3));
    assert_eq!(first.sync_status, SyncStatus::Failed);
    assert_eq!(second.sync_status, SyncStatus::Failed);
    assert_eq!(third.sync_status, SyncStatus::Synchronized);
    assert!(first.commit_ref.is_none());

    let ids: Vec<i64> = fx
        .queries
        .recent(Some(10), None)
        .unwrap()
        .iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ids, vec![3, 2, 1]);

    assert_eq!(fx.coordinator.reconcile().unwrap(), 2);

    let one = fx.message(1);
    let two = fx.message(2);
    assert!(one.is_synchronized() && two.is_synchronized());
    let refs: HashSet<_> = [&one, &two, &fx.message(3)]
        .iter()
        .map(|m| m.commit_ref.clone().unwrap())
        .collect();
    assert_eq!(refs.len(), 3);

    for message in [&one, &two] {
        let bytes = fx.git.read_replica(message).unwrap().unwrap();
        assert_eq!(bytes, render_message(message).unwrap());
    }

    let ids: Vec<i64> = fx
        .queries
        .recent(Some(10), None)
        .unwrap()
        .iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ids, vec![3, 2, 1]);
    assert_eq!(fx.coordinator.reconcile().unwrap(), 0);
}

#[test]
fn concurrent_submits_with_same_sender_never_share_an_id() {
    let fx = TestFixture::local_only();
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let coordinator = Arc::clone(&fx.coordinator);
            thread::spawn(move || {
                (0..5)
                    .map(|i| coordinator.submit(&format!("t{t} m{i}"), "alice").unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let messages: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    let ids: HashSet<i64> = messages.iter().map(|m| m.id).collect();
    assert_eq!(ids.len(), 20);
    assert!(messages.iter().all(|m| m.is_synchronized()));
    assert_eq!(fx.git.commit_count().unwrap(), 20);
    assert_eq!(fx.ledger.count_by_status().unwrap().synchronized, 20);
}

#[test]
fn failed_push_is_retried_without_a_second_commit() {
    let fx = TestFixture::with_missing_remote();

    let msg = fx.coordinator.submit("hello", "alice").unwrap();
    assert_eq!(msg.sync_status, SyncStatus::Synchronized);
    let commit_ref = msg.commit_ref.clone().unwrap();
    assert!(!fx.replica.is_pushed(&commit_ref).unwrap());
    assert_eq!(fx.git.commit_count().unwrap(), 1);

    let report = fx.coordinator.reconcile_pass(None).unwrap();
    assert_eq!(report.advanced, 0);
    assert!(report.push_deferred);
    assert_eq!(fx.git.commit_count().unwrap(), 1);

    git2::Repository::init_bare(&fx.remote).unwrap();
    let report = fx.coordinator.reconcile_pass(None).unwrap();
    assert!(report.pushed);
    assert_eq!(report.attempted, 0);
    assert_eq!(fx.git.commit_count().unwrap(), 1);
    assert_eq!(fx.remote_head().as_deref(), Some(commit_ref.as_str()));
    assert_eq!(fx.message(msg.id).commit_ref.as_deref(), Some(commit_ref.as_str()));
}

#[test]
fn reconcile_reuses_commit_made_before_a_crash() {
    let fx = TestFixture::with_remote();
    let pending = fx.ledger.insert("crashed mid-write", "bob").unwrap();

    // Commit landed but the ledger never heard about it.
    let receipt = fx.git.write(&pending).unwrap();
    assert!(receipt.newly_committed);

    assert_eq!(fx.coordinator.reconcile().unwrap(), 1);
    let synced = fx.message(pending.id);
    assert_eq!(synced.commit_ref.as_deref(), Some(receipt.commit_ref.as_str()));
    assert_eq!(fx.git.commit_count().unwrap(), 1);
}

#[test]
fn submit_pushes_to_remote() {
    let fx = TestFixture::with_remote();
    let msg = fx.coordinator.submit("to the remote", "carol").unwrap();
    assert_eq!(fx.remote_head(), msg.commit_ref);
    assert!(
        fx.replica_root()
            .join(chatsync::storage::replica_path(msg.id, "carol"))
            .exists()
    );
}

#[test]
fn ledger_survives_reopen() {
    let fx = TestFixture::local_only();
    fx.coordinator.submit("persist me", "dave").unwrap();
    let db_path = fx.dir.path().join("database/messages.db");

    let reopened = chatsync::storage::Ledger::open(&db_path).unwrap();
    let msg = reopened.get(1).unwrap().unwrap();
    assert_eq!(msg.content, "persist me");
    assert!(msg.is_synchronized());
    assert_eq!(reopened.schema_version(), fx.ledger.schema_version());
}

#[test]
fn recovered_old_commit_does_not_hide_unpushed_tip() {
    let fx = TestFixture::with_remote();
    let recovered = fx.ledger.insert("committed before a crash", "alice").unwrap();
    let early = fx.git.write(&recovered).unwrap();
    assert_eq!(fx.remote_head().as_deref(), Some(early.commit_ref.as_str()));

    let parked = fx.dir.path().join("remote-away.git");
    fs::rename(&fx.remote, &parked).unwrap();
    let later = fx.coordinator.submit("written while remote away", "alice").unwrap();
    let later_ref = later.commit_ref.clone().unwrap();
    assert!(!fx.replica.is_pushed(&later_ref).unwrap());

    let report = fx.coordinator.reconcile_pass(None).unwrap();
    assert_eq!(report.advanced, 1);
    assert_eq!(
        fx.message(recovered.id).commit_ref.as_deref(),
        Some(early.commit_ref.as_str())
    );
    assert!(report.push_deferred);
    assert!(!report.is_clean());
    assert!(!fx.replica.tip_is_pushed().unwrap());

    fs::rename(&parked, &fx.remote).unwrap();
    let report = fx.coordinator.reconcile_pass(None).unwrap();
    assert!(report.pushed);
    assert!(report.is_clean());
    assert_eq!(fx.remote_head().as_deref(), Some(later_ref.as_str()));
    assert!(fx.replica.is_pushed(&later_ref).unwrap());
    assert_eq!(fx.git.commit_count().unwrap(), 2);
}
