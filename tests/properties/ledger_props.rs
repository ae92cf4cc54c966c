use proptest::prelude::*;
use tempfile::tempdir;

use chatsync::storage::Ledger;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn list_recent_is_descending_and_bounded(
        count in 0usize..40,
        limit in 1i64..60,
        before in proptest::option::of(1i64..50),
    ) {
        let dir = tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("messages.db")).unwrap();
        for i in 0..count {
            ledger.insert(&format!("m{i}"), "alice").unwrap();
        }

        let page = ledger.list_recent(limit, before).unwrap();
        prop_assert!(page.len() as i64 <= limit);
        prop_assert!(page.windows(2).all(|w| w[0].id > w[1].id));
        if let Some(before) = before {
            prop_assert!(page.iter().all(|m| m.id < before));
        }

        let eligible = match before {
            Some(before) => (before - 1).clamp(0, count as i64),
            None => count as i64,
        };
        prop_assert_eq!(page.len() as i64, eligible.min(limit));
    }
}
