//! SQLite and the in-memory backend answer generated queries identically.

use multipersist_core::{Binder, ConnectedType, MemoryBackend, Value, CREATED_AT, UPDATED_AT};
use multipersist_sqlite::SqliteBackend;
use multipersist_testkit::prelude::*;
use proptest::prelude::*;
use std::sync::Arc;

fn populate(people: &[(String, i64, Option<String>)]) -> (ConnectedType, ConnectedType) {
    let binder = Binder::new();
    let ty = person_type();
    let memory = binder.bind(&ty, Arc::new(MemoryBackend::new()), true).unwrap();
    let sqlite = binder
        .bind(&ty, Arc::new(SqliteBackend::in_memory().unwrap()), true)
        .unwrap();
    for (name, age, city) in people {
        save_person(&memory, name, *age, city.as_deref());
        save_person(&sqlite, name, *age, city.as_deref());
    }
    (memory, sqlite)
}

/// Saves one seed and pins its timestamps, so both backends hold the same
/// record. Returns whether the save was accepted.
fn save_account(accounts: &ConnectedType, seed: &AccountSeed, n: usize) -> bool {
    let mut account = accounts
        .build([
            ("handle", Value::from(seed.handle.clone())),
            ("email", Value::from(format!("user{n}@example.com"))),
            ("active", Value::from(seed.active)),
            ("balance", Value::from(seed.balance)),
        ])
        .unwrap();
    let saved = account.save().unwrap();
    if saved {
        let stamp = Value::DateTime(seed.created_at);
        let pinned = accounts
            .filter(serde_json::json!({"email": format!("user{n}@example.com")}))
            .unwrap()
            .update([(CREATED_AT, stamp.clone()), (UPDATED_AT, stamp)])
            .unwrap();
        assert_eq!(pinned, 1);
    }
    saved
}

fn populate_accounts(seeds: &[AccountSeed]) -> (ConnectedType, ConnectedType, Vec<(bool, bool)>) {
    let binder = Binder::new();
    let ty = account_type();
    let memory = binder.bind(&ty, Arc::new(MemoryBackend::new()), true).unwrap();
    let sqlite = binder
        .bind(&ty, Arc::new(SqliteBackend::in_memory().unwrap()), true)
        .unwrap();
    let outcomes = seeds
        .iter()
        .enumerate()
        .map(|(n, seed)| (save_account(&memory, seed, n), save_account(&sqlite, seed, n)))
        .collect();
    (memory, sqlite, outcomes)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn account_saves_and_queries_agree(
        seeds in accounts_strategy(),
        condition in account_condition_strategy(),
        order in account_order_strategy(),
        window in window_strategy(),
    ) {
        let (memory, sqlite, outcomes) = populate_accounts(&seeds);
        for (n, (in_memory, in_sqlite)) in outcomes.iter().enumerate() {
            prop_assert_eq!(in_memory, in_sqlite, "save of {:?}", &seeds[n]);
        }

        let expected = query_records(&memory, &condition, &order, window);
        let actual = query_records(&sqlite, &condition, &order, window);
        prop_assert_eq!(&actual, &expected, "condition {}", condition);

        let count = |accounts: &ConnectedType| accounts.filter(&condition).unwrap().count().unwrap();
        prop_assert_eq!(count(&sqlite), count(&memory));
    }

    #[test]
    fn account_bulk_updates_agree(
        seeds in accounts_strategy(),
        condition in account_condition_strategy(),
        active in any::<bool>(),
    ) {
        let (memory, sqlite, _) = populate_accounts(&seeds);
        let update = |accounts: &ConnectedType| {
            accounts
                .filter(&condition)
                .unwrap()
                .update([("active", Value::Bool(active)), ("balance", Value::Float(0.5))])
                .unwrap()
        };
        prop_assert_eq!(update(&sqlite), update(&memory));

        let everyone = serde_json::json!({});
        prop_assert_eq!(
            query_records(&sqlite, &everyone, &[], (None, None)),
            query_records(&memory, &everyone, &[], (None, None))
        );
    }

    #[test]
    fn filtered_ordered_windows_agree(
        people in people_strategy(),
        condition in condition_strategy(),
        order in order_strategy(),
        window in window_strategy(),
    ) {
        let (memory, sqlite) = populate(&people);
        let expected = query_records(&memory, &condition, &order, window);
        let actual = query_records(&sqlite, &condition, &order, window);
        prop_assert_eq!(&actual, &expected, "condition {}", condition);

        let count = |people: &ConnectedType| people.filter(&condition).unwrap().count().unwrap();
        prop_assert_eq!(count(&sqlite), count(&memory));
    }

    #[test]
    fn bulk_updates_agree(people in people_strategy(), condition in condition_strategy()) {
        let (memory, sqlite) = populate(&people);
        let update = |people: &ConnectedType| {
            people.filter(&condition).unwrap().update([("city", Value::from("Reno"))]).unwrap()
        };
        prop_assert_eq!(update(&sqlite), update(&memory));

        let everyone = serde_json::json!({});
        prop_assert_eq!(
            query_records(&sqlite, &everyone, &[], (None, None)),
            query_records(&memory, &everyone, &[], (None, None))
        );
    }
}
