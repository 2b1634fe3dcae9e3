//! Property-based test generators using proptest.
//!
//! Conditions are generated as JSON documents over the fields of
//! [`crate::person_type`] and [`crate::account_type`], so they can be fed
//! to any backend and compared.

use chrono::{DateTime, Duration, TimeZone, Utc};
use multipersist_core::Value;
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use serde_json::{json, Value as Json};

const CITIES: [&str; 4] = ["Seattle", "Detroit", "Austin", "Boston"];

/// Strategy for a person: `(name, age, city)`; city may be absent.
pub fn person_strategy() -> impl Strategy<Value = (String, i64, Option<String>)> {
    (
        prop::string::string_regex("[A-Z][a-z]{0,6}").expect("Invalid regex"),
        0i64..100,
        prop::option::weighted(0.8, prop::sample::select(CITIES.to_vec()).prop_map(String::from)),
    )
}

/// Strategy for a small population of people.
pub fn people_strategy() -> impl Strategy<Value = Vec<(String, i64, Option<String>)>> {
    prop::collection::vec(person_strategy(), 0..24)
}

fn age_condition() -> impl Strategy<Value = Json> {
    let op = prop::sample::select(vec!["eq", "ne", "lt", "lte", "gt", "$gt", "gte"]);
    prop_oneof![
        (0i64..100).prop_map(|age| json!({"age": age})),
        (op, 0i64..100).prop_map(|(op, age)| json!({"age": {op: age}})),
        (0i64..100, 0i64..100).prop_map(|(lo, hi)| json!({"age": {"gte": lo, "lt": hi}})),
        prop::collection::vec(0i64..100, 0..4).prop_map(|ages| json!({"age": {"in": ages}})),
    ]
}

fn city_condition() -> impl Strategy<Value = Json> {
    let city = || prop::sample::select(CITIES.to_vec());
    prop_oneof![
        city().prop_map(|c| json!({"city": c})),
        city().prop_map(|c| json!({"city": {"ne": c}})),
        Just(json!({"city": null})),
        Just(json!({"city": {"ne": null}})),
        (city(), any::<bool>()).prop_map(|(c, null)| {
            if null {
                json!({"city": {"in": [c, null]}})
            } else {
                json!({"city": {"in": [c]}})
            }
        }),
        prop::collection::vec(city(), 0..3).prop_map(|cs| json!({"city": {"nin": cs}})),
    ]
}

fn name_condition() -> impl Strategy<Value = Json> {
    prop_oneof![
        prop::sample::select(vec!["b%", "%a%", "_a%", "%y", "G_orge", "%"])
            .prop_map(|p| json!({"name": {"like": p}})),
        prop::sample::select(vec!["^[A-M]", "a$", "[aeiou]{2}", "^.{3}$"])
            .prop_map(|p| json!({"name": {"$regex": p}})),
    ]
}

/// Strategy for a single-field condition on a person.
pub fn leaf_condition_strategy() -> impl Strategy<Value = Json> {
    prop_oneof![age_condition(), city_condition(), name_condition()]
}

/// Strategy for a nested condition document: leaves combined with `or`
/// lists, and pairs of groups conjoined under `or` and `$or`.
pub fn condition_strategy() -> impl Strategy<Value = Json> {
    leaf_condition_strategy().prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(|docs| json!({"or": docs})),
            (inner.clone(), inner).prop_map(|(a, b)| json!({"or": [a], "$or": [b]})),
        ]
    })
}

/// Strategy for an ordering: distinct-or-repeated person fields with
/// directions.
pub fn order_strategy() -> impl Strategy<Value = Vec<(&'static str, i64)>> {
    fields_order(vec!["name", "age", "city", "id"])
}

fn fields_order(fields: Vec<&'static str>) -> impl Strategy<Value = Vec<(&'static str, i64)>> {
    prop::collection::vec(
        (prop::sample::select(fields), prop::sample::select(vec![1i64, -1])),
        0..3,
    )
}

const HANDLES: [&str; 6] = ["ann", "bob", "cy", "dee", "abe", "bo"];

const BALANCES: [f64; 9] = [0.0, 0.5, 3.0, 12.0, 12.5, 120.25, -7.75, 1e20, 0.0001];

/// An account as generated: `handle` may be missing or repeat, so some
/// saves are rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSeed {
    /// Primary key, possibly absent.
    pub handle: Option<String>,
    /// Activity flag, possibly absent.
    pub active: Option<bool>,
    /// Balance, possibly absent.
    pub balance: Option<f64>,
    /// Creation time, written over the hook-assigned stamp.
    pub created_at: DateTime<Utc>,
}

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

fn balance_strategy() -> BoxedStrategy<f64> {
    prop_oneof![
        prop::sample::select(BALANCES.to_vec()),
        (-4000i32..4000).prop_map(|quarters| f64::from(quarters) / 4.0),
    ]
    .boxed()
}

/// Strategy for one account seed.
pub fn account_strategy() -> impl Strategy<Value = AccountSeed> {
    (
        prop::option::weighted(0.9, prop::sample::select(HANDLES.to_vec()).prop_map(String::from)),
        prop::option::weighted(0.8, any::<bool>()),
        prop::option::weighted(0.8, balance_strategy()),
        0i64..20_000,
    )
        .prop_map(|(handle, active, balance, minutes)| AccountSeed {
            handle,
            active,
            balance,
            created_at: epoch() + Duration::minutes(minutes),
        })
}

/// Strategy for a small population of accounts.
pub fn accounts_strategy() -> impl Strategy<Value = Vec<AccountSeed>> {
    prop::collection::vec(account_strategy(), 0..10)
}

fn comparison() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["eq", "ne", "lt", "lte", "gt", "gte"])
}

fn active_condition() -> impl Strategy<Value = Json> {
    prop_oneof![
        any::<bool>().prop_map(|b| json!({"active": b})),
        any::<bool>().prop_map(|b| json!({"active": {"ne": b}})),
        Just(json!({"active": null})),
        prop::sample::select(vec!["1", "0", "%"]).prop_map(|p| json!({"active": {"like": p}})),
        any::<bool>().prop_map(|b| json!({"active": {"in": [b, null]}})),
    ]
}

fn balance_condition() -> impl Strategy<Value = Json> {
    prop_oneof![
        (comparison(), balance_strategy()).prop_map(|(op, b)| json!({"balance": {op: b}})),
        (comparison(), -20i64..200).prop_map(|(op, n)| json!({"balance": {op: n}})),
        prop::sample::select(vec!["12%", "%.5", "3.0", "%e+%", "-%", "0.0%"])
            .prop_map(|p| json!({"balance": {"like": p}})),
        prop::sample::select(vec!["^12", "\\.25$", "^-", "e-0"])
            .prop_map(|p| json!({"balance": {"regex": p}})),
        Just(json!({"balance": {"ne": null}})),
    ]
}

fn created_condition() -> impl Strategy<Value = Json> {
    let stamp = (0i64..20_000).prop_map(|minutes| {
        Value::datetime_text(&(epoch() + Duration::minutes(minutes)))
    });
    prop_oneof![
        (comparison(), stamp).prop_map(|(op, t)| json!({"created_at": {op: t}})),
        prop::sample::select(vec!["2024-01-0%", "%T1_:%", "2024-01-1%"])
            .prop_map(|p| json!({"created_at": {"like": p}})),
    ]
}

fn handle_condition() -> impl Strategy<Value = Json> {
    prop_oneof![
        prop::collection::vec(prop::sample::select(HANDLES.to_vec()), 0..3)
            .prop_map(|hs| json!({"handle": {"in": hs}})),
        prop::sample::select(vec!["a%", "b_", "%e"]).prop_map(|p| json!({"handle": {"like": p}})),
    ]
}

/// Strategy for a nested condition document over account fields.
pub fn account_condition_strategy() -> impl Strategy<Value = Json> {
    prop_oneof![
        active_condition(),
        balance_condition(),
        created_condition(),
        handle_condition(),
    ]
    .prop_recursive(2, 12, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..3).prop_map(|docs| json!({"or": docs})),
            (inner.clone(), inner).prop_map(|(a, b)| json!({"or": [a], "$or": [b]})),
        ]
    })
}

/// Strategy for an ordering over account fields.
pub fn account_order_strategy() -> impl Strategy<Value = Vec<(&'static str, i64)>> {
    fields_order(vec!["handle", "active", "balance", "created_at"])
}

/// Strategy for an optional limit and offset.
pub fn window_strategy() -> impl Strategy<Value = (Option<u64>, Option<u64>)> {
    (prop::option::of(0u64..8), prop::option::of(0u64..8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use multipersist_core::{translate, Document};
    use proptest::test_runner::TestRunner;

    #[test]
    fn generated_conditions_translate() {
        let mut runner = TestRunner::default();
        runner
            .run(&condition_strategy(), |doc| {
                let parsed = Document::from_json(&doc).expect("generated document parses");
                translate(&parsed).expect("generated document translates");
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn generated_account_conditions_translate() {
        let mut runner = TestRunner::default();
        runner
            .run(&account_condition_strategy(), |doc| {
                let parsed = Document::from_json(&doc).expect("generated document parses");
                translate(&parsed).expect("generated document translates");
                Ok(())
            })
            .unwrap();
    }

    proptest! {
        #[test]
        fn people_have_valid_ages((_, age, _) in person_strategy()) {
            prop_assert!((0..100).contains(&age));
        }

        #[test]
        fn account_stamps_follow_epoch(seed in account_strategy()) {
            prop_assert!(seed.created_at >= epoch());
            prop_assert_eq!(seed.created_at.timestamp() % 60, 0);
        }
    }
}
