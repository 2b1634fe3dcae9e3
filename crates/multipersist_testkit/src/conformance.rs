//! Backend conformance suite.
//!
//! Every backend should behave identically through connected types. Each
//! check binds fresh fixtures to a backend produced by the factory and
//! panics on the first divergence.

use crate::fixtures::{account_type, item_type, names, person_type, save_person, seed_people};
use multipersist_core::{
    Backend, Binder, ConnectedType, CoreError, Record, Value, BLANK, TAKEN,
};
use std::sync::Arc;

/// Produces a fresh, empty backend.
pub type BackendFactory<'a> = &'a dyn Fn() -> Arc<dyn Backend>;

/// Binds `ty` to a fresh backend, creating its storage.
fn bind(factory: BackendFactory<'_>, ty: &multipersist_core::EntityType) -> ConnectedType {
    Binder::new()
        .bind(ty, factory(), true)
        .expect("Failed to bind fixture type")
}

/// Runs every conformance check.
pub fn run_conformance(factory: impl Fn() -> Arc<dyn Backend>) {
    let factory: BackendFactory<'_> = &factory;
    check_create_find_update(factory);
    check_validation_gate(factory);
    check_constraint_rejections(factory);
    check_destroy(factory);
    check_rows_without_primary_key(factory);
    check_value_round_trip(factory);
    check_people_queries(factory);
    check_account_queries(factory);
    check_ordering_and_window(factory);
    check_null_conditions(factory);
    check_bulk_writes(factory);
}

/// Create assigns a key; a dirty update is found again by key.
pub fn check_create_find_update(factory: BackendFactory<'_>) {
    let people = bind(factory, &person_type());
    let mut jenny = save_person(&people, "Jenny", 30, Some("Seattle"));
    let id = jenny.primary_key_value().cloned().expect("key assigned");
    assert!(matches!(id, Value::Integer(_)), "generated key {id:?}");
    assert!(jenny.changed().is_empty());

    jenny.set("age", 31).unwrap();
    assert_eq!(jenny.changed(), ["age"]);
    assert!(jenny.save().unwrap());

    let found = people.find(id.clone()).unwrap().expect("saved person is found");
    assert_eq!(found.record(), jenny.record());
    assert!(found.is_persisted());
    assert!(found.changed().is_empty());
    assert!(people.find(Value::Integer(9_999)).unwrap().is_none());
}

/// Invalid instances never reach the backend.
pub fn check_validation_gate(factory: BackendFactory<'_>) {
    let people = bind(factory, &person_type());
    let before = people.backend().stats();
    let mut nameless = people.build([("age", 3)]).unwrap();
    assert!(!nameless.save().unwrap());
    assert_eq!(nameless.errors().get("name"), [BLANK]);
    assert!(nameless.is_new_record());
    assert_eq!(people.backend().stats().map(|s| s.creates), before.map(|s| s.creates));
}

/// Duplicate unique values and keys come back as instance errors.
pub fn check_constraint_rejections(factory: BackendFactory<'_>) {
    let accounts = bind(factory, &account_type());
    let mut first = accounts
        .build([("handle", "ann"), ("email", "ann@example.com")])
        .unwrap();
    assert!(first.save().unwrap());

    let mut same_email = accounts
        .build([("handle", "bob"), ("email", "ann@example.com")])
        .unwrap();
    assert!(!same_email.save().unwrap());
    assert_eq!(same_email.errors().get("email"), [TAKEN]);
    assert!(same_email.is_new_record());

    let mut same_handle = accounts
        .build([("handle", "ann"), ("email", "other@example.com")])
        .unwrap();
    assert!(!same_handle.save().unwrap());
    assert_eq!(same_handle.errors().get("handle"), [TAKEN]);

    let err = same_handle.save_strict().unwrap_err();
    assert!(matches!(err, CoreError::RecordInvalid { .. }), "{err}");

    let mut keyless = accounts.build([("email", "nobody@example.com")]).unwrap();
    assert!(!keyless.save().unwrap());
    assert_eq!(keyless.errors().get("handle"), [BLANK]);
    assert!(keyless.is_new_record());
    assert_eq!(accounts.all().count().unwrap(), 1);
}

/// Destroyed records are gone and cannot be destroyed twice.
pub fn check_destroy(factory: BackendFactory<'_>) {
    let people = bind(factory, &person_type());
    let mut a = save_person(&people, "A", 1, None);
    let b = save_person(&people, "B", 2, None);

    assert!(a.destroy().unwrap());
    assert!(a.is_destroyed());
    assert!(!a.destroy().unwrap());
    assert!(people.find(a.primary_key_value().cloned().unwrap_or_default()).unwrap().is_none());
    assert!(people.find(b.primary_key_value().cloned().unwrap_or_default()).unwrap().is_some());
}

/// Types without a primary key update and destroy the row matching the
/// persisted values.
pub fn check_rows_without_primary_key(factory: BackendFactory<'_>) {
    let items = bind(factory, &item_type());
    let mut bolt = items.build([("label", "bolt")]).unwrap();
    assert!(bolt.save().unwrap());
    let mut twin = items.build([("label", "bolt")]).unwrap();
    assert!(twin.save().unwrap());
    let mut nut = items
        .build([("label", Value::from("nut")), ("qty", Value::from(4))])
        .unwrap();
    assert!(nut.save().unwrap());

    nut.set("qty", 5).unwrap();
    assert!(nut.save().unwrap());
    let found = items.filter(serde_json::json!({"label": "nut"})).unwrap().all().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("qty"), Some(&Value::Integer(5)));

    assert!(twin.destroy().unwrap());
    assert_eq!(items.filter(serde_json::json!({"label": "bolt"})).unwrap().count().unwrap(), 1);
    assert!(items.find(1).is_err());
}

/// Every attribute type comes back as it was written.
pub fn check_value_round_trip(factory: BackendFactory<'_>) {
    let accounts = bind(factory, &account_type());
    let mut ann = accounts
        .build([
            ("handle", Value::from("ann")),
            ("email", Value::from("ann@example.com")),
            ("active", Value::Bool(true)),
            ("balance", Value::from(12)),
        ])
        .unwrap();
    assert!(ann.save().unwrap());
    assert!(ann.get("created_at").is_some_and(|v| !v.is_null()));
    assert_eq!(ann.get("balance"), Some(&Value::Float(12.0)));

    let found = accounts.find("ann").unwrap().expect("account is found");
    assert_eq!(found.record(), ann.record());
}

/// Filtering the six people.
pub fn check_people_queries(factory: BackendFactory<'_>) {
    let people = bind(factory, &person_type());
    seed_people(&people);

    let older = people.filter(serde_json::json!({"age": {"gt": 22}})).unwrap();
    assert_eq!(names(&older.all().unwrap()), ["George", "Belinda", "Xavier"]);

    let either = people
        .filter(serde_json::json!({
            "or": [{"age": {"gt": 22}, "city": "Seattle"}, {"age": 19}]
        }))
        .unwrap();
    assert_eq!(names(&either.all().unwrap()), ["George", "Belinda", "Harry"]);

    let mut narrowed = people.filter(serde_json::json!({"city": "Seattle"})).unwrap();
    narrowed.and(serde_json::json!({"age": {"in": [19, 20]}})).unwrap();
    assert_eq!(names(&narrowed.all().unwrap()), ["Margret", "Bill", "Harry"]);
    narrowed.or(serde_json::json!({"name": "Xavier"})).unwrap();
    assert_eq!(narrowed.count().unwrap(), 4);

    let b_names = people.filter(serde_json::json!({"name": {"like": "b%"}})).unwrap();
    assert_eq!(names(&b_names.all().unwrap()), ["Bill", "Belinda"]);
    let gh = people.filter(serde_json::json!({"name": {"$regex": "^[GH]"}})).unwrap();
    assert_eq!(names(&gh.all().unwrap()), ["George", "Harry"]);

    let nobody = people.filter(serde_json::json!({"city": {"in": []}})).unwrap();
    assert_eq!(nobody.count().unwrap(), 0);
    assert!(nobody.first().unwrap().is_none());

    let err = people.filter(serde_json::json!({"height": 3})).unwrap_err();
    assert!(matches!(err, CoreError::UnknownAttribute { .. }), "{err}");
}

/// Conditions on boolean, float and timestamp columns. `like` and `regex`
/// see booleans as 0/1 and floats as their REAL text.
pub fn check_account_queries(factory: BackendFactory<'_>) {
    let accounts = bind(factory, &account_type());
    for (handle, active, balance) in [
        ("ann", Some(true), Some(12.5)),
        ("bob", Some(false), Some(3.0)),
        ("cy", Some(true), Some(1250.0)),
        ("dee", None, Some(0.25)),
        ("eve", Some(true), None),
    ] {
        let mut account = accounts
            .build([
                ("handle", Value::from(handle)),
                ("email", Value::from(format!("{handle}@example.com"))),
                ("active", Value::from(active)),
                ("balance", Value::from(balance)),
            ])
            .unwrap();
        assert!(account.save().unwrap(), "account {handle} was not saved");
    }

    let handles = |condition: serde_json::Value| -> Vec<String> {
        accounts
            .filter(condition)
            .unwrap()
            .all()
            .unwrap()
            .iter()
            .map(|e| e.get("handle").and_then(Value::as_text).unwrap_or_default().to_string())
            .collect()
    };

    assert_eq!(handles(serde_json::json!({"balance": {"like": "12%"}})), ["ann", "cy"]);
    assert_eq!(handles(serde_json::json!({"balance": {"like": "3.0"}})), ["bob"]);
    assert_eq!(handles(serde_json::json!({"balance": {"regex": "^0\\.25$"}})), ["dee"]);
    assert_eq!(handles(serde_json::json!({"active": {"like": "1"}})), ["ann", "cy", "eve"]);
    assert_eq!(handles(serde_json::json!({"active": false})), ["bob"]);
    assert_eq!(handles(serde_json::json!({"active": null})), ["dee"]);
    assert_eq!(handles(serde_json::json!({"balance": {"gt": 3}})), ["ann", "cy"]);
    assert_eq!(handles(serde_json::json!({"balance": 3})), ["bob"]);
    assert_eq!(
        handles(serde_json::json!({"created_at": {"gte": "2000-01-01T00:00:00.000000Z"}})).len(),
        5
    );

    let mut richest = accounts.all();
    richest.order_by(("balance", -1)).unwrap();
    let order: Vec<Value> = richest
        .iter()
        .unwrap()
        .map(|e| e.get("handle").cloned().unwrap_or_default())
        .collect();
    assert_eq!(order, ["cy", "ann", "bob", "dee", "eve"].map(Value::from));
}

/// Ordering, offset, limit and projection.
pub fn check_ordering_and_window(factory: BackendFactory<'_>) {
    let people = bind(factory, &person_type());
    seed_people(&people);

    let mut by_age = people.all();
    by_age.order_by(["age", "name"]).unwrap();
    assert_eq!(
        names(&by_age.all().unwrap()),
        ["Harry", "Bill", "Margret", "Belinda", "George", "Xavier"]
    );

    // Re-specifying a field moves it last: now name, then age descending.
    by_age.order_by(("age", -1)).unwrap();
    assert_eq!(
        names(&by_age.all().unwrap()),
        ["Belinda", "Bill", "George", "Harry", "Margret", "Xavier"]
    );

    // Ties keep insertion order.
    let mut oldest_first = people.all();
    oldest_first.order_by(("age", -1)).unwrap();
    assert_eq!(
        names(&oldest_first.all().unwrap()),
        ["Xavier", "George", "Belinda", "Margret", "Bill", "Harry"]
    );

    let mut page = people.all();
    page.order_by("age").unwrap().offset(1).limit(2);
    assert_eq!(names(&page.all().unwrap()), ["Margret", "Bill"]);
    assert_eq!(page.count().unwrap(), 2);
    assert_eq!(names(&page.first().unwrap().into_iter().collect::<Vec<_>>()), ["Margret"]);

    let mut tail = people.all();
    tail.order_by("age").unwrap().offset(4);
    assert_eq!(names(&tail.all().unwrap()), ["George", "Xavier"]);

    let mut projected = people.all();
    projected.project(["name"]).unwrap().order_by(("name", -1)).unwrap().limit(1);
    let top = projected.all().unwrap();
    assert_eq!(names(&top), ["Xavier"]);
    assert_eq!(top[0].get("age"), Some(&Value::Null));

    let records: Vec<Record> = projected.iter().unwrap().map(|e| e.record()).collect();
    assert_eq!(records.len(), 1);
}

/// Null matching: literal null, `ne` null, `in` with null.
pub fn check_null_conditions(factory: BackendFactory<'_>) {
    let people = bind(factory, &person_type());
    seed_people(&people);
    save_person(&people, "Nomad", 33, None);

    let homeless = people.filter(serde_json::json!({"city": null})).unwrap();
    assert_eq!(names(&homeless.all().unwrap()), ["Nomad"]);
    let housed = people.filter(serde_json::json!({"city": {"ne": null}})).unwrap();
    assert_eq!(housed.count().unwrap(), 6);
    let not_seattle = people.filter(serde_json::json!({"city": {"ne": "Seattle"}})).unwrap();
    assert_eq!(names(&not_seattle.all().unwrap()), ["Xavier"]);
    let detroit_or_none = people
        .filter(serde_json::json!({"city": {"in": ["Detroit", null]}}))
        .unwrap();
    assert_eq!(names(&detroit_or_none.all().unwrap()), ["Xavier", "Nomad"]);
    let outside = people.filter(serde_json::json!({"city": {"nin": ["Seattle"]}})).unwrap();
    assert_eq!(names(&outside.all().unwrap()), ["Xavier"]);
}

/// Bulk update and delete affect exactly the selected rows.
pub fn check_bulk_writes(factory: BackendFactory<'_>) {
    let people = bind(factory, &person_type());
    seed_people(&people);

    let twenties = people.filter(serde_json::json!({"age": 20})).unwrap();
    assert_eq!(twenties.update([("city", "Portland")]).unwrap(), 2);
    let moved = people.filter(serde_json::json!({"city": "Portland"})).unwrap();
    assert_eq!(names(&moved.all().unwrap()), ["Margret", "Bill"]);

    let err = twenties.update([("age", "twenty")]).unwrap_err();
    assert!(matches!(err, CoreError::ValidationFailed { .. }), "{err}");

    let mut oldest = people.all();
    oldest.order_by(("age", -1)).unwrap().limit(1);
    assert_eq!(oldest.delete().unwrap(), 1);
    assert_eq!(people.all().count().unwrap(), 5);
    assert_eq!(people.filter(serde_json::json!({"name": "Xavier"})).unwrap().count().unwrap(), 0);
}

/// Runs `condition`, `order` and the window against `people` and returns
/// the matching records, for comparing backends with each other.
pub fn query_records(
    people: &ConnectedType,
    condition: &serde_json::Value,
    order: &[(&str, i64)],
    window: (Option<u64>, Option<u64>),
) -> Vec<Record> {
    let mut set = people.filter(condition).expect("generated condition is valid");
    if !order.is_empty() {
        set.order_by(order.to_vec()).expect("generated order is valid");
    }
    if let Some(limit) = window.0 {
        set.limit(limit);
    }
    if let Some(offset) = window.1 {
        set.offset(offset);
    }
    set.all()
        .expect("query runs")
        .iter()
        .map(|e| e.record())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use multipersist_core::MemoryBackend;

    #[test]
    fn memory_backend_conforms() {
        crate::init_tracing();
        run_conformance(|| Arc::new(MemoryBackend::new()));
    }
}
