//! File-backed persistence and backend-level behavior.

use multipersist_core::{
    Attribute, AttributeType, Backend, Binder, CoreError, EntityType, Phase, Value,
};
use multipersist_sqlite::{SqliteBackend, SqliteConfig};
use multipersist_testkit::prelude::*;
use serde_json::json;
use std::sync::Arc;

#[test]
fn records_survive_reopening() {
    init_tracing();
    let db = TempDatabase::new();
    let person = person_type();

    {
        let backend = Arc::new(SqliteBackend::open(SqliteConfig::file(db.path())).unwrap());
        let people = Binder::new().bind(&person, backend, true).unwrap();
        seed_people(&people);
    }

    let backend = Arc::new(SqliteBackend::open(SqliteConfig::file(db.path())).unwrap());
    let people = Binder::new().bind(&person, backend, true).unwrap();
    assert_eq!(people.all().count().unwrap(), 6);

    let xavier = people.find(6).unwrap().expect("Xavier was stored");
    assert_eq!(xavier.get("name"), Some(&Value::from("Xavier")));
    assert_eq!(xavier.get("city"), Some(&Value::from("Detroit")));
}

#[test]
fn connected_type_names_the_database() {
    let db = TempDatabase::new();
    let backend = Arc::new(SqliteBackend::open(SqliteConfig::file(db.path())).unwrap());
    let people = Binder::new().bind(&person_type(), backend, true).unwrap();
    assert_eq!(
        people.name(),
        format!("Person@sqlite3:{}[persons]", db.path().display())
    );

    let memory = Arc::new(SqliteBackend::in_memory().unwrap());
    let people = Binder::new().bind(&person_type(), memory, true).unwrap();
    assert_eq!(people.name(), "Person@sqlite3::memory:[persons]");
}

#[test]
fn binder_caches_per_backend() {
    let binder = Binder::new();
    let person = person_type();
    let a: Arc<dyn Backend> = Arc::new(SqliteBackend::in_memory().unwrap());
    let b: Arc<dyn Backend> = Arc::new(SqliteBackend::in_memory().unwrap());

    let first = binder.bind(&person, a.clone(), true).unwrap();
    let again = binder.bind(&person, a, false).unwrap();
    let other = binder.bind(&person, b, true).unwrap();
    assert!(first.same_type(&again));
    assert!(!first.same_type(&other));
    assert_eq!(binder.len(), 2);

    // The two databases are independent.
    save_person(&first, "Only", 1, None);
    assert_eq!(other.all().count().unwrap(), 0);
}

#[test]
fn unbound_storage_is_a_backend_error() {
    let backend = Arc::new(SqliteBackend::in_memory().unwrap());
    let people = Binder::new().bind(&person_type(), backend, false).unwrap();
    let mut ghost = people.build([("name", "Ghost")]).unwrap();
    let err = ghost.save().unwrap_err();
    assert!(matches!(err, CoreError::Backend(_)), "{err}");
    assert!(err.to_string().contains("no such table: persons"), "{err}");
}

#[test]
fn instances_of_bare_types_cannot_save() {
    let mut orphan = person_type().new_entity().with("name", "Orphan").unwrap();
    assert!(matches!(orphan.save(), Err(CoreError::NotConnected { .. })));
}

#[test]
fn hooks_wrap_sqlite_writes() {
    let log = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));
    let (before, after) = (log.clone(), log.clone());
    let ty = EntityType::builder("Note")
        .attribute(Attribute::new("id", AttributeType::Integer).primary_key())
        .attribute(Attribute::new("body", AttributeType::String))
        .before(Phase::Create, move |_| {
            before.lock().push("before".into());
            Ok(())
        })
        .after(Phase::Create, move |note| {
            after.lock().push(format!("after id={}", note.get("id").cloned().unwrap_or_default()));
            Ok(())
        })
        .build()
        .unwrap();

    let notes = Binder::new()
        .bind(&ty, Arc::new(SqliteBackend::in_memory().unwrap()), true)
        .unwrap();
    notes.build([("body", "hi")]).unwrap().save().unwrap();
    assert_eq!(*log.lock(), ["before", "after id=1"]);
}

#[test]
fn renders_select_for_diagnostics() {
    let backend = Arc::new(SqliteBackend::in_memory().unwrap());
    let people = Binder::new().bind(&person_type(), backend.clone(), true).unwrap();
    let mut set = people.filter(json!({"age": {"gt": 22}, "city": "Seattle"})).unwrap();
    set.order_by("name").unwrap().limit(3);

    let stmt = backend.render_select(&people, set.query());
    assert_eq!(
        stmt.sql,
        "SELECT \"id\", \"name\", \"age\", \"city\" FROM \"persons\" \
         WHERE ((\"age\" > ?) AND (\"city\" = ?)) ORDER BY \"name\" ASC, rowid ASC LIMIT ?"
    );
    assert_eq!(stmt.params.len(), 3);
}

#[test]
fn counts_calls() {
    let backend = Arc::new(SqliteBackend::in_memory().unwrap());
    let people = Binder::new().bind(&person_type(), backend.clone(), true).unwrap();
    seed_people(&people);
    people.all().count().unwrap();

    let stats = backend.snapshot();
    assert_eq!(stats.schema_ensures, 1);
    assert_eq!(stats.creates, 6);
    assert_eq!(stats.queries, 1);
    assert_eq!(stats.rejections, 0);
}
