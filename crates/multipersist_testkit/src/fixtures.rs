//! Entity type fixtures and seed data.

use multipersist_core::{
    Attribute, AttributeType, ConnectedType, Entity, EntityType, Record, Value,
};
use std::path::PathBuf;
use tempfile::TempDir;

/// Six people used throughout the query tests: `(name, age, city)`.
pub const PEOPLE: [(&str, i64, &str); 6] = [
    ("George", 50, "Seattle"),
    ("Margret", 20, "Seattle"),
    ("Bill", 20, "Seattle"),
    ("Belinda", 23, "Seattle"),
    ("Harry", 19, "Seattle"),
    ("Xavier", 79, "Detroit"),
];

/// `Person`: integer primary key `id`, required `name`, `age`, indexed
/// `city`. Stored in table `persons`.
pub fn person_type() -> EntityType {
    EntityType::builder("Person")
        .table("persons")
        .attribute(Attribute::new("id", AttributeType::Integer).primary_key())
        .attribute(Attribute::new("name", AttributeType::String).not_null())
        .attribute(Attribute::new("age", AttributeType::Integer))
        .attribute(Attribute::new("city", AttributeType::String).indexed())
        .build()
        .expect("person type is well formed")
}

/// `Account`: text primary key `handle`, unique `email`, a flag and
/// timestamps.
pub fn account_type() -> EntityType {
    EntityType::builder("Account")
        .attribute(Attribute::new("handle", AttributeType::String).primary_key())
        .attribute(Attribute::new("email", AttributeType::String).unique().not_null())
        .attribute(Attribute::new("active", AttributeType::Boolean))
        .attribute(Attribute::new("balance", AttributeType::Float))
        .timestamps()
        .build()
        .expect("account type is well formed")
}

/// `Item`: no primary key; rows are located by their values.
pub fn item_type() -> EntityType {
    EntityType::builder("Item")
        .attribute(Attribute::new("label", AttributeType::String))
        .attribute(Attribute::new("qty", AttributeType::Integer))
        .build()
        .expect("item type is well formed")
}

/// Builds and saves one person.
pub fn save_person(people: &ConnectedType, name: &str, age: i64, city: Option<&str>) -> Entity {
    let mut person = people
        .build([
            ("name", Value::from(name)),
            ("age", Value::from(age)),
            ("city", Value::from(city)),
        ])
        .expect("person attributes are declared");
    assert!(person.save().expect("save person"), "person {name} was not saved");
    person
}

/// Saves [`PEOPLE`] in order.
pub fn seed_people(people: &ConnectedType) -> Vec<Entity> {
    PEOPLE
        .iter()
        .map(|(name, age, city)| save_person(people, name, *age, Some(city)))
        .collect()
}

/// The `name` attribute of each entity, in order.
pub fn names(entities: &[Entity]) -> Vec<String> {
    entities
        .iter()
        .map(|e| match e.get("name") {
            Some(Value::Text(name)) => name.clone(),
            other => format!("{other:?}"),
        })
        .collect()
}

/// Record values of `field`, in order.
pub fn column(records: &[Record], field: &str) -> Vec<Value> {
    records
        .iter()
        .map(|r| r.get(field).cloned().unwrap_or_default())
        .collect()
}

/// A temporary directory holding a database file path.
pub struct TempDatabase {
    dir: TempDir,
}

impl TempDatabase {
    /// Creates an empty temporary directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Path of the database file inside the directory.
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("multipersist.db")
    }
}

impl Default for TempDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multipersist_core::{Binder, MemoryBackend};
    use std::sync::Arc;

    #[test]
    fn seeds_six_people() {
        let people = Binder::new()
            .bind(&person_type(), Arc::new(MemoryBackend::new()), true)
            .unwrap();
        let saved = seed_people(&people);
        assert_eq!(names(&saved), ["George", "Margret", "Bill", "Belinda", "Harry", "Xavier"]);
        assert_eq!(people.all().count().unwrap(), 6);
    }

    #[test]
    fn temp_database_path_is_inside_dir() {
        let db = TempDatabase::new();
        assert!(db.path().starts_with(db.dir.path()));
        assert!(!db.path().exists());
    }
}
