//! In-memory backend.

use crate::backend::{Backend, BackendStats, StatsSnapshot, WriteOutcome};
use crate::binder::ConnectedType;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::query::{Direction, Query};
use crate::schema::{AttributeType, EntityType, ValidationErrors, BLANK, TAKEN};
use crate::value::{Record, Value};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct MemoryTable {
    rows: Vec<Record>,
}

impl MemoryTable {
    /// Position of the stored row for `entity`: by persisted primary key,
    /// else by every persisted value.
    fn locate(&self, ty: &EntityType, entity: &Entity) -> Option<usize> {
        match (ty.primary_key(), entity.persisted_primary_key_value()) {
            (Some(pk), Some(value)) => self
                .rows
                .iter()
                .position(|row| row.get(pk.name()).is_some_and(|v| same(v, value))),
            _ => {
                let persisted = entity.persisted_record();
                self.rows.iter().position(|row| {
                    persisted.iter().all(|(name, value)| {
                        let stored = row.get(name).unwrap_or(&Value::Null);
                        (stored.is_null() && value.is_null()) || same(stored, value)
                    })
                })
            }
        }
    }

    fn next_key(&self, column: &str) -> i64 {
        self.rows
            .iter()
            .filter_map(|row| row.get(column).and_then(Value::as_integer))
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Constraint messages for writing `row` at position `skip` (or as a new
    /// row when `None`). A primary key is always required; integer keys are
    /// generated before this runs.
    fn violations(&self, ty: &EntityType, row: &Record, skip: Option<usize>) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        for attribute in ty.attributes() {
            let value = row.get(attribute.name()).unwrap_or(&Value::Null);
            if value.is_null() {
                if attribute.is_not_null() || attribute.is_primary_key() {
                    errors.add(attribute.name(), BLANK);
                }
                continue;
            }
            if !(attribute.is_unique() || attribute.is_primary_key()) {
                continue;
            }
            let taken = self.rows.iter().enumerate().any(|(i, other)| {
                Some(i) != skip
                    && other
                        .get(attribute.name())
                        .is_some_and(|existing| same(existing, value))
            });
            if taken {
                errors.add(attribute.name(), TAKEN);
            }
        }
        errors
    }

    /// Row positions selected by `query`, in query order.
    fn window(&self, query: &Query) -> Vec<usize> {
        let filter = query.filter().compile();
        let mut selected: Vec<usize> = (0..self.rows.len())
            .filter(|&i| filter.matches(&self.rows[i]))
            .collect();

        if !query.order().is_empty() {
            selected.sort_by(|&a, &b| {
                query
                    .order()
                    .iter()
                    .map(|term| {
                        let left = self.rows[a].get(&term.field).unwrap_or(&Value::Null);
                        let right = self.rows[b].get(&term.field).unwrap_or(&Value::Null);
                        match term.direction {
                            Direction::Ascending => left.sort_cmp(right),
                            Direction::Descending => right.sort_cmp(left),
                        }
                    })
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        let offset = usize::try_from(query.offset().unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = query
            .limit()
            .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
        selected.into_iter().skip(offset).take(limit).collect()
    }
}

fn same(a: &Value, b: &Value) -> bool {
    a.filter_cmp(b) == Some(Ordering::Equal)
}

/// A backend keeping each table as a vector of records in memory.
///
/// Filters are evaluated directly on stored records. Primary and unique
/// keys are enforced on single-record writes; an integer primary key left
/// null on insert is generated.
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use multipersist_core::{Attribute, AttributeType, Binder, EntityType, MemoryBackend};
///
/// let person = EntityType::builder("Person")
///     .attribute(Attribute::new("id", AttributeType::Integer).primary_key())
///     .attribute(Attribute::new("name", AttributeType::String))
///     .build()
///     .unwrap();
///
/// let binder = Binder::new();
/// let people = binder.bind(&person, Arc::new(MemoryBackend::new()), true).unwrap();
///
/// let mut jenny = people.build([("name", "Jenny")]).unwrap();
/// assert!(jenny.save().unwrap());
/// assert_eq!(people.find(1).unwrap().unwrap().get("name"), jenny.get("name"));
/// ```
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<String, MemoryTable>>,
    stats: BackendStats,
}

impl MemoryBackend {
    /// Creates an empty backend with no tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records in `table`, if the table exists.
    pub fn table_len(&self, table: &str) -> Option<usize> {
        self.tables.read().get(table).map(|t| t.rows.len())
    }

    /// Current call counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn with_table<R>(
        &self,
        ty: &ConnectedType,
        f: impl FnOnce(&MemoryTable) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let tables = self.tables.read();
        let table = tables
            .get(ty.table_name())
            .ok_or_else(|| no_such_table(ty.table_name()))?;
        f(table)
    }

    fn with_table_mut<R>(
        &self,
        ty: &ConnectedType,
        f: impl FnOnce(&mut MemoryTable) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(ty.table_name())
            .ok_or_else(|| no_such_table(ty.table_name()))?;
        f(table)
    }
}

fn no_such_table(name: &str) -> CoreError {
    CoreError::backend(format!("no such table: {name}"))
}

impl Backend for MemoryBackend {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn ensure_schema(&self, ty: &ConnectedType) -> CoreResult<()> {
        self.stats.record_schema_ensure();
        self.tables
            .write()
            .entry(ty.table_name().to_string())
            .or_default();
        Ok(())
    }

    fn create_record(&self, entity: &mut Entity, ty: &ConnectedType) -> CoreResult<WriteOutcome> {
        self.stats.record_create();
        let schema = ty.entity_type();
        self.with_table_mut(ty, |table| {
            let mut row = entity.record();
            let mut generated = None;
            if let Some(pk) = schema.primary_key() {
                if pk.ty() == AttributeType::Integer && row.get(pk.name()).is_some_and(Value::is_null) {
                    let key = table.next_key(pk.name());
                    row.insert(pk.name().to_string(), Value::Integer(key));
                    generated = Some(key);
                }
            }

            let errors = table.violations(schema, &row, None);
            if !errors.is_empty() {
                self.stats.record_rejection();
                return Ok(WriteOutcome::Rejected(errors));
            }
            table.rows.push(row);
            if let Some(key) = generated {
                entity.assign_primary_key_attribute(key)?;
            }
            Ok(WriteOutcome::Written)
        })
    }

    fn update_record(&self, entity: &mut Entity, ty: &ConnectedType) -> CoreResult<WriteOutcome> {
        self.stats.record_update();
        let schema = ty.entity_type();
        self.with_table_mut(ty, |table| {
            let Some(index) = table.locate(schema, entity) else {
                return Ok(WriteOutcome::Written);
            };
            let mut row = table.rows[index].clone();
            row.extend(entity.changed_record());

            let errors = table.violations(schema, &row, Some(index));
            if !errors.is_empty() {
                self.stats.record_rejection();
                return Ok(WriteOutcome::Rejected(errors));
            }
            table.rows[index] = row;
            Ok(WriteOutcome::Written)
        })
    }

    fn destroy_record(&self, entity: &Entity, ty: &ConnectedType) -> CoreResult<()> {
        self.stats.record_destroy();
        self.with_table_mut(ty, |table| {
            if let Some(index) = table.locate(ty.entity_type(), entity) {
                table.rows.remove(index);
            }
            Ok(())
        })
    }

    fn lookup_by_primary_key(
        &self,
        value: &Value,
        ty: &ConnectedType,
    ) -> CoreResult<Option<Entity>> {
        self.stats.record_lookup();
        let pk = ty
            .entity_type()
            .primary_key()
            .ok_or_else(|| CoreError::no_primary_key(ty.entity_type().name()))?;
        let found = self.with_table(ty, |table| {
            Ok(table
                .rows
                .iter()
                .find(|row| row.get(pk.name()).is_some_and(|v| same(v, value)))
                .cloned())
        })?;
        Ok(found.map(|row| ty.materialize(row)))
    }

    fn count(&self, ty: &ConnectedType, query: &Query) -> CoreResult<u64> {
        self.stats.record_query();
        self.with_table(ty, |table| Ok(table.window(query).len() as u64))
    }

    fn select(&self, ty: &ConnectedType, query: &Query) -> CoreResult<Vec<Record>> {
        self.stats.record_query();
        self.with_table(ty, |table| {
            Ok(table
                .window(query)
                .into_iter()
                .map(|i| {
                    let row = &table.rows[i];
                    match query.projection() {
                        Some(fields) => fields
                            .iter()
                            .map(|f| (f.clone(), row.get(f).cloned().unwrap_or_default()))
                            .collect(),
                        None => row.clone(),
                    }
                })
                .collect())
        })
    }

    fn update_all(&self, ty: &ConnectedType, query: &Query, values: &Record) -> CoreResult<u64> {
        self.stats.record_bulk_write();
        self.with_table_mut(ty, |table| {
            let selected = table.window(query);
            for &i in &selected {
                table.rows[i].extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Ok(selected.len() as u64)
        })
    }

    fn delete_all(&self, ty: &ConnectedType, query: &Query) -> CoreResult<u64> {
        self.stats.record_bulk_write();
        self.with_table_mut(ty, |table| {
            let mut selected = table.window(query);
            selected.sort_unstable_by(|a, b| b.cmp(a));
            for &i in &selected {
                table.rows.remove(i);
            }
            Ok(selected.len() as u64)
        })
    }

    fn stats(&self) -> Option<StatsSnapshot> {
        Some(self.stats.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::Binder;
    use crate::schema::Attribute;
    use std::sync::Arc;

    fn people(backend: Arc<MemoryBackend>) -> ConnectedType {
        let ty = EntityType::builder("Person")
            .table("persons")
            .attribute(Attribute::new("id", AttributeType::Integer).primary_key())
            .attribute(Attribute::new("name", AttributeType::String))
            .attribute(Attribute::new("age", AttributeType::Integer))
            .build()
            .unwrap();
        Binder::new().bind(&ty, backend, true).unwrap()
    }

    #[test]
    fn missing_table_is_a_backend_error() {
        let ty = EntityType::builder("Ghost")
            .attribute(Attribute::new("name", AttributeType::String))
            .build()
            .unwrap();
        let ghosts = Binder::new()
            .bind(&ty, Arc::new(MemoryBackend::new()), false)
            .unwrap();
        let mut g = ghosts.build([("name", "Casper")]).unwrap();
        let err = g.save().unwrap_err();
        assert!(matches!(err, CoreError::Backend(_)));
        assert_eq!(err.to_string(), "backend error: no such table: ghost");
    }

    #[test]
    fn generates_integer_keys() {
        let backend = Arc::new(MemoryBackend::new());
        let people = people(backend.clone());
        for (n, name) in ["a", "b", "c"].into_iter().enumerate() {
            let mut p = people.build([("name", name)]).unwrap();
            p.save().unwrap();
            assert_eq!(p.primary_key_value(), Some(&Value::Integer(n as i64 + 1)));
        }
        assert_eq!(backend.table_len("persons"), Some(3));
    }

    #[test]
    fn explicit_duplicate_key_is_rejected() {
        let people = people(Arc::new(MemoryBackend::new()));
        let mut a = people.new_entity().with("id", 5).unwrap();
        assert!(a.save().unwrap());
        let mut b = people.new_entity().with("id", 5).unwrap();
        assert!(!b.save().unwrap());
        assert_eq!(b.errors().get("id"), [TAKEN]);
    }

    #[test]
    fn missing_text_key_is_blank() {
        let ty = EntityType::builder("Account")
            .attribute(Attribute::new("handle", AttributeType::String).primary_key())
            .attribute(Attribute::new("email", AttributeType::String))
            .build()
            .unwrap();
        let backend = Arc::new(MemoryBackend::new());
        let accounts = Binder::new().bind(&ty, backend.clone(), true).unwrap();
        let mut a = accounts.build([("email", "a@x")]).unwrap();
        assert!(!a.save().unwrap());
        assert_eq!(a.errors().get("handle"), [BLANK]);
        assert!(!a.is_persisted());
        assert_eq!(backend.table_len("account"), Some(0));
    }

    #[test]
    fn update_and_lookup_round_trip() {
        let people = people(Arc::new(MemoryBackend::new()));
        let mut p = people.build([("name", "Jenny")]).unwrap();
        p.set("age", 30).unwrap();
        p.save().unwrap();
        p.set("age", 31).unwrap();
        p.save().unwrap();

        let found = people.find(1).unwrap().unwrap();
        assert_eq!(found.record(), p.record());
        assert!(found.is_persisted());
        assert!(found.changed().is_empty());
        assert!(people.find(2).unwrap().is_none());
    }

    #[test]
    fn bulk_update_and_delete() {
        let backend = Arc::new(MemoryBackend::new());
        let people = people(backend.clone());
        for (name, age) in [("a", 10), ("b", 20), ("c", 30)] {
            people
                .build([("name", Value::from(name)), ("age", Value::from(age))])
                .unwrap()
                .save()
                .unwrap();
        }

        let mut older = people.all();
        older.filter(serde_json::json!({"age": {"gte": 20}})).unwrap();
        assert_eq!(older.update([("name", "old")]).unwrap(), 2);
        assert_eq!(people.filter(serde_json::json!({"name": "old"})).unwrap().count().unwrap(), 2);

        let mut first = people.all();
        first.order_by("age").unwrap().limit(1);
        assert_eq!(first.delete().unwrap(), 1);
        assert_eq!(backend.table_len("persons"), Some(2));
    }
}
