//! Entity instances: attribute values, dirty tracking and persisted state.

use crate::binder::ConnectedType;
use crate::error::{CoreError, CoreResult};
use crate::schema::{EntityType, ValidationErrors};
use crate::value::{Record, Value};
use std::fmt;

/// Observable lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Never persisted.
    New,
    /// Persisted with no unsaved changes.
    Persisted,
    /// Persisted with unsaved changes.
    Dirty,
    /// Destroyed through its backend.
    Destroyed,
}

/// One unsaved change of an attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange<'a> {
    /// Attribute name.
    pub name: &'a str,
    /// Last persisted value.
    pub from: &'a Value,
    /// Current in-memory value.
    pub to: &'a Value,
}

/// An instance of an entity type.
///
/// Values are stored positionally in attribute declaration order. The
/// persisted snapshot holds the values as of the last successful save or
/// load; an attribute is *changed* while its value differs from the
/// snapshot.
///
/// Instances created from a [`ConnectedType`] carry its backend and can be
/// saved; instances from a bare [`EntityType`] fail with `NotConnected`.
///
/// # Example
///
/// ```rust
/// use multipersist_core::{Attribute, AttributeType, EntityType, Value};
///
/// let person = EntityType::builder("Person")
///     .attribute(Attribute::new("name", AttributeType::String))
///     .build()
///     .unwrap();
///
/// let mut jenny = person.new_entity();
/// jenny.set("name", "Jenny").unwrap();
/// assert_eq!(jenny.get("name"), Some(&Value::from("Jenny")));
/// assert_eq!(jenny.changed(), ["name"]);
/// ```
#[derive(Clone)]
pub struct Entity {
    entity_type: EntityType,
    connection: Option<ConnectedType>,
    values: Vec<Value>,
    persisted_values: Vec<Value>,
    changed: Vec<bool>,
    pub(crate) persisted: bool,
    pub(crate) destroyed: bool,
    pub(crate) errors: ValidationErrors,
}

impl Entity {
    pub(crate) fn new(entity_type: EntityType, connection: Option<ConnectedType>) -> Self {
        let len = entity_type.attributes().len();
        Self {
            entity_type,
            connection,
            values: vec![Value::Null; len],
            persisted_values: vec![Value::Null; len],
            changed: vec![false; len],
            persisted: false,
            destroyed: false,
            errors: ValidationErrors::new(),
        }
    }

    /// The declared type of this instance.
    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// The connected type this instance saves through, if any.
    pub fn connected_type(&self) -> Option<&ConnectedType> {
        self.connection.as_ref()
    }

    pub(crate) fn values(&self) -> &[Value] {
        &self.values
    }

    /// Current value of `name`, or `None` if it is not a declared attribute.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entity_type.index_of(name).map(|i| &self.values[i])
    }

    /// Value of `name` as of the last save or load.
    pub fn persisted_value(&self, name: &str) -> Option<&Value> {
        self.entity_type
            .index_of(name)
            .map(|i| &self.persisted_values[i])
    }

    /// Assigns an attribute and updates its changed flag.
    ///
    /// # Errors
    ///
    /// `UnknownAttribute` if `name` is not declared.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> CoreResult<()> {
        let i = self.entity_type.require_index(name)?;
        let value = self.entity_type.attributes()[i].ty().cast(value.into());
        self.changed[i] = value != self.persisted_values[i];
        self.values[i] = value;
        Ok(())
    }

    /// Builder-style [`Entity::set`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> CoreResult<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Names of changed attributes in declaration order.
    pub fn changed(&self) -> Vec<&str> {
        self.entity_type
            .attributes()
            .iter()
            .zip(&self.changed)
            .filter(|(_, changed)| **changed)
            .map(|(a, _)| a.name())
            .collect()
    }

    /// Whether any attribute has an unsaved change.
    pub fn is_changed(&self) -> bool {
        self.changed.iter().any(|c| *c)
    }

    /// Unsaved changes with their old and new values.
    pub fn changes(&self) -> Vec<AttributeChange<'_>> {
        self.entity_type
            .attributes()
            .iter()
            .enumerate()
            .filter(|(i, _)| self.changed[*i])
            .map(|(i, a)| AttributeChange {
                name: a.name(),
                from: &self.persisted_values[i],
                to: &self.values[i],
            })
            .collect()
    }

    /// All current values keyed by attribute name.
    pub fn record(&self) -> Record {
        self.entity_type
            .attributes()
            .iter()
            .zip(&self.values)
            .map(|(a, v)| (a.name().to_string(), v.clone()))
            .collect()
    }

    /// Current values of changed attributes only.
    pub fn changed_record(&self) -> Record {
        self.entity_type
            .attributes()
            .iter()
            .enumerate()
            .filter(|(i, _)| self.changed[*i])
            .map(|(i, a)| (a.name().to_string(), self.values[i].clone()))
            .collect()
    }

    /// The persisted snapshot keyed by attribute name.
    pub fn persisted_record(&self) -> Record {
        self.entity_type
            .attributes()
            .iter()
            .zip(&self.persisted_values)
            .map(|(a, v)| (a.name().to_string(), v.clone()))
            .collect()
    }

    /// Current primary key value, if the type declares one.
    pub fn primary_key_value(&self) -> Option<&Value> {
        self.entity_type
            .primary_key_index()
            .map(|i| &self.values[i])
    }

    /// Primary key value as of the last save or load.
    pub fn persisted_primary_key_value(&self) -> Option<&Value> {
        self.entity_type
            .primary_key_index()
            .map(|i| &self.persisted_values[i])
    }

    /// Whether the instance has been written to (or read from) its backend.
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Whether the instance has never been persisted.
    pub fn is_new_record(&self) -> bool {
        !self.persisted && !self.destroyed
    }

    /// Whether the instance was destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        if self.destroyed {
            LifecycleState::Destroyed
        } else if !self.persisted {
            LifecycleState::New
        } else if self.is_changed() {
            LifecycleState::Dirty
        } else {
            LifecycleState::Persisted
        }
    }

    /// Messages from the most recent validation or rejected write.
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// Clears and recomputes [`Entity::errors`]. Returns true when valid.
    pub fn validate(&mut self) -> bool {
        let mut errors = ValidationErrors::new();
        self.entity_type.validate(self, &mut errors);
        self.errors = errors;
        self.errors.is_empty()
    }

    /// Marks the instance persisted and snapshots its values, clearing every
    /// changed flag in the same step.
    pub fn mark_persisted(&mut self) {
        self.persisted = true;
        self.persisted_values.clone_from(&self.values);
        self.changed.iter_mut().for_each(|c| *c = false);
    }

    /// Sets the primary key attribute without touching dirty state.
    ///
    /// Backends call this right after an insert to fill a generated key.
    ///
    /// # Errors
    ///
    /// `NoPrimaryKey` if the type declares no primary key.
    pub fn assign_primary_key_attribute(&mut self, value: impl Into<Value>) -> CoreResult<()> {
        let i = self
            .entity_type
            .primary_key_index()
            .ok_or_else(|| CoreError::no_primary_key(self.entity_type.name()))?;
        self.values[i] = self.entity_type.attributes()[i].ty().cast(value.into());
        Ok(())
    }

    /// Loads a stored row. Columns that are not declared attributes are
    /// ignored; attributes absent from the row stay null.
    pub(crate) fn load(&mut self, record: Record) {
        for (name, value) in record {
            if let Some(i) = self.entity_type.index_of(&name) {
                self.values[i] = self.entity_type.attributes()[i].ty().cast(value);
            }
        }
        self.mark_persisted();
    }
}

const INSPECT_LIMIT: usize = 20;

fn inspect_value(value: &Value) -> String {
    let text = value.to_string();
    let count = text.chars().count();
    if count <= INSPECT_LIMIT {
        return text;
    }
    let head: String = text.chars().take(18).collect();
    let tail: String = text.chars().skip(count - 10).collect();
    format!("{head}...{tail}")
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<{}", self.entity_type.name())?;
        for (i, (attribute, value)) in self
            .entity_type
            .attributes()
            .iter()
            .zip(&self.values)
            .enumerate()
        {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{}={}", attribute.name(), inspect_value(value))?;
        }
        f.write_str(">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeType, BLANK};

    fn person() -> EntityType {
        EntityType::builder("Person")
            .attribute(Attribute::new("id", AttributeType::Integer).primary_key())
            .attribute(Attribute::new("name", AttributeType::String).not_null())
            .attribute(Attribute::new("score", AttributeType::Float))
            .build()
            .unwrap()
    }

    #[test]
    fn new_entity_is_clean() {
        let e = person().new_entity();
        assert_eq!(e.state(), LifecycleState::New);
        assert!(e.is_new_record());
        assert!(!e.is_changed());
        assert_eq!(e.get("name"), Some(&Value::Null));
        assert_eq!(e.get("missing"), None);
    }

    #[test]
    fn set_tracks_changes_against_snapshot() {
        let mut e = person().new_entity();
        e.set("name", "Jenny").unwrap();
        assert_eq!(e.changed(), ["name"]);

        e.set("name", Value::Null).unwrap();
        assert!(e.changed().is_empty());
    }

    #[test]
    fn set_unknown_attribute_fails() {
        let mut e = person().new_entity();
        let err = e.set("email", "x").unwrap_err();
        assert!(matches!(err, CoreError::UnknownAttribute { ref attribute, .. } if attribute == "email"));
    }

    #[test]
    fn integers_widen_into_float_attributes() {
        let e = person().new_entity().with("score", 3).unwrap();
        assert_eq!(e.get("score"), Some(&Value::Float(3.0)));
    }

    #[test]
    fn mark_persisted_clears_changes() {
        let mut e = person().new_entity().with("name", "Jenny").unwrap();
        e.mark_persisted();
        assert_eq!(e.state(), LifecycleState::Persisted);
        assert!(e.changed().is_empty());

        e.set("name", "Jen").unwrap();
        assert_eq!(e.state(), LifecycleState::Dirty);
        let changes = e.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].from, &Value::from("Jenny"));
        assert_eq!(changes[0].to, &Value::from("Jen"));
        assert_eq!(e.persisted_value("name"), Some(&Value::from("Jenny")));
    }

    #[test]
    fn assign_primary_key_bypasses_dirty_tracking() {
        let mut e = person().new_entity();
        e.assign_primary_key_attribute(42).unwrap();
        assert_eq!(e.primary_key_value(), Some(&Value::Integer(42)));
        assert!(!e.is_changed());
    }

    #[test]
    fn assign_primary_key_without_key_fails() {
        let item = EntityType::builder("Item")
            .attribute(Attribute::new("label", AttributeType::String))
            .build()
            .unwrap();
        let err = item.new_entity().assign_primary_key_attribute(1).unwrap_err();
        assert!(matches!(err, CoreError::NoPrimaryKey { .. }));
    }

    #[test]
    fn validate_populates_and_clears_errors() {
        let mut e = person().new_entity();
        assert!(!e.validate());
        assert_eq!(e.errors().get("name"), [BLANK]);

        e.set("name", "Jenny").unwrap();
        assert!(e.validate());
        assert!(e.errors().is_empty());
    }

    #[test]
    fn validate_reports_type_mismatch() {
        let mut e = person().new_entity().with("name", 12).unwrap();
        assert!(!e.validate());
        assert_eq!(e.errors().get("name"), ["must be a string"]);
    }

    #[test]
    fn debug_truncates_long_values() {
        let e = person()
            .new_entity()
            .with("id", 7)
            .unwrap()
            .with("name", "abcdefghijklmnopqrstuvwxyz")
            .unwrap();
        assert_eq!(
            format!("{e:?}"),
            "#<Person id=7, name=\"abcdefghijklmnopq...rstuvwxyz\", score=nil>"
        );
    }

    #[test]
    fn load_ignores_unknown_columns() {
        let mut e = person().new_entity();
        let mut record = Record::new();
        record.insert("id".into(), Value::Integer(1));
        record.insert("legacy".into(), Value::from("x"));
        e.load(record);
        assert!(e.is_persisted());
        assert_eq!(e.get("id"), Some(&Value::Integer(1)));
        assert_eq!(e.get("name"), Some(&Value::Null));
    }
}
