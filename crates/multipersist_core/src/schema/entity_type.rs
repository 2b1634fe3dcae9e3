//! Entity type descriptors.

use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::schema::hooks::{AroundHook, Hook, Hooks, Phase, PhaseHooks, Proceed};
use crate::schema::validation::{ValidationErrors, Validator, BLANK};
use crate::schema::{Attribute, AttributeType};
use crate::value::Value;
use chrono::{DateTime, SubsecRound, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TYPE_ID: AtomicU64 = AtomicU64::new(1);

/// Name of the creation timestamp added by [`EntityTypeBuilder::timestamps`].
pub const CREATED_AT: &str = "created_at";

/// Name of the modification timestamp added by [`EntityTypeBuilder::timestamps`].
pub const UPDATED_AT: &str = "updated_at";

/// Process-unique identity of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityTypeId(u64);

struct EntityTypeInner {
    id: EntityTypeId,
    name: String,
    table_name: String,
    attributes: Vec<Attribute>,
    primary_key: Option<usize>,
    validators: Vec<Validator>,
    hooks: Hooks,
}

/// A declared entity type: named attributes, persistence metadata,
/// validation rules and lifecycle hooks.
///
/// The schema is fixed once built. `EntityType` is a cheap handle; clones
/// share the same descriptor and identity.
///
/// # Example
///
/// ```rust
/// use multipersist_core::{Attribute, AttributeType, EntityType};
///
/// let person = EntityType::builder("Person")
///     .table("persons")
///     .attribute(Attribute::new("id", AttributeType::Integer).primary_key())
///     .attribute(Attribute::new("name", AttributeType::String))
///     .build()
///     .unwrap();
///
/// assert_eq!(person.primary_key().unwrap().name(), "id");
/// ```
#[derive(Clone)]
pub struct EntityType {
    inner: Arc<EntityTypeInner>,
}

impl EntityType {
    /// Starts declaring an entity type.
    pub fn builder(name: impl Into<String>) -> EntityTypeBuilder {
        EntityTypeBuilder::new(name)
    }

    /// Identity of this type.
    pub fn id(&self) -> EntityTypeId {
        self.inner.id
    }

    /// Type name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Storage table (or collection) name.
    pub fn table_name(&self) -> &str {
        &self.inner.table_name
    }

    /// Declared attributes in declaration order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.inner.attributes
    }

    /// Looks up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.index_of(name).map(|i| &self.inner.attributes[i])
    }

    /// Whether `name` is a declared attribute.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub(crate) fn index_of(&self, name: &str) -> Option<usize> {
        self.inner.attributes.iter().position(|a| a.name() == name)
    }

    /// Like [`EntityType::index_of`] but fails with `UnknownAttribute`.
    pub(crate) fn require_index(&self, name: &str) -> CoreResult<usize> {
        self.index_of(name)
            .ok_or_else(|| CoreError::unknown_attribute(self.name(), name))
    }

    /// The primary key attribute, if one is declared.
    pub fn primary_key(&self) -> Option<&Attribute> {
        self.inner.primary_key.map(|i| &self.inner.attributes[i])
    }

    pub(crate) fn primary_key_index(&self) -> Option<usize> {
        self.inner.primary_key
    }

    /// Whether a primary key is declared.
    pub fn has_primary_key(&self) -> bool {
        self.inner.primary_key.is_some()
    }

    /// Attributes declared unique (primary key excluded).
    pub fn unique_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.inner.attributes.iter().filter(|a| a.is_unique())
    }

    /// Attributes that requested an index.
    pub fn indexed_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.inner.attributes.iter().filter(|a| a.is_indexed())
    }

    /// Hooks for `phase`.
    pub fn hooks(&self, phase: Phase) -> &PhaseHooks {
        self.inner.hooks.phase(phase)
    }

    /// Creates a blank, unconnected instance. Persistence operations on it
    /// fail with `NotConnected`.
    pub fn new_entity(&self) -> Entity {
        Entity::new(self.clone(), None)
    }

    /// Runs the schema-driven checks and the custom validators.
    pub(crate) fn validate(&self, entity: &Entity, errors: &mut ValidationErrors) {
        for (attribute, value) in self.inner.attributes.iter().zip(entity.values()) {
            if attribute.is_not_null() && value.is_null() {
                errors.add(attribute.name(), BLANK);
            } else if !attribute.ty().accepts(value) {
                errors.add(attribute.name(), format!("must be a {}", attribute.ty()));
            }
        }
        for validator in &self.inner.validators {
            validator(entity, errors);
        }
    }

    /// Reasons this type cannot be bound to a backend, if any.
    pub(crate) fn binding_defect(&self) -> Option<String> {
        if self.inner.attributes.is_empty() {
            return Some("declares no attributes".to_string());
        }
        if !is_identifier(&self.inner.table_name) {
            return Some(format!("table name {:?} is not an identifier", self.inner.table_name));
        }
        self.inner
            .attributes
            .iter()
            .find(|a| !is_identifier(a.name()))
            .map(|a| format!("attribute name {:?} is not an identifier", a.name()))
    }

    /// Whether two handles refer to the same declared type.
    pub fn same_type(&self, other: &EntityType) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for EntityType {
    fn eq(&self, other: &Self) -> bool {
        self.same_type(other)
    }
}

impl Eq for EntityType {}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("name", &self.inner.name)
            .field("table", &self.inner.table_name)
            .field("attributes", &self.inner.attributes)
            .finish()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Builder for [`EntityType`].
pub struct EntityTypeBuilder {
    name: String,
    table_name: Option<String>,
    attributes: Vec<Attribute>,
    validators: Vec<Validator>,
    hooks: Hooks,
}

impl EntityTypeBuilder {
    /// Starts a declaration named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: None,
            attributes: Vec::new(),
            validators: Vec::new(),
            hooks: Hooks::default(),
        }
    }

    /// Sets the persistence table name. Defaults to the lowercased type name.
    #[must_use]
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    /// Declares an attribute.
    #[must_use]
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Adds a custom validator.
    #[must_use]
    pub fn validate<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Entity, &mut ValidationErrors) + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Registers a before-hook for `phase`.
    #[must_use]
    pub fn before<F>(mut self, phase: Phase, hook: F) -> Self
    where
        F: Fn(&mut Entity) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.hooks.phase_mut(phase).before.push(Arc::new(hook) as Hook);
        self
    }

    /// Registers an around-hook for `phase`.
    #[must_use]
    pub fn around<F>(mut self, phase: Phase, hook: F) -> Self
    where
        F: Fn(&mut Entity, Proceed<'_>) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.hooks.phase_mut(phase).around.push(Arc::new(hook) as AroundHook);
        self
    }

    /// Registers an after-hook for `phase`.
    #[must_use]
    pub fn after<F>(mut self, phase: Phase, hook: F) -> Self
    where
        F: Fn(&mut Entity) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.hooks.phase_mut(phase).after.push(Arc::new(hook) as Hook);
        self
    }

    /// Adds `created_at` / `updated_at` timestamps maintained by hooks.
    ///
    /// Stamps have microsecond precision. Create stamps both; update refreshes `updated_at` only when the
    /// instance has changes.
    #[must_use]
    pub fn timestamps(self) -> Self {
        self.attribute(Attribute::new(CREATED_AT, AttributeType::DateTime))
            .attribute(Attribute::new(UPDATED_AT, AttributeType::DateTime))
            .before(Phase::Create, |entity| {
                let stamp = Value::DateTime(now());
                entity.set(CREATED_AT, stamp.clone())?;
                entity.set(UPDATED_AT, stamp)
            })
            .before(Phase::Update, |entity| {
                if entity.is_changed() {
                    entity.set(UPDATED_AT, now())?;
                }
                Ok(())
            })
    }

    /// Finishes the declaration.
    ///
    /// # Errors
    ///
    /// - `DuplicatePrimaryKey` if more than one attribute is a primary key
    /// - `DuplicateAttribute` if an attribute name repeats
    pub fn build(self) -> CoreResult<EntityType> {
        let mut primary_key: Option<usize> = None;
        for (i, attribute) in self.attributes.iter().enumerate() {
            if self.attributes[..i].iter().any(|a| a.name() == attribute.name()) {
                return Err(CoreError::DuplicateAttribute {
                    entity: self.name,
                    attribute: attribute.name().to_string(),
                });
            }
            if attribute.is_primary_key() {
                if let Some(first) = primary_key {
                    return Err(CoreError::DuplicatePrimaryKey {
                        entity: self.name,
                        first: self.attributes[first].name().to_string(),
                        second: attribute.name().to_string(),
                    });
                }
                primary_key = Some(i);
            }
        }

        let table_name = self
            .table_name
            .unwrap_or_else(|| self.name.to_ascii_lowercase());

        Ok(EntityType {
            inner: Arc::new(EntityTypeInner {
                id: EntityTypeId(NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed)),
                name: self.name,
                table_name,
                attributes: self.attributes,
                primary_key,
                validators: self.validators,
                hooks: self.hooks,
            }),
        })
    }
}

/// Current time at the precision timestamps are stored with.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> EntityTypeBuilder {
        EntityType::builder("Person")
            .table("persons")
            .attribute(Attribute::new("id", AttributeType::Integer).primary_key())
            .attribute(Attribute::new("name", AttributeType::String))
    }

    #[test]
    fn build_records_primary_key() {
        let ty = person().build().unwrap();
        assert_eq!(ty.table_name(), "persons");
        assert_eq!(ty.primary_key().unwrap().name(), "id");
        assert!(ty.has_attribute("name"));
        assert!(!ty.has_attribute("email"));
    }

    #[test]
    fn two_primary_keys_are_rejected() {
        let result = person()
            .attribute(Attribute::new("code", AttributeType::String).primary_key())
            .build();
        assert!(matches!(
            result,
            Err(CoreError::DuplicatePrimaryKey { ref first, ref second, .. })
                if first == "id" && second == "code"
        ));
    }

    #[test]
    fn duplicate_attribute_is_rejected() {
        let result = person()
            .attribute(Attribute::new("name", AttributeType::String))
            .build();
        assert!(matches!(result, Err(CoreError::DuplicateAttribute { .. })));
    }

    #[test]
    fn table_defaults_to_lowercase_name() {
        let ty = EntityType::builder("Widget")
            .attribute(Attribute::new("label", AttributeType::String))
            .build()
            .unwrap();
        assert_eq!(ty.table_name(), "widget");
        assert!(!ty.has_primary_key());
    }

    #[test]
    fn each_build_has_its_own_identity() {
        let a = person().build().unwrap();
        let b = person().build().unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn binding_defects() {
        let empty = EntityType::builder("Empty").build().unwrap();
        assert!(empty.binding_defect().is_some());

        let bad_table = person().table("bad table").build().unwrap();
        assert!(bad_table.binding_defect().is_some());

        assert!(person().build().unwrap().binding_defect().is_none());
    }

    #[test]
    fn timestamps_declare_attributes_and_hooks() {
        let ty = person().timestamps().build().unwrap();
        assert!(ty.has_attribute(CREATED_AT));
        assert!(ty.has_attribute(UPDATED_AT));
        assert_eq!(ty.hooks(Phase::Create).before.len(), 1);
        assert_eq!(ty.hooks(Phase::Update).before.len(), 1);
        assert!(ty.hooks(Phase::Destroy).is_empty());
    }
}
