//! Binding entity types to backends.
//!
//! A [`Binder`] turns an [`EntityType`] plus a [`Backend`] into a
//! [`ConnectedType`]: the same schema, validators and hooks, with
//! persistence routed to that backend. One connected type exists per
//! (entity type, backend) pair for the lifetime of the binder.

use crate::backend::Backend;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::query::{IntoDocument, Recordset};
use crate::schema::{EntityType, EntityTypeId};
use crate::value::{Record, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

struct ConnectedInner {
    entity_type: EntityType,
    backend: Arc<dyn Backend>,
    name: String,
}

/// An entity type bound to exactly one backend.
///
/// Cheap to clone; clones share identity. Instances created through a
/// connected type save through its backend.
#[derive(Clone)]
pub struct ConnectedType {
    inner: Arc<ConnectedInner>,
}

impl ConnectedType {
    fn new(entity_type: EntityType, backend: Arc<dyn Backend>) -> Self {
        let detail = backend.describe();
        let name = if detail.is_empty() {
            entity_type.name().to_string()
        } else {
            format!("{}@{}[{}]", entity_type.name(), detail, entity_type.table_name())
        };
        Self {
            inner: Arc::new(ConnectedInner {
                entity_type,
                backend,
                name,
            }),
        }
    }

    /// The underlying entity type.
    pub fn entity_type(&self) -> &EntityType {
        &self.inner.entity_type
    }

    /// The backend this type persists through.
    pub fn backend(&self) -> &dyn Backend {
        self.inner.backend.as_ref()
    }

    /// Display name, `Type@backend-detail[table]`.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Storage table name.
    pub fn table_name(&self) -> &str {
        self.inner.entity_type.table_name()
    }

    /// Creates a new, unsaved instance.
    pub fn new_entity(&self) -> Entity {
        Entity::new(self.inner.entity_type.clone(), Some(self.clone()))
    }

    /// Creates a new instance with initial values.
    ///
    /// # Errors
    ///
    /// `UnknownAttribute` if a name is not declared.
    pub fn build<I, K, V>(&self, values: I) -> CoreResult<Entity>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut entity = self.new_entity();
        for (name, value) in values {
            entity.set(name.as_ref(), value)?;
        }
        Ok(entity)
    }

    /// Creates the backing storage if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Backend failures.
    pub fn ensure_schema(&self) -> CoreResult<()> {
        self.backend().ensure_schema(self)
    }

    /// A recordset over all records.
    pub fn all(&self) -> Recordset {
        self.backend().recordset(self)
    }

    /// A recordset restricted by a condition document.
    ///
    /// # Errors
    ///
    /// Translation errors of the document.
    pub fn filter(&self, document: impl IntoDocument) -> CoreResult<Recordset> {
        let mut recordset = self.all();
        recordset.filter(document)?;
        Ok(recordset)
    }

    /// Looks up one record by primary key.
    ///
    /// # Errors
    ///
    /// `NoPrimaryKey` if the type declares none, and backend failures.
    pub fn find(&self, value: impl Into<Value>) -> CoreResult<Option<Entity>> {
        if !self.entity_type().has_primary_key() {
            return Err(CoreError::no_primary_key(self.entity_type().name()));
        }
        self.backend().lookup_by_primary_key(&value.into(), self)
    }

    /// Turns a stored row into a persisted instance with no changes.
    pub fn materialize(&self, record: Record) -> Entity {
        let mut entity = self.new_entity();
        entity.load(record);
        entity
    }

    /// Whether two handles are the same binding.
    pub fn same_type(&self, other: &ConnectedType) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for ConnectedType {
    fn eq(&self, other: &Self) -> bool {
        self.same_type(other)
    }
}

impl Eq for ConnectedType {}

impl fmt::Debug for ConnectedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

impl fmt::Display for ConnectedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BindingKey {
    entity_type: EntityTypeId,
    backend: usize,
}

impl BindingKey {
    fn new(entity_type: &EntityType, backend: &Arc<dyn Backend>) -> Self {
        Self {
            entity_type: entity_type.id(),
            // Cached bindings hold the Arc, so the address stays unique.
            backend: Arc::as_ptr(backend).cast::<()>() as usize,
        }
    }
}

/// Produces and caches connected types.
///
/// # Thread Safety
///
/// The cache lock is held only to look up and insert bindings; schema
/// ensures run outside it, so slow DDL for one pair does not block others.
/// Concurrent first binds of the same pair may each build a candidate, but
/// only the first inserted is cached and every caller receives that one.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use multipersist_core::{Attribute, AttributeType, Backend, Binder, EntityType, NullBackend};
///
/// let vector = EntityType::builder("Vector")
///     .attribute(Attribute::new("x", AttributeType::Float))
///     .build()
///     .unwrap();
///
/// let binder = Binder::new();
/// let backend: Arc<dyn Backend> = Arc::new(NullBackend::new());
/// let a = binder.bind(&vector, backend.clone(), false).unwrap();
/// let b = binder.bind(&vector, backend, false).unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.name(), "Vector@null[vector]");
/// ```
#[derive(Default)]
pub struct Binder {
    bindings: Mutex<HashMap<BindingKey, ConnectedType>>,
}

impl Binder {
    /// Creates a binder with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the connected type for `entity_type` on `backend`, creating
    /// and caching it on first use.
    ///
    /// With `ensure_schema` the backend's schema-ensure operation runs for
    /// the type, also when the binding was already cached.
    ///
    /// # Errors
    ///
    /// - `InvalidEntityType` if the type cannot be stored (no attributes, or
    ///   names that are not identifiers)
    /// - backend failures from the schema ensure; nothing is cached then
    pub fn bind(
        &self,
        entity_type: &EntityType,
        backend: Arc<dyn Backend>,
        ensure_schema: bool,
    ) -> CoreResult<ConnectedType> {
        if let Some(reason) = entity_type.binding_defect() {
            return Err(CoreError::invalid_entity_type(entity_type.name(), reason));
        }

        let key = BindingKey::new(entity_type, &backend);
        let cached = self.bindings.lock().get(&key).cloned();
        if let Some(connected) = cached {
            trace!(entity = %connected.name(), "binding cache hit");
            if ensure_schema {
                connected.ensure_schema()?;
            }
            return Ok(connected);
        }

        // Built and ensured outside the lock; the first insert wins.
        let candidate = ConnectedType::new(entity_type.clone(), backend);
        if ensure_schema {
            candidate.ensure_schema()?;
        }
        let connected = self
            .bindings
            .lock()
            .entry(key)
            .or_insert_with(|| {
                debug!(entity = %candidate.name(), "bound entity type");
                candidate
            })
            .clone();
        Ok(connected)
    }

    /// Number of cached bindings.
    pub fn len(&self) -> usize {
        self.bindings.lock().len()
    }

    /// Whether no binding was made yet.
    pub fn is_empty(&self) -> bool {
        self.bindings.lock().is_empty()
    }
}

impl fmt::Debug for Binder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder").field("bindings", &self.len()).finish()
    }
}
