//! The backend capability set and reference backends.
//!
//! A backend stores records of connected types. The core drives it through
//! the [`Backend`] trait and never inspects storage directly.
//!
//! # Implementors
//!
//! - [`NullBackend`] - accepts everything, stores nothing, counts calls
//! - [`MemoryBackend`] - in-process tables, evaluates filters directly
//!
//! Other crates provide backends over real storage engines.

mod memory;
mod null;
mod stats;

pub use memory::MemoryBackend;
pub use null::NullBackend;
pub use stats::{BackendStats, StatsSnapshot};

use crate::binder::ConnectedType;
use crate::entity::Entity;
use crate::error::CoreResult;
use crate::query::{Query, Recordset};
use crate::schema::ValidationErrors;
use crate::value::{Record, Value};

/// Outcome of a single-record write.
///
/// Constraint violations detected by the backend are reported here as data
/// rather than as errors, so the lifecycle engine can turn them into
/// instance errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The record was written.
    Written,
    /// The backend refused the record.
    Rejected(ValidationErrors),
}

impl WriteOutcome {
    /// A rejection carrying one message.
    pub fn rejected(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(attribute, message);
        WriteOutcome::Rejected(errors)
    }

    /// Whether the record was written.
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written)
    }
}

/// A storage technology that connected types persist through.
///
/// All calls are blocking. Backends must be `Send + Sync`; one backend is
/// typically shared by many connected types.
///
/// # Invariants
///
/// - `create_record` on success leaves a generated primary key (if any) on
///   the instance via [`Entity::assign_primary_key_attribute`]
/// - `update_record` and `destroy_record` locate the stored row by the
///   persisted primary key value, or by every persisted value when the type
///   has no primary key
/// - query methods honour the filter, ordering, offset, limit and projection
///   of the [`Query`] they receive
pub trait Backend: Send + Sync {
    /// Diagnostic label, embedded in connected type names.
    fn describe(&self) -> String;

    /// Creates the storage structures for `ty` if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be prepared.
    fn ensure_schema(&self, ty: &ConnectedType) -> CoreResult<()>;

    /// Inserts a new record for `entity`.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure. Constraint violations are
    /// reported as [`WriteOutcome::Rejected`].
    fn create_record(&self, entity: &mut Entity, ty: &ConnectedType) -> CoreResult<WriteOutcome>;

    /// Writes the changed attributes of a persisted `entity`.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure. Constraint violations are
    /// reported as [`WriteOutcome::Rejected`].
    fn update_record(&self, entity: &mut Entity, ty: &ConnectedType) -> CoreResult<WriteOutcome>;

    /// Deletes the stored record of `entity`.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    fn destroy_record(&self, entity: &Entity, ty: &ConnectedType) -> CoreResult<()>;

    /// Loads the record whose primary key equals `value`.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    fn lookup_by_primary_key(&self, value: &Value, ty: &ConnectedType)
        -> CoreResult<Option<Entity>>;

    /// Starts a recordset over every record of `ty`.
    fn recordset(&self, ty: &ConnectedType) -> Recordset {
        Recordset::new(ty.clone())
    }

    /// Counts the records selected by `query`.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    fn count(&self, ty: &ConnectedType, query: &Query) -> CoreResult<u64>;

    /// Returns the records selected by `query`, in query order.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    fn select(&self, ty: &ConnectedType, query: &Query) -> CoreResult<Vec<Record>>;

    /// Assigns `values` on every record selected by `query`. Returns the
    /// number of records changed.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure, including constraint violations.
    fn update_all(&self, ty: &ConnectedType, query: &Query, values: &Record) -> CoreResult<u64>;

    /// Deletes every record selected by `query`. Returns the number of
    /// records deleted.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    fn delete_all(&self, ty: &ConnectedType, query: &Query) -> CoreResult<u64>;

    /// Call counters, for backends that keep them.
    fn stats(&self) -> Option<StatsSnapshot> {
        None
    }
}
