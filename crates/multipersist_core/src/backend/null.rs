//! A backend that stores nothing.

use crate::backend::{Backend, BackendStats, StatsSnapshot, WriteOutcome};
use crate::binder::ConnectedType;
use crate::entity::Entity;
use crate::error::CoreResult;
use crate::query::Query;
use crate::value::{Record, Value};

/// A backend that accepts every write and never returns data.
///
/// Useful for exercising the lifecycle engine: every call is counted so
/// tests can assert exactly how often storage was reached.
///
/// # Example
///
/// ```rust
/// use multipersist_core::NullBackend;
///
/// let backend = NullBackend::new();
/// assert_eq!(backend.snapshot().total(), 0);
/// ```
#[derive(Debug, Default)]
pub struct NullBackend {
    stats: BackendStats,
}

impl NullBackend {
    /// Creates a new null backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current call counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Backend for NullBackend {
    fn describe(&self) -> String {
        "null".to_string()
    }

    fn ensure_schema(&self, _ty: &ConnectedType) -> CoreResult<()> {
        self.stats.record_schema_ensure();
        Ok(())
    }

    fn create_record(&self, _entity: &mut Entity, _ty: &ConnectedType) -> CoreResult<WriteOutcome> {
        self.stats.record_create();
        Ok(WriteOutcome::Written)
    }

    fn update_record(&self, _entity: &mut Entity, _ty: &ConnectedType) -> CoreResult<WriteOutcome> {
        self.stats.record_update();
        Ok(WriteOutcome::Written)
    }

    fn destroy_record(&self, _entity: &Entity, _ty: &ConnectedType) -> CoreResult<()> {
        self.stats.record_destroy();
        Ok(())
    }

    fn lookup_by_primary_key(
        &self,
        _value: &Value,
        _ty: &ConnectedType,
    ) -> CoreResult<Option<Entity>> {
        self.stats.record_lookup();
        Ok(None)
    }

    fn count(&self, _ty: &ConnectedType, _query: &Query) -> CoreResult<u64> {
        self.stats.record_query();
        Ok(0)
    }

    fn select(&self, _ty: &ConnectedType, _query: &Query) -> CoreResult<Vec<Record>> {
        self.stats.record_query();
        Ok(Vec::new())
    }

    fn update_all(&self, _ty: &ConnectedType, _query: &Query, _values: &Record) -> CoreResult<u64> {
        self.stats.record_bulk_write();
        Ok(0)
    }

    fn delete_all(&self, _ty: &ConnectedType, _query: &Query) -> CoreResult<u64> {
        self.stats.record_bulk_write();
        Ok(0)
    }

    fn stats(&self) -> Option<StatsSnapshot> {
        Some(self.stats.snapshot())
    }
}
