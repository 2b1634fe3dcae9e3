//! Backend call counters.
//!
//! Backends record every capability invocation here so callers can observe
//! how often storage was touched.
//!
//! # Usage
//!
//! ```rust
//! use multipersist_core::{Backend, NullBackend};
//!
//! let backend = NullBackend::new();
//! let stats = backend.stats().unwrap();
//! assert_eq!(stats.total(), 0);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Backend operation counters.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct BackendStats {
    /// Record inserts.
    creates: AtomicU64,
    /// Single-record updates.
    updates: AtomicU64,
    /// Single-record deletes.
    destroys: AtomicU64,
    /// Primary-key lookups.
    lookups: AtomicU64,
    /// Schema ensure calls.
    schema_ensures: AtomicU64,
    /// Recordset counts and selects.
    queries: AtomicU64,
    /// Recordset bulk updates and deletes.
    bulk_writes: AtomicU64,
    /// Writes refused with a constraint violation.
    rejections: AtomicU64,
}

impl BackendStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an insert.
    pub fn record_create(&self) {
        self.creates.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an update.
    pub fn record_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a delete.
    pub fn record_destroy(&self) {
        self.destroys.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a primary-key lookup.
    pub fn record_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a schema ensure.
    pub fn record_schema_ensure(&self) {
        self.schema_ensures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a count or select.
    pub fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a bulk update or delete.
    pub fn record_bulk_write(&self) {
        self.bulk_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a refused write.
    pub fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            creates: self.creates.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            destroys: self.destroys.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
            schema_ensures: self.schema_ensures.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            bulk_writes: self.bulk_writes.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of backend counters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Record inserts.
    pub creates: u64,
    /// Single-record updates.
    pub updates: u64,
    /// Single-record deletes.
    pub destroys: u64,
    /// Primary-key lookups.
    pub lookups: u64,
    /// Schema ensure calls.
    pub schema_ensures: u64,
    /// Recordset counts and selects.
    pub queries: u64,
    /// Recordset bulk updates and deletes.
    pub bulk_writes: u64,
    /// Writes refused with a constraint violation.
    pub rejections: u64,
}

impl StatsSnapshot {
    /// Number of capability calls of any kind. Rejections are already
    /// counted as creates or updates.
    pub fn total(&self) -> u64 {
        self.creates
            + self.updates
            + self.destroys
            + self.lookups
            + self.schema_ensures
            + self.queries
            + self.bulk_writes
    }

    /// Number of record-level writes (create, update, destroy).
    pub fn writes(&self) -> u64 {
        self.creates + self.updates + self.destroys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = BackendStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
        assert_eq!(stats.snapshot().total(), 0);
    }

    #[test]
    fn record_operations() {
        let stats = BackendStats::new();
        stats.record_create();
        stats.record_create();
        stats.record_rejection();
        stats.record_update();
        stats.record_query();

        let snap = stats.snapshot();
        assert_eq!(snap.creates, 2);
        assert_eq!(snap.rejections, 1);
        assert_eq!(snap.writes(), 3);
        assert_eq!(snap.total(), 4);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(BackendStats::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let s = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    s.record_lookup();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(stats.snapshot().lookups, 1000);
    }
}
