//! # Multipersist Core
//!
//! Storage-independent entities for Multipersist.
//!
//! This crate provides:
//! - Entity types: attributes, validation and lifecycle hooks
//! - Entity instances with dirty tracking and a save / destroy lifecycle
//! - The [`Backend`] capability set and a [`Binder`] producing
//!   [`ConnectedType`]s, one per (entity type, backend) pair
//! - Condition documents, their translation into [`FilterExpr`] trees, and
//!   [`Recordset`] queries with ordering, pagination and projection
//!
//! ## Available Backends
//!
//! - [`NullBackend`] - Stores nothing, counts calls
//! - [`MemoryBackend`] - In-process tables for tests and ephemeral data
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use multipersist_core::{Attribute, AttributeType, Binder, EntityType, MemoryBackend};
//! use serde_json::json;
//!
//! let person = EntityType::builder("Person")
//!     .table("persons")
//!     .attribute(Attribute::new("id", AttributeType::Integer).primary_key())
//!     .attribute(Attribute::new("name", AttributeType::String).not_null())
//!     .build()
//!     .unwrap();
//!
//! let binder = Binder::new();
//! let people = binder.bind(&person, Arc::new(MemoryBackend::new()), true).unwrap();
//!
//! let mut jenny = people.build([("name", "Jenny")]).unwrap();
//! assert!(jenny.save().unwrap());
//! assert!(jenny.changed().is_empty());
//!
//! let found = people.filter(json!({"name": {"like": "j%"}})).unwrap().first().unwrap();
//! assert_eq!(found.unwrap().get("id"), jenny.get("id"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod binder;
mod entity;
mod error;
mod query;
mod schema;
mod value;

pub use backend::{Backend, BackendStats, MemoryBackend, NullBackend, StatsSnapshot, WriteOutcome};
pub use binder::{Binder, ConnectedType};
pub use entity::{AttributeChange, Entity, LifecycleState};
pub use error::{BackendSource, CoreError, CoreResult};
pub use query::{
    translate, Clause, ClauseOperand, Cmp, CompiledFilter, Direction, Document, Entities,
    FilterExpr, IntoDocument, Node, Operand, OrderSpec, OrderTerm, Query, Recordset,
};
pub use schema::{
    AroundHook, Attribute, AttributeType, EntityType, EntityTypeBuilder, EntityTypeId, Hook, Hooks,
    Phase, PhaseHooks, Proceed, ValidationErrors, Validator, BLANK, CREATED_AT, TAKEN, UPDATED_AT,
};
pub use value::{Record, Value};
