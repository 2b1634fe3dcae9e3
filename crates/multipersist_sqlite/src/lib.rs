//! # Multipersist SQLite
//!
//! Embedded SQLite backend for Multipersist.
//!
//! Each connected entity type maps to one table, created on bind when
//! requested. Condition trees render to parameterized SQL, so filtering,
//! ordering, pagination and bulk writes run inside SQLite.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use multipersist_core::{Attribute, AttributeType, Binder, EntityType, Value};
//! use multipersist_sqlite::{SqliteBackend, SqliteConfig};
//! use serde_json::json;
//!
//! let person = EntityType::builder("Person")
//!     .attribute(Attribute::new("id", AttributeType::Integer).primary_key())
//!     .attribute(Attribute::new("name", AttributeType::String))
//!     .attribute(Attribute::new("age", AttributeType::Integer))
//!     .build()
//!     .unwrap();
//!
//! let backend = Arc::new(SqliteBackend::open(SqliteConfig::new()).unwrap());
//! let people = Binder::new().bind(&person, backend, true).unwrap();
//!
//! for (name, age) in [("George", 50), ("Harry", 19)] {
//!     people.build([("name", Value::from(name)), ("age", Value::from(age))]).unwrap().save().unwrap();
//! }
//!
//! let adults = people.filter(json!({"age": {"gte": 21}})).unwrap();
//! assert_eq!(adults.count().unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod config;
mod error;
mod sql;
mod value;

pub use backend::SqliteBackend;
pub use config::{Location, SqliteConfig};
pub use error::{SqliteError, SqliteResult};
pub use sql::{quote_ident, Statement};
