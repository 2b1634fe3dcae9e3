//! # Multipersist Testkit
//!
//! Test utilities for Multipersist.
//!
//! This crate provides:
//! - Entity type fixtures and seed data
//! - Property-based test generators using proptest
//! - A conformance suite every backend is expected to pass
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use multipersist_testkit::prelude::*;
//!
//! #[test]
//! fn my_backend_conforms() {
//!     run_conformance(|| Arc::new(MyBackend::new()));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod conformance;
pub mod fixtures;
pub mod generators;

use std::sync::Once;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::conformance::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
}

pub use conformance::*;
pub use fixtures::*;
pub use generators::*;

/// Installs a test-friendly tracing subscriber once per process.
///
/// The filter comes from `RUST_LOG`; output goes through the test harness
/// so it is only shown for failing tests.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
