//! # docview Testkit
//!
//! Test utilities for docview.
//!
//! This crate provides:
//! - Test fixtures: databases over an in-memory store, seeded documents
//! - Property-based test generators using proptest
//! - A fault-injecting store for atomicity tests
//! - Test logging setup
//!
//! ## Usage
//!
//! ```rust
//! use docview_testkit::prelude::*;
//! use serde_json::json;
//!
//! init_test_logging();
//! let db = TestDatabase::new();
//! db.seed(&[("a", json!({"type": "x", "amount": 1}))]);
//! let view = db.amounts_view("amounts");
//! assert_eq!(view.create_query().run().unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_test_logging;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;

/// Installs a `tracing` subscriber writing to the test output.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`. Safe to call from
/// every test; only the first call installs anything.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
