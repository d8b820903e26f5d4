//! # objgraph Testkit
//!
//! Test utilities for objgraph.
//!
//! This crate provides:
//! - The Customer/Order/OrderItem/OrderTicket fixture domain and a populated
//!   in-memory store
//! - Recording listeners and unload hooks for event-order assertions
//! - Failure injection for listeners and hooks
//! - Hierarchy snapshots and relation-consistency checks
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use objgraph_testkit::prelude::*;
//!
//! #[test]
//! fn unload_order() {
//!     let mut fixture = TestHierarchy::new();
//!     let tx = fixture.root_transaction();
//!     fixture.get_or_load(tx, &order(1)).unwrap();
//!     UnloadService::unload_data(&mut fixture, tx, &order(1)).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod recording;
pub mod snapshot;

use tracing_subscriber::EnvFilter;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
    pub use crate::recording::*;
    pub use crate::snapshot::*;
    pub use objgraph_core::{
        CoreError, CoreResult, DataContainerState, ObjectState, RelationEndPointId,
        TransactionEvent, TransactionHierarchy, TransactionId, UnloadHook, UnloadProblem,
        UnloadService,
    };
    pub use objgraph_store::{ClassId, ObjectId, Value};
}

pub use fixtures::*;
pub use generators::*;
pub use recording::*;
pub use snapshot::*;

/// Installs a test-friendly `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`. Calling this
/// more than once is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
