//! # objgraph Store
//!
//! The persistence boundary of objgraph.
//!
//! The transaction engine in `objgraph_core` never talks to a storage
//! technology directly. It consumes the [`PersistenceStore`] capability:
//! load one record by identity, load the records that reference an object
//! through a foreign key, and commit a batch of changes with optimistic
//! concurrency on [`Timestamp`]s.
//!
//! This crate also owns the identity and value types that cross that
//! boundary ([`ObjectId`], [`ClassId`], [`Value`]) and ships
//! [`InMemoryStore`], a store that keeps every record as canonical CBOR
//! bytes.
//!
//! ## Example
//!
//! ```rust
//! use objgraph_store::{DataRecord, InMemoryStore, ObjectId, PersistenceStore, Value};
//!
//! let store = InMemoryStore::new();
//! let id = ObjectId::from_u128("Customer", 1);
//! store.insert(DataRecord::new(id.clone()).with_value("Name", Value::from("Acme")));
//!
//! let record = store.load(&id).unwrap().unwrap();
//! assert_eq!(record.values["Name"], Value::from("Acme"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod id;
mod memory;
mod record;
mod store;
mod value;

pub use error::{StoreError, StoreResult};
pub use id::{ClassId, ObjectId};
pub use memory::InMemoryStore;
pub use record::{ChangeKind, DataRecord, PersistableChange, RelationQuery, Timestamp};
pub use store::PersistenceStore;
pub use value::Value;
