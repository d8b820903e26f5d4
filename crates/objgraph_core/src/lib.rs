//! # objgraph Core
//!
//! Transactional object-graph engine for objgraph.
//!
//! This crate provides:
//! - Mapping metadata describing classes, data properties and relations
//! - `DataContainer`s holding the persisted field state of loaded objects
//! - Relation end-points (real, virtual object, virtual collection)
//! - A per-transaction `DataManager` identity map
//! - Nested transaction hierarchies with lazy loading from a
//!   [`PersistenceStore`](objgraph_store::PersistenceStore), commit and rollback
//! - Ordered listener and per-object hook notification
//! - `UnloadService`: atomic, hierarchy-wide eviction of cached state
//!
//! ## Example
//!
//! ```rust,ignore
//! use objgraph_core::{TransactionHierarchy, UnloadService};
//!
//! let mut hierarchy = TransactionHierarchy::new(mapping, store);
//! let tx = hierarchy.root_transaction();
//!
//! let number = hierarchy.property(tx, &order_id, "OrderNumber")?;
//! UnloadService::unload_data(&mut hierarchy, tx, &order_id)?;
//!
//! // The next access reloads the object from the store
//! assert_eq!(hierarchy.property(tx, &order_id, "OrderNumber")?, number);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod data;
mod data_manager;
mod end_point;
mod error;
mod listener;
mod mapping;
mod transaction;
mod types;
mod unload;

pub use config::Config;
pub use data::{DataContainer, DataContainerState, ObjectChange, ObjectState};
pub use data_manager::DataManager;
pub use end_point::{
    CollectionEndPoint, RealObjectEndPoint, RelationEndPoint, RelationEndPointId,
    VirtualObjectEndPoint,
};
pub use error::{CoreError, CoreResult};
pub use listener::{ClientTransactionListener, TransactionEvent, UnloadHook};
pub use mapping::{
    Cardinality, ClassDefinition, MappingBuilder, MappingConfiguration, PropertyDefinition,
    RelationDefinition, RelationEndPointDefinition,
};
pub use transaction::{ClientTransaction, TransactionHierarchy, TransactionScope};
pub use types::TransactionId;
pub use unload::{UnloadProblem, UnloadService};

pub use objgraph_store::{ClassId, ObjectId, Value};
