//! Persistence collaborator trait.

use crate::error::StoreResult;
use crate::id::ObjectId;
use crate::record::{DataRecord, PersistableChange, RelationQuery, Timestamp};

/// The capability the transaction engine consumes from a backing store.
///
/// Calls are synchronous request/response. The engine never assumes a
/// specific storage technology.
///
/// # Invariants
///
/// - `load` returns `Ok(None)` for an identity the store does not hold
/// - `load_relation_targets` returns records in a stable order
/// - `commit` is all-or-nothing: either every change is applied and a new
///   timestamp is returned for every inserted or updated object, or nothing
///   is applied
pub trait PersistenceStore: Send + Sync {
    /// Loads the record of one object.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn load(&self, id: &ObjectId) -> StoreResult<Option<DataRecord>>;

    /// Loads several records, preserving the order of `ids`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn load_many(&self, ids: &[ObjectId]) -> StoreResult<Vec<Option<DataRecord>>> {
        ids.iter().map(|id| self.load(id)).collect()
    }

    /// Loads the records whose foreign key points at the queried object.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn load_relation_targets(&self, query: &RelationQuery) -> StoreResult<Vec<DataRecord>>;

    /// Applies a batch of changes atomically.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::ConcurrencyViolation`] when a change was
    /// based on a stale timestamp, and other errors if the store cannot be
    /// written. No change is applied when an error is returned.
    fn commit(&self, changes: &[PersistableChange]) -> StoreResult<Vec<(ObjectId, Timestamp)>>;
}
