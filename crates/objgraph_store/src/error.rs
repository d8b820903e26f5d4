//! Error types for persistence operations.

use crate::id::ObjectId;
use crate::record::Timestamp;
use std::io;
use thiserror::Error;

/// Result type for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to a persistence store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored record could not be decoded.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// A record could not be encoded.
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// An update or delete referenced an object the store does not hold.
    #[error("object {object_id} does not exist in the store")]
    NotFound {
        /// The missing object.
        object_id: ObjectId,
    },

    /// An insert referenced an object the store already holds.
    #[error("object {object_id} already exists in the store")]
    DuplicateObject {
        /// The duplicated object.
        object_id: ObjectId,
    },

    /// The stored timestamp no longer matches the one the change was based on.
    #[error(
        "concurrency violation on {object_id}: expected timestamp {expected:?}, found {actual}"
    )]
    ConcurrencyViolation {
        /// The conflicting object.
        object_id: ObjectId,
        /// Timestamp the change was based on.
        expected: Option<Timestamp>,
        /// Timestamp currently stored.
        actual: Timestamp,
    },
}
