//! Error types for the transaction engine.

use crate::end_point::RelationEndPointId;
use crate::types::TransactionId;
use crate::unload::UnloadProblem;
use objgraph_store::{ClassId, ObjectId, StoreError};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in objgraph core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The persistence store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The store does not hold the requested object.
    #[error("object {object_id} could not be found")]
    ObjectNotFound {
        /// The missing object.
        object_id: ObjectId,
    },

    /// The object is invalid in this transaction; nothing can be done with it.
    #[error("object {object_id} is invalid in {transaction_id}")]
    ObjectInvalid {
        /// The invalid object.
        object_id: ObjectId,
        /// The transaction in which it is invalid.
        transaction_id: TransactionId,
    },

    /// The object has been deleted in this transaction.
    #[error("object {object_id} is deleted in {transaction_id}")]
    ObjectDeleted {
        /// The deleted object.
        object_id: ObjectId,
        /// The transaction in which it is deleted.
        transaction_id: TransactionId,
    },

    /// The object is part of an unload whose notifications are in progress.
    #[error("object {object_id} is being unloaded")]
    ObjectBeingUnloaded {
        /// The object being unloaded.
        object_id: ObjectId,
    },

    /// The class is not part of the mapping.
    #[error("class {class_id} is not mapped")]
    UnknownClass {
        /// The unknown class.
        class_id: ClassId,
    },

    /// The property is not defined on the class.
    #[error("class {class_id} has no property '{property}'")]
    UnknownProperty {
        /// The class searched.
        class_id: ClassId,
        /// The property that was not found.
        property: String,
    },

    /// The end-point cannot be used for the requested operation.
    #[error("invalid end-point {end_point_id}: {message}")]
    InvalidEndPoint {
        /// The end-point.
        end_point_id: RelationEndPointId,
        /// Why it cannot be used.
        message: String,
    },

    /// The end-point's contents have not been loaded.
    #[error("end-point {end_point_id} is not complete")]
    EndPointIncomplete {
        /// The incomplete end-point.
        end_point_id: RelationEndPointId,
    },

    /// The object cannot be placed into the relation.
    #[error("object {target} cannot be related through {end_point_id}: {message}")]
    InvalidRelationTarget {
        /// The end-point being modified.
        end_point_id: RelationEndPointId,
        /// The rejected object.
        target: ObjectId,
        /// Why it was rejected.
        message: String,
    },

    /// Loaded relation data contradicts the mapping.
    #[error("inconsistent relation data for {end_point_id}: {message}")]
    InconsistentRelation {
        /// The end-point whose data is inconsistent.
        end_point_id: RelationEndPointId,
        /// Description of the inconsistency.
        message: String,
    },

    /// The unload targets data that is new, changed or deleted.
    #[error("cannot unload: {}", format_problems(.problems))]
    NotUnloadable {
        /// Every offending container or end-point.
        problems: Vec<UnloadProblem>,
    },

    /// The unload would leave a relation half-evicted.
    #[error("unload would leave relations inconsistent: {}", format_problems(.problems))]
    InconsistentUnload {
        /// Every offending end-point.
        problems: Vec<UnloadProblem>,
    },

    /// The transaction is not part of this hierarchy (or was discarded).
    #[error("transaction {transaction_id} not found")]
    TransactionNotFound {
        /// The unknown transaction.
        transaction_id: TransactionId,
    },

    /// The transaction has an active sub-transaction and cannot be modified.
    #[error("transaction {transaction_id} is read-only while it has a sub-transaction")]
    TransactionReadOnly {
        /// The read-only transaction.
        transaction_id: TransactionId,
    },

    /// The mapping is malformed.
    #[error("invalid mapping: {message}")]
    InvalidMapping {
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// An error raised by a listener or unload hook.
    #[error("callback failed: {source}")]
    Callback {
        /// The error returned by the callback.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl CoreError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an invalid mapping error.
    pub fn invalid_mapping(message: impl Into<String>) -> Self {
        Self::InvalidMapping {
            message: message.into(),
        }
    }

    /// Creates an invalid end-point error.
    pub fn invalid_end_point(end_point_id: RelationEndPointId, message: impl Into<String>) -> Self {
        Self::InvalidEndPoint {
            end_point_id,
            message: message.into(),
        }
    }

    /// Wraps an error raised inside a listener or hook.
    pub fn callback(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Callback {
            source: source.into(),
        }
    }

    /// Creates an unload rejection from the collected problems.
    ///
    /// Structural problems take precedence: if any problem is structural the
    /// whole rejection is reported as [`CoreError::InconsistentUnload`].
    pub(crate) fn unload_rejected(problems: Vec<UnloadProblem>) -> Self {
        if problems.iter().any(UnloadProblem::is_structural) {
            Self::InconsistentUnload { problems }
        } else {
            Self::NotUnloadable { problems }
        }
    }

    /// Returns `true` if this is an unload validation failure.
    ///
    /// The `try_*` unload operations turn these into `false` when the
    /// unload itself was rejected. The same error returned by a listener or
    /// hook is passed on unchanged.
    #[must_use]
    pub fn is_unload_rejection(&self) -> bool {
        matches!(
            self,
            Self::NotUnloadable { .. } | Self::InconsistentUnload { .. }
        )
    }

    /// Returns the unload problems carried by a rejection.
    #[must_use]
    pub fn unload_problems(&self) -> &[UnloadProblem] {
        match self {
            Self::NotUnloadable { problems } | Self::InconsistentUnload { problems } => problems,
            _ => &[],
        }
    }
}

fn format_problems(problems: &[UnloadProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
