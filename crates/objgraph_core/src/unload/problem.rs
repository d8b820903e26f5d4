//! Reasons an unload is refused.

use crate::data::DataContainerState;
use crate::end_point::RelationEndPointId;
use crate::types::TransactionId;
use objgraph_store::ObjectId;
use std::fmt;

/// One reason an unload cannot proceed.
///
/// The first three variants are ineligibility problems: the targeted data
/// itself has pending changes. The others are structural: unloading would
/// leave a relation whose two sides disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnloadProblem {
    /// A data container is not unchanged.
    ObjectState {
        /// The object.
        object_id: ObjectId,
        /// Its container state.
        state: DataContainerState,
        /// Where the container lives.
        transaction_id: TransactionId,
    },
    /// An end-point to be unloaded has changed.
    ChangedEndPoint {
        /// The end-point.
        end_point_id: RelationEndPointId,
        /// Where the end-point lives.
        transaction_id: TransactionId,
    },
    /// A virtual end-point belongs to a new or deleted object.
    OwnerState {
        /// The end-point.
        end_point_id: RelationEndPointId,
        /// The owner's container state.
        state: DataContainerState,
        /// Where the owner lives.
        transaction_id: TransactionId,
    },
    /// The opposite of an end-point to be unloaded has changed.
    ChangedOpposite {
        /// The end-point to be unloaded.
        end_point_id: RelationEndPointId,
        /// Its changed opposite.
        opposite_id: RelationEndPointId,
        /// Where both live.
        transaction_id: TransactionId,
    },
    /// An item of a collection to be unloaded is not unchanged.
    ItemNotUnchanged {
        /// The collection end-point.
        end_point_id: RelationEndPointId,
        /// The item.
        object_id: ObjectId,
        /// The item's container state.
        state: DataContainerState,
        /// Where the item lives.
        transaction_id: TransactionId,
    },
    /// An end-point would be unloaded while an object it relates to stays.
    StrandedRelation {
        /// The end-point.
        end_point_id: RelationEndPointId,
        /// The object left behind.
        object_id: ObjectId,
        /// Where the relation lives.
        transaction_id: TransactionId,
    },
}

impl UnloadProblem {
    /// Returns `true` for structural-consistency problems.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::ChangedOpposite { .. } | Self::ItemNotUnchanged { .. } | Self::StrandedRelation { .. }
        )
    }

    /// Returns the transaction the problem was found in.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        match self {
            Self::ObjectState { transaction_id, .. }
            | Self::ChangedEndPoint { transaction_id, .. }
            | Self::OwnerState { transaction_id, .. }
            | Self::ChangedOpposite { transaction_id, .. }
            | Self::ItemNotUnchanged { transaction_id, .. }
            | Self::StrandedRelation { transaction_id, .. } => *transaction_id,
        }
    }
}

impl fmt::Display for UnloadProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectState {
                object_id,
                state,
                transaction_id,
            } => write!(f, "object {object_id} is {state} in {transaction_id}"),
            Self::ChangedEndPoint {
                end_point_id,
                transaction_id,
            } => write!(f, "end-point {end_point_id} has changed in {transaction_id}"),
            Self::OwnerState {
                end_point_id,
                state,
                transaction_id,
            } => write!(
                f,
                "end-point {end_point_id} belongs to an object that is {state} in {transaction_id}"
            ),
            Self::ChangedOpposite {
                end_point_id,
                opposite_id,
                transaction_id,
            } => write!(
                f,
                "opposite end-point {opposite_id} of {end_point_id} has changed in {transaction_id}"
            ),
            Self::ItemNotUnchanged {
                end_point_id,
                object_id,
                state,
                transaction_id,
            } => write!(
                f,
                "item {object_id} of {end_point_id} is {state} in {transaction_id}"
            ),
            Self::StrandedRelation {
                end_point_id,
                object_id,
                transaction_id,
            } => write!(
                f,
                "end-point {end_point_id} would be unloaded while related object {object_id} \
                 stays loaded in {transaction_id}"
            ),
        }
    }
}
