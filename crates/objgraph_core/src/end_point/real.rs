//! Foreign-key-bearing end-points.

use super::id::RelationEndPointId;
use objgraph_store::ObjectId;

/// The real side of a relation: a foreign key held by the owning object.
///
/// A real end-point is always complete. It is registered together with its
/// owner's data container and unregistered with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealObjectEndPoint {
    id: RelationEndPointId,
    original: Option<ObjectId>,
    current: Option<ObjectId>,
}

impl RealObjectEndPoint {
    /// Creates an unchanged end-point pointing at `opposite`.
    #[must_use]
    pub fn new(id: RelationEndPointId, opposite: Option<ObjectId>) -> Self {
        Self {
            id,
            original: opposite.clone(),
            current: opposite,
        }
    }

    /// Returns the end-point's identity.
    #[must_use]
    pub fn id(&self) -> &RelationEndPointId {
        &self.id
    }

    /// Returns the object currently referenced.
    #[must_use]
    pub fn opposite_object_id(&self) -> Option<&ObjectId> {
        self.current.as_ref()
    }

    /// Returns the object referenced at the last commit.
    #[must_use]
    pub fn original_opposite_object_id(&self) -> Option<&ObjectId> {
        self.original.as_ref()
    }

    /// Points the foreign key at another object.
    pub fn set_opposite_object_id(&mut self, opposite: Option<ObjectId>) {
        self.current = opposite;
    }

    /// Returns `true` if the foreign key differs from the committed one.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.current != self.original
    }

    /// Makes the current reference the committed one.
    pub fn commit(&mut self) {
        self.original.clone_from(&self.current);
    }

    /// Restores the committed reference.
    pub fn rollback(&mut self) {
        self.current.clone_from(&self.original);
    }
}
