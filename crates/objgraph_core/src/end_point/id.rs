//! Relation end-point identity.

use objgraph_store::ObjectId;
use std::fmt;

/// Identifies the relation state of one (object, relation property) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelationEndPointId {
    /// The owning object.
    pub object_id: ObjectId,
    /// The relation property on the owning object's class.
    pub property: String,
}

impl RelationEndPointId {
    /// Creates an end-point ID.
    #[must_use]
    pub fn new(object_id: ObjectId, property: &str) -> Self {
        Self {
            object_id,
            property: property.to_string(),
        }
    }
}

impl fmt::Display for RelationEndPointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.object_id, self.property)
    }
}
