//! Relation definitions.

use objgraph_store::ClassId;

/// How many objects one side of a relation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// At most one object.
    One,
    /// An ordered collection of objects.
    Many,
}

/// One side of a relation.
///
/// The *real* side stores the foreign key and always has cardinality
/// [`Cardinality::One`]. The *virtual* side is computed by querying the real
/// side. A side without a property is anonymous: it cannot be navigated and
/// no end-point is ever registered for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationEndPointDefinition {
    /// Class owning this side.
    pub class_id: ClassId,
    /// Relation property; `None` for an anonymous side.
    pub property: Option<String>,
    /// Cardinality of this side.
    pub cardinality: Cardinality,
    /// Whether this side is computed from the opposite side.
    pub is_virtual: bool,
}

impl RelationEndPointDefinition {
    /// The foreign-key-bearing side.
    #[must_use]
    pub fn real(class_id: impl Into<ClassId>, property: &str) -> Self {
        Self {
            class_id: class_id.into(),
            property: Some(property.to_string()),
            cardinality: Cardinality::One,
            is_virtual: false,
        }
    }

    /// A virtual side referring to a single object.
    #[must_use]
    pub fn virtual_object(class_id: impl Into<ClassId>, property: &str) -> Self {
        Self {
            class_id: class_id.into(),
            property: Some(property.to_string()),
            cardinality: Cardinality::One,
            is_virtual: true,
        }
    }

    /// A virtual side holding a collection.
    #[must_use]
    pub fn collection(class_id: impl Into<ClassId>, property: &str) -> Self {
        Self {
            class_id: class_id.into(),
            property: Some(property.to_string()),
            cardinality: Cardinality::Many,
            is_virtual: true,
        }
    }

    /// An unnavigable side.
    #[must_use]
    pub fn anonymous(class_id: impl Into<ClassId>) -> Self {
        Self {
            class_id: class_id.into(),
            property: None,
            cardinality: Cardinality::Many,
            is_virtual: true,
        }
    }

    /// Returns `true` if this side has no property.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.property.is_none()
    }
}

/// A bidirectional relation between two classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDefinition {
    /// Relation name, unique within the mapping.
    pub id: String,
    /// Both sides of the relation.
    pub end_points: [RelationEndPointDefinition; 2],
}

impl RelationDefinition {
    /// Creates a relation from its two sides.
    #[must_use]
    pub fn new(
        id: &str,
        first: RelationEndPointDefinition,
        second: RelationEndPointDefinition,
    ) -> Self {
        Self {
            id: id.to_string(),
            end_points: [first, second],
        }
    }
}
