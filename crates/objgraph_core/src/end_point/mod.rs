//! Relation end-points.
//!
//! Every navigable side of a relation is represented, per object and per
//! transaction level, by a [`RelationEndPoint`]:
//!
//! - [`RealObjectEndPoint`]: the foreign key; always complete
//! - [`VirtualObjectEndPoint`]: the computed side of a one-to-one relation
//! - [`CollectionEndPoint`]: the computed side of a one-to-many relation
//!
//! Virtual end-points may be incomplete: registered, but with unknown
//! contents until they are resolved from the opposite side.

mod collection;
mod id;
mod load_state;
mod real;
mod virtual_object;

pub use collection::CollectionEndPoint;
pub use id::RelationEndPointId;
pub use real::RealObjectEndPoint;
pub use virtual_object::VirtualObjectEndPoint;

use crate::error::{CoreError, CoreResult};
use objgraph_store::ObjectId;

/// The relation state of one (object, relation property) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationEndPoint {
    /// A foreign key.
    Real(RealObjectEndPoint),
    /// A virtual reference to a single object.
    VirtualObject(VirtualObjectEndPoint),
    /// A virtual collection.
    Collection(CollectionEndPoint),
}

impl RelationEndPoint {
    /// Returns the end-point's identity.
    #[must_use]
    pub fn id(&self) -> &RelationEndPointId {
        match self {
            Self::Real(e) => e.id(),
            Self::VirtualObject(e) => e.id(),
            Self::Collection(e) => e.id(),
        }
    }

    /// Returns `true` unless this is a foreign key.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        !matches!(self, Self::Real(_))
    }

    /// Returns `true` if the contents are known.
    #[must_use]
    pub fn is_data_complete(&self) -> bool {
        match self {
            Self::Real(_) => true,
            Self::VirtualObject(e) => e.is_data_complete(),
            Self::Collection(e) => e.is_data_complete(),
        }
    }

    /// Returns `true` if the end-point has uncommitted changes.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        match self {
            Self::Real(e) => e.has_changed(),
            Self::VirtualObject(e) => e.has_changed(),
            Self::Collection(e) => e.has_changed(),
        }
    }

    /// Returns every object currently or originally referenced.
    ///
    /// Current references come first, in order; an incomplete end-point
    /// references nothing.
    #[must_use]
    pub fn opposite_object_ids(&self) -> Vec<ObjectId> {
        let (current, original): (Vec<&ObjectId>, Vec<&ObjectId>) = match self {
            Self::Real(e) => (
                e.opposite_object_id().into_iter().collect(),
                e.original_opposite_object_id().into_iter().collect(),
            ),
            Self::VirtualObject(e) => (
                e.opposite_object_id().ok().flatten().into_iter().collect(),
                e.original_opposite_object_id().into_iter().collect(),
            ),
            Self::Collection(e) => (
                e.items().map(|items| items.iter().collect()).unwrap_or_default(),
                e.original_items().iter().collect(),
            ),
        };
        let mut ids: Vec<ObjectId> = Vec::with_capacity(current.len() + original.len());
        for id in current.into_iter().chain(original) {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }

    /// Returns the currently referenced objects, or `None` if incomplete.
    #[must_use]
    pub fn current_object_ids(&self) -> Option<Vec<ObjectId>> {
        match self {
            Self::Real(e) => Some(e.opposite_object_id().cloned().into_iter().collect()),
            Self::VirtualObject(e) => e
                .opposite_object_id()
                .ok()
                .map(|id| id.cloned().into_iter().collect()),
            Self::Collection(e) => e.items().ok().map(<[ObjectId]>::to_vec),
        }
    }

    /// Returns the foreign key end-point, if this is one.
    #[must_use]
    pub fn as_real(&self) -> Option<&RealObjectEndPoint> {
        match self {
            Self::Real(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the collection end-point, if this is one.
    #[must_use]
    pub fn as_collection(&self) -> Option<&CollectionEndPoint> {
        match self {
            Self::Collection(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the virtual object end-point, if this is one.
    #[must_use]
    pub fn as_virtual_object(&self) -> Option<&VirtualObjectEndPoint> {
        match self {
            Self::VirtualObject(e) => Some(e),
            _ => None,
        }
    }

    /// Makes the current contents the committed ones.
    pub fn commit(&mut self) {
        match self {
            Self::Real(e) => e.commit(),
            Self::VirtualObject(e) => e.commit(),
            Self::Collection(e) => e.commit(),
        }
    }

    /// Restores the committed contents.
    pub fn rollback(&mut self) {
        match self {
            Self::Real(e) => e.rollback(),
            Self::VirtualObject(e) => e.rollback(),
            Self::Collection(e) => e.rollback(),
        }
    }

    /// Forgets the contents of a virtual end-point; no-op for foreign keys.
    pub(crate) fn mark_data_incomplete(&mut self) {
        match self {
            Self::Real(_) => {}
            Self::VirtualObject(e) => e.mark_data_incomplete(),
            Self::Collection(e) => e.mark_data_incomplete(),
        }
    }

    /// Makes a virtual end-point complete with the given contents.
    pub(crate) fn mark_data_complete(&mut self, items: Vec<ObjectId>) {
        match self {
            Self::Real(_) => {}
            Self::VirtualObject(e) => e.mark_data_complete(items.into_iter().next()),
            Self::Collection(e) => e.mark_data_complete(items),
        }
    }

    /// Copies the current contents of `other` into this end-point, keeping
    /// this end-point's committed contents.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EndPointIncomplete`] if either end-point is
    /// incomplete and [`CoreError::InvalidEndPoint`] if their kinds differ.
    pub(crate) fn take_current_from(&mut self, other: &RelationEndPoint) -> CoreResult<()> {
        match (self, other) {
            (Self::Real(target), Self::Real(source)) => {
                target.set_opposite_object_id(source.opposite_object_id().cloned());
                Ok(())
            }
            (Self::VirtualObject(target), Self::VirtualObject(source)) => {
                target.set_opposite_object_id(source.opposite_object_id()?.cloned())
            }
            (Self::Collection(target), Self::Collection(source)) => {
                target.set_items(source.items()?.to_vec())
            }
            (target, _) => Err(CoreError::invalid_end_point(
                target.id().clone(),
                "end-point kinds differ between transactions",
            )),
        }
    }
}
