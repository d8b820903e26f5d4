//! Virtual end-points referring to a single object.

use super::id::RelationEndPointId;
use super::load_state::LoadState;
use crate::error::{CoreError, CoreResult};
use objgraph_store::ObjectId;

/// The virtual side of a one-to-one relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualObjectEndPoint {
    id: RelationEndPointId,
    state: LoadState<Option<ObjectId>>,
}

impl VirtualObjectEndPoint {
    /// Creates an end-point whose contents are not known yet.
    #[must_use]
    pub fn incomplete(id: RelationEndPointId) -> Self {
        Self {
            id,
            state: LoadState::Incomplete,
        }
    }

    /// Creates a complete, unchanged end-point.
    #[must_use]
    pub fn complete(id: RelationEndPointId, opposite: Option<ObjectId>) -> Self {
        Self {
            id,
            state: LoadState::complete(opposite),
        }
    }

    /// Returns the end-point's identity.
    #[must_use]
    pub fn id(&self) -> &RelationEndPointId {
        &self.id
    }

    /// Returns `true` once the opposite object is known.
    #[must_use]
    pub fn is_data_complete(&self) -> bool {
        self.state.is_complete()
    }

    /// Returns the object currently referenced.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EndPointIncomplete`] if the end-point is not
    /// complete.
    pub fn opposite_object_id(&self) -> CoreResult<Option<&ObjectId>> {
        self.state
            .current()
            .map(Option::as_ref)
            .ok_or_else(|| self.incomplete_error())
    }

    /// Returns the object referenced at the last commit, if complete.
    #[must_use]
    pub fn original_opposite_object_id(&self) -> Option<&ObjectId> {
        self.state.original().and_then(Option::as_ref)
    }

    /// Replaces the referenced object.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EndPointIncomplete`] if the end-point is not
    /// complete.
    pub fn set_opposite_object_id(&mut self, opposite: Option<ObjectId>) -> CoreResult<()> {
        let error = self.incomplete_error();
        let current = self.state.current_mut().ok_or(error)?;
        *current = opposite;
        Ok(())
    }

    /// Returns `true` if the reference differs from the committed one.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.state.has_changed()
    }

    pub(crate) fn mark_data_complete(&mut self, opposite: Option<ObjectId>) {
        self.state = LoadState::complete(opposite);
    }

    pub(crate) fn mark_data_incomplete(&mut self) {
        self.state = LoadState::Incomplete;
    }

    pub(crate) fn commit(&mut self) {
        self.state.commit();
    }

    pub(crate) fn rollback(&mut self) {
        self.state.rollback();
    }

    fn incomplete_error(&self) -> CoreError {
        CoreError::EndPointIncomplete {
            end_point_id: self.id.clone(),
        }
    }
}
