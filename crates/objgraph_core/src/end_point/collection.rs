//! Virtual end-points holding a collection.

use super::id::RelationEndPointId;
use super::load_state::LoadState;
use crate::error::{CoreError, CoreResult};
use objgraph_store::ObjectId;

/// The virtual side of a one-to-many relation.
///
/// Items are kept in order; reordering counts as a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEndPoint {
    id: RelationEndPointId,
    state: LoadState<Vec<ObjectId>>,
}

impl CollectionEndPoint {
    /// Creates an end-point whose items are not known yet.
    #[must_use]
    pub fn incomplete(id: RelationEndPointId) -> Self {
        Self {
            id,
            state: LoadState::Incomplete,
        }
    }

    /// Creates a complete, unchanged end-point.
    #[must_use]
    pub fn complete(id: RelationEndPointId, items: Vec<ObjectId>) -> Self {
        Self {
            id,
            state: LoadState::complete(items),
        }
    }

    /// Returns the end-point's identity.
    #[must_use]
    pub fn id(&self) -> &RelationEndPointId {
        &self.id
    }

    /// Returns `true` once the items are known.
    #[must_use]
    pub fn is_data_complete(&self) -> bool {
        self.state.is_complete()
    }

    /// Returns the current items.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EndPointIncomplete`] if the end-point is not
    /// complete.
    pub fn items(&self) -> CoreResult<&[ObjectId]> {
        self.state
            .current()
            .map(Vec::as_slice)
            .ok_or_else(|| self.incomplete_error())
    }

    /// Returns the items at the last commit, or nothing if incomplete.
    #[must_use]
    pub fn original_items(&self) -> &[ObjectId] {
        self.state.original().map_or(&[], Vec::as_slice)
    }

    /// Returns `true` if the collection currently holds `item`.
    #[must_use]
    pub fn contains(&self, item: &ObjectId) -> bool {
        self.state.current().is_some_and(|items| items.contains(item))
    }

    /// Appends an item unless it is already present.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EndPointIncomplete`] if the end-point is not
    /// complete.
    pub fn add(&mut self, item: ObjectId) -> CoreResult<()> {
        let error = self.incomplete_error();
        let items = self.state.current_mut().ok_or(error)?;
        if !items.contains(&item) {
            items.push(item);
        }
        Ok(())
    }

    /// Removes an item if present.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EndPointIncomplete`] if the end-point is not
    /// complete.
    pub fn remove(&mut self, item: &ObjectId) -> CoreResult<()> {
        let error = self.incomplete_error();
        let items = self.state.current_mut().ok_or(error)?;
        items.retain(|i| i != item);
        Ok(())
    }

    pub(crate) fn set_items(&mut self, new_items: Vec<ObjectId>) -> CoreResult<()> {
        let error = self.incomplete_error();
        let items = self.state.current_mut().ok_or(error)?;
        *items = new_items;
        Ok(())
    }

    /// Returns `true` if the items differ from the committed ones.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.state.has_changed()
    }

    pub(crate) fn mark_data_complete(&mut self, items: Vec<ObjectId>) {
        self.state = LoadState::complete(items);
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

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> RelationEndPointId {
        RelationEndPointId::new(ObjectId::from_u128("Customer", 1), "Orders")
    }

    #[test]
    fn incomplete_rejects_access() {
        let mut end_point = CollectionEndPoint::incomplete(id());
        assert!(matches!(
            end_point.items(),
            Err(CoreError::EndPointIncomplete { .. })
        ));
        assert!(end_point.add(ObjectId::from_u128("Order", 1)).is_err());
        assert!(!end_point.has_changed());
    }

    #[test]
    fn order_is_significant() {
        let a = ObjectId::from_u128("Order", 1);
        let b = ObjectId::from_u128("Order", 2);
        let mut end_point = CollectionEndPoint::complete(id(), vec![a.clone(), b.clone()]);

        end_point.remove(&a).unwrap();
        end_point.add(a.clone()).unwrap();
        assert_eq!(end_point.items().unwrap(), [b, a]);
        assert!(end_point.has_changed());

        end_point.rollback();
        assert!(!end_point.has_changed());
    }

    #[test]
    fn add_ignores_duplicates() {
        let a = ObjectId::from_u128("Order", 1);
        let mut end_point = CollectionEndPoint::complete(id(), vec![a.clone()]);
        end_point.add(a).unwrap();
        assert_eq!(end_point.items().unwrap().len(), 1);
        assert!(!end_point.has_changed());
    }
}
