//! Per-transaction identity map.

use crate::data::{DataContainer, DataContainerState};
use crate::end_point::{RelationEndPoint, RelationEndPointId};
use crate::error::{CoreError, CoreResult};
use crate::types::TransactionId;
use indexmap::IndexMap;
use objgraph_store::ObjectId;

/// The data containers and relation end-points of one transaction level.
///
/// The data manager is pure bookkeeping: it never loads, never notifies
/// and never looks at other levels. Both maps preserve registration order,
/// which is the order batch operations visit objects in.
#[derive(Debug, Clone)]
pub struct DataManager {
    transaction_id: TransactionId,
    data_containers: IndexMap<ObjectId, DataContainer>,
    end_points: IndexMap<RelationEndPointId, RelationEndPoint>,
}

impl DataManager {
    /// Creates an empty data manager.
    #[must_use]
    pub fn new(transaction_id: TransactionId) -> Self {
        Self {
            transaction_id,
            data_containers: IndexMap::new(),
            end_points: IndexMap::new(),
        }
    }

    /// Returns the owning transaction.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// Returns the container of an object, if loaded.
    #[must_use]
    pub fn data_container(&self, id: &ObjectId) -> Option<&DataContainer> {
        self.data_containers.get(id)
    }

    pub(crate) fn data_container_mut(&mut self, id: &ObjectId) -> Option<&mut DataContainer> {
        self.data_containers.get_mut(id)
    }

    /// Returns `true` if the object's container is loaded.
    #[must_use]
    pub fn contains_data_container(&self, id: &ObjectId) -> bool {
        self.data_containers.contains_key(id)
    }

    /// Iterates over containers in registration order.
    pub fn data_containers(&self) -> impl Iterator<Item = &DataContainer> {
        self.data_containers.values()
    }

    /// Returns the number of loaded containers.
    #[must_use]
    pub fn data_container_count(&self) -> usize {
        self.data_containers.len()
    }

    /// Returns the end-point, if registered.
    #[must_use]
    pub fn end_point(&self, id: &RelationEndPointId) -> Option<&RelationEndPoint> {
        self.end_points.get(id)
    }

    pub(crate) fn end_point_mut(&mut self, id: &RelationEndPointId) -> Option<&mut RelationEndPoint> {
        self.end_points.get_mut(id)
    }

    /// Iterates over end-points in registration order.
    pub fn end_points(&self) -> impl Iterator<Item = &RelationEndPoint> {
        self.end_points.values()
    }

    /// Iterates over the registered end-points owned by an object.
    pub fn end_points_of<'a>(
        &'a self,
        object_id: &'a ObjectId,
    ) -> impl Iterator<Item = &'a RelationEndPoint> + 'a {
        self.end_points
            .values()
            .filter(move |e| &e.id().object_id == object_id)
    }

    /// Returns the number of registered end-points.
    #[must_use]
    pub fn end_point_count(&self) -> usize {
        self.end_points.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data_containers.is_empty() && self.end_points.is_empty()
    }

    /// Returns `true` if any container or end-point has pending changes.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.data_containers
            .values()
            .any(|c| c.state() != DataContainerState::Unchanged)
            || self.end_points.values().any(RelationEndPoint::has_changed)
    }

    pub(crate) fn register_data_container(&mut self, container: DataContainer) -> CoreResult<()> {
        if self.data_containers.contains_key(container.id()) {
            return Err(CoreError::invalid_operation(format!(
                "{} is already registered in {}",
                container.id(),
                self.transaction_id
            )));
        }
        self.data_containers.insert(container.id().clone(), container);
        Ok(())
    }

    pub(crate) fn unregister_data_container(&mut self, id: &ObjectId) -> Option<DataContainer> {
        self.data_containers.shift_remove(id)
    }

    pub(crate) fn register_end_point(&mut self, end_point: RelationEndPoint) -> CoreResult<()> {
        if self.end_points.contains_key(end_point.id()) {
            return Err(CoreError::invalid_operation(format!(
                "end-point {} is already registered in {}",
                end_point.id(),
                self.transaction_id
            )));
        }
        self.end_points.insert(end_point.id().clone(), end_point);
        Ok(())
    }

    pub(crate) fn unregister_end_point(&mut self, id: &RelationEndPointId) -> Option<RelationEndPoint> {
        self.end_points.shift_remove(id)
    }
}
