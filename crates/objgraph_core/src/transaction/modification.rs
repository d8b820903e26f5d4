//! Object creation, property access and bidirectional relation changes.

use super::hierarchy::TransactionHierarchy;
use super::loading::new_virtual_end_point;
use crate::data::{DataContainer, DataContainerState};
use crate::end_point::{RealObjectEndPoint, RelationEndPoint, RelationEndPointId};
use crate::error::{CoreError, CoreResult};
use crate::mapping::{Cardinality, RelationEndPointDefinition};
use crate::types::TransactionId;
use objgraph_store::{ClassId, ObjectId, Value};
use std::collections::BTreeMap;
use tracing::debug;

impl TransactionHierarchy {
    /// Creates a new object of `class_id` in a transaction.
    ///
    /// The object starts with default values, foreign keys pointing nowhere
    /// and complete, empty virtual end-points.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownClass`] for an unmapped class and
    /// [`CoreError::TransactionReadOnly`] if the transaction has a
    /// sub-transaction.
    pub fn new_object(&mut self, tx: TransactionId, class_id: &ClassId) -> CoreResult<ObjectId> {
        let id = ObjectId::generate(class_id.clone());
        self.new_object_with_id(tx, id.clone())?;
        Ok(id)
    }

    /// Creates a new object with a caller-chosen identity.
    ///
    /// # Errors
    ///
    /// Fails like [`TransactionHierarchy::new_object`], and with
    /// [`CoreError::InvalidOperation`] if the identity is already in use in
    /// the transaction.
    pub fn new_object_with_id(&mut self, tx: TransactionId, id: ObjectId) -> CoreResult<()> {
        let level = self.writable_level(tx)?;
        let class = self.mapping().class(id.class_id())?;
        let values: BTreeMap<String, Value> = class
            .properties
            .iter()
            .map(|p| (p.name.clone(), p.default.clone()))
            .collect();
        if self.is_invalid_at(level, &id)
            || self.level(level).data_manager().contains_data_container(&id)
        {
            return Err(CoreError::invalid_operation(format!(
                "{id} is already known in {tx}"
            )));
        }

        let definitions: Vec<RelationEndPointDefinition> = self
            .mapping()
            .end_point_definitions(id.class_id())
            .cloned()
            .collect();

        self.register_container(level, DataContainer::new_object(id.clone(), values))?;
        for definition in &definitions {
            let Some(property) = &definition.property else {
                continue;
            };
            let end_point_id = RelationEndPointId::new(id.clone(), property);
            let end_point = if definition.is_virtual {
                new_virtual_end_point(end_point_id, definition, Vec::new())
            } else {
                RelationEndPoint::Real(RealObjectEndPoint::new(end_point_id, None))
            };
            self.register_end_point(level, end_point)?;
        }
        debug!(transaction = %tx, object = %id, "new object created");
        Ok(())
    }

    /// Reads the current value of a data property, loading the object if
    /// necessary.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ObjectDeleted`] for a deleted object and
    /// [`CoreError::UnknownProperty`] for an unmapped property.
    pub fn property(&mut self, tx: TransactionId, id: &ObjectId, property: &str) -> CoreResult<Value> {
        let container = self.readable_container(tx, id)?;
        container
            .value(property)
            .cloned()
            .ok_or_else(|| unknown_property(id, property))
    }

    /// Reads the last committed value of a data property.
    ///
    /// # Errors
    ///
    /// Fails like [`TransactionHierarchy::property`].
    pub fn original_property(
        &mut self,
        tx: TransactionId,
        id: &ObjectId,
        property: &str,
    ) -> CoreResult<Value> {
        let container = self.readable_container(tx, id)?;
        container
            .original_value(property)
            .cloned()
            .ok_or_else(|| unknown_property(id, property))
    }

    /// Writes a data property.
    ///
    /// # Errors
    ///
    /// Fails like [`TransactionHierarchy::property`], and with
    /// [`CoreError::TransactionReadOnly`] or
    /// [`CoreError::ObjectBeingUnloaded`] if the object cannot be modified.
    pub fn set_property(
        &mut self,
        tx: TransactionId,
        id: &ObjectId,
        property: &str,
        value: impl Into<Value>,
    ) -> CoreResult<()> {
        let level = self.writable_level(tx)?;
        self.modifiable_container(level, id)?
            .set_value(property, value.into())
    }

    /// Flags an object as changed so the next commit writes it.
    ///
    /// # Errors
    ///
    /// Fails like [`TransactionHierarchy::set_property`], and with
    /// [`CoreError::InvalidOperation`] for a new object.
    pub fn mark_as_changed(&mut self, tx: TransactionId, id: &ObjectId) -> CoreResult<()> {
        let level = self.writable_level(tx)?;
        self.modifiable_container(level, id)?.mark_as_changed()
    }

    /// Returns the object referenced by a one-valued relation property.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidEndPoint`] for a collection property.
    pub fn related_object(
        &mut self,
        tx: TransactionId,
        id: &ObjectId,
        property: &str,
    ) -> CoreResult<Option<ObjectId>> {
        let end_point = self.readable_end_point(tx, id, property, Cardinality::One)?;
        Ok(end_point
            .current_object_ids()
            .and_then(|ids| ids.into_iter().next()))
    }

    /// Returns the items of a collection relation property.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidEndPoint`] for a one-valued property.
    pub fn related_objects(
        &mut self,
        tx: TransactionId,
        id: &ObjectId,
        property: &str,
    ) -> CoreResult<Vec<ObjectId>> {
        let end_point = self.readable_end_point(tx, id, property, Cardinality::Many)?;
        Ok(end_point.current_object_ids().unwrap_or_default())
    }

    /// Sets a one-valued relation property.
    ///
    /// Both sides of the relation are updated. For a one-to-one relation the
    /// previous partners of both objects are detached.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRelationTarget`] if `target` has the wrong
    /// class and [`CoreError::InvalidEndPoint`] for a collection property.
    pub fn set_related_object(
        &mut self,
        tx: TransactionId,
        id: &ObjectId,
        property: &str,
        target: Option<&ObjectId>,
    ) -> CoreResult<()> {
        let level = self.writable_level(tx)?;
        let definition = self.relation_definition(id, property, Cardinality::One)?;
        let end_point_id = RelationEndPointId::new(id.clone(), property);
        if !definition.is_virtual {
            return self.set_real_end_point(level, &end_point_id, target.cloned());
        }

        let opposite = self.mapping().opposite(id.class_id(), property)?.clone();
        let opposite_property = opposite.property.clone().ok_or_else(|| {
            CoreError::invalid_end_point(end_point_id.clone(), "opposite side is anonymous")
        })?;
        if let Some(target) = target {
            self.check_target_class(&end_point_id, &opposite, target)?;
        }

        self.modifiable_container(level, id)?;
        self.complete_end_point(level, &end_point_id)?;
        let previous = self
            .level(level)
            .data_manager()
            .end_point(&end_point_id)
            .and_then(RelationEndPoint::current_object_ids)
            .and_then(|ids| ids.into_iter().next());
        if previous.as_ref() == target {
            return Ok(());
        }
        if let Some(previous) = previous {
            let real = RelationEndPointId::new(previous, &opposite_property);
            self.set_real_end_point(level, &real, None)?;
        }
        if let Some(target) = target {
            let real = RelationEndPointId::new(target.clone(), &opposite_property);
            self.set_real_end_point(level, &real, Some(id.clone()))?;
        }
        Ok(())
    }

    /// Adds an item to a collection relation property.
    ///
    /// The item's foreign key is pointed at `id`, which removes it from its
    /// previous collection.
    ///
    /// # Errors
    ///
    /// Fails like [`TransactionHierarchy::set_related_object`].
    pub fn add_related_object(
        &mut self,
        tx: TransactionId,
        id: &ObjectId,
        property: &str,
        item: &ObjectId,
    ) -> CoreResult<()> {
        let level = self.writable_level(tx)?;
        let (end_point_id, real) = self.collection_item_end_point(id, property, item)?;
        self.modifiable_container(level, id)?;
        self.complete_end_point(level, &end_point_id)?;
        self.set_real_end_point(level, &real, Some(id.clone()))
    }

    /// Removes an item from a collection relation property.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRelationTarget`] if `item` is not in the
    /// collection.
    pub fn remove_related_object(
        &mut self,
        tx: TransactionId,
        id: &ObjectId,
        property: &str,
        item: &ObjectId,
    ) -> CoreResult<()> {
        let level = self.writable_level(tx)?;
        let (end_point_id, real) = self.collection_item_end_point(id, property, item)?;
        self.modifiable_container(level, id)?;
        self.complete_end_point(level, &end_point_id)?;
        let contained = self
            .level(level)
            .data_manager()
            .end_point(&end_point_id)
            .and_then(RelationEndPoint::as_collection)
            .is_some_and(|c| c.contains(item));
        if !contained {
            return Err(CoreError::InvalidRelationTarget {
                end_point_id,
                target: item.clone(),
                message: "the object is not part of the collection".to_string(),
            });
        }
        self.set_real_end_point(level, &real, None)
    }

    /// Deletes an object.
    ///
    /// The object is first removed from every navigable relation it takes
    /// part in. A new object is discarded and becomes invalid; any other
    /// object becomes `Deleted` until commit. Deleting a deleted object does
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionReadOnly`] or
    /// [`CoreError::ObjectBeingUnloaded`] if the object cannot be modified.
    pub fn delete_object(&mut self, tx: TransactionId, id: &ObjectId) -> CoreResult<()> {
        let level = self.writable_level(tx)?;
        self.ensure_valid(level, id)?;
        self.ensure_not_pending(id)?;
        self.load_containers(level, std::slice::from_ref(id))?;
        if self.container_state(level, id) == Some(DataContainerState::Deleted) {
            return Ok(());
        }

        let definitions: Vec<RelationEndPointDefinition> = self
            .mapping()
            .end_point_definitions(id.class_id())
            .cloned()
            .collect();
        for definition in &definitions {
            let Some(property) = &definition.property else {
                continue;
            };
            let end_point_id = RelationEndPointId::new(id.clone(), property);
            if !definition.is_virtual {
                self.set_real_end_point(level, &end_point_id, None)?;
                continue;
            }
            let opposite_property = self
                .mapping()
                .opposite(id.class_id(), property)?
                .property
                .clone()
                .ok_or_else(|| {
                    CoreError::invalid_end_point(end_point_id.clone(), "opposite side is anonymous")
                })?;
            self.complete_end_point(level, &end_point_id)?;
            let items = self
                .level(level)
                .data_manager()
                .end_point(&end_point_id)
                .and_then(RelationEndPoint::current_object_ids)
                .unwrap_or_default();
            for item in items {
                let real = RelationEndPointId::new(item, &opposite_property);
                self.set_real_end_point(level, &real, None)?;
            }
        }

        if self.container_state(level, id) == Some(DataContainerState::New) {
            self.discard_object(level, id)?;
        } else if let Some(container) = self.level_mut(level).data_manager_mut().data_container_mut(id)
        {
            container.delete();
        }
        debug!(transaction = %tx, object = %id, "object deleted");
        Ok(())
    }

    /// Points a foreign key at `target` and keeps the opposite virtual
    /// end-points in step.
    pub(crate) fn set_real_end_point(
        &mut self,
        level: usize,
        end_point_id: &RelationEndPointId,
        target: Option<ObjectId>,
    ) -> CoreResult<()> {
        let owner = &end_point_id.object_id;
        let property = &end_point_id.property;
        let opposite = self.mapping().opposite(owner.class_id(), property)?.clone();
        if let Some(target) = &target {
            self.check_target_class(end_point_id, &opposite, target)?;
            self.ensure_valid(level, target)?;
            self.load_containers(level, std::slice::from_ref(target))?;
            if self.container_state(level, target) == Some(DataContainerState::Deleted) {
                return Err(CoreError::ObjectDeleted {
                    object_id: target.clone(),
                    transaction_id: self.level(level).id(),
                });
            }
        }
        self.modifiable_container(level, owner)?;
        self.ensure_end_point_not_pending(end_point_id)?;

        let previous = self
            .level(level)
            .data_manager()
            .end_point(end_point_id)
            .and_then(RelationEndPoint::as_real)
            .and_then(RealObjectEndPoint::opposite_object_id)
            .cloned();
        if previous == target {
            return Ok(());
        }

        let Some(opposite_property) = opposite.property.clone() else {
            self.assign_real(level, end_point_id, target);
            return Ok(());
        };

        let previous_end_point = previous
            .as_ref()
            .map(|p| RelationEndPointId::new(p.clone(), &opposite_property));
        let target_end_point = target
            .as_ref()
            .map(|t| RelationEndPointId::new(t.clone(), &opposite_property));
        for virtual_id in previous_end_point.iter().chain(target_end_point.iter()) {
            self.ensure_end_point_not_pending(virtual_id)?;
            self.complete_end_point(level, virtual_id)?;
        }

        // One-to-one: the target's current partner loses its foreign key.
        let mut displaced = None;
        if opposite.cardinality == Cardinality::One {
            if let Some(target_end_point) = &target_end_point {
                let partner = self
                    .level(level)
                    .data_manager()
                    .end_point(target_end_point)
                    .and_then(RelationEndPoint::current_object_ids)
                    .and_then(|ids| ids.into_iter().next())
                    .filter(|p| p != owner);
                if let Some(partner) = partner {
                    let partner_end_point = RelationEndPointId::new(partner, property);
                    self.modifiable_container(level, &partner_end_point.object_id)?;
                    self.ensure_end_point_not_pending(&partner_end_point)?;
                    displaced = Some(partner_end_point);
                }
            }
        }

        if let Some(partner_end_point) = displaced {
            self.assign_real(level, &partner_end_point, None);
        }
        self.assign_real(level, end_point_id, target.clone());
        if let Some(previous_end_point) = previous_end_point {
            self.detach(level, &previous_end_point, owner)?;
        }
        if let Some(target_end_point) = target_end_point {
            self.attach(level, &target_end_point, owner)?;
        }
        Ok(())
    }

    fn assign_real(&mut self, level: usize, end_point_id: &RelationEndPointId, target: Option<ObjectId>) {
        if let Some(RelationEndPoint::Real(real)) = self
            .level_mut(level)
            .data_manager_mut()
            .end_point_mut(end_point_id)
        {
            real.set_opposite_object_id(target);
        }
    }

    fn detach(&mut self, level: usize, end_point_id: &RelationEndPointId, owner: &ObjectId) -> CoreResult<()> {
        match self.level_mut(level).data_manager_mut().end_point_mut(end_point_id) {
            Some(RelationEndPoint::VirtualObject(end_point)) => end_point.set_opposite_object_id(None),
            Some(RelationEndPoint::Collection(end_point)) => end_point.remove(owner),
            _ => Ok(()),
        }
    }

    fn attach(&mut self, level: usize, end_point_id: &RelationEndPointId, owner: &ObjectId) -> CoreResult<()> {
        match self.level_mut(level).data_manager_mut().end_point_mut(end_point_id) {
            Some(RelationEndPoint::VirtualObject(end_point)) => {
                end_point.set_opposite_object_id(Some(owner.clone()))
            }
            Some(RelationEndPoint::Collection(end_point)) => end_point.add(owner.clone()),
            _ => Ok(()),
        }
    }

    /// Only the leaf transaction accepts modifications.
    fn writable_level(&self, tx: TransactionId) -> CoreResult<usize> {
        let level = self.level_of(tx)?;
        if level != self.leaf_level() {
            return Err(CoreError::TransactionReadOnly { transaction_id: tx });
        }
        Ok(level)
    }

    fn container_state(&self, level: usize, id: &ObjectId) -> Option<DataContainerState> {
        self.level(level)
            .data_manager()
            .data_container(id)
            .map(DataContainer::state)
    }

    fn readable_container(&mut self, tx: TransactionId, id: &ObjectId) -> CoreResult<&DataContainer> {
        let level = self.level_of(tx)?;
        self.load_containers(level, std::slice::from_ref(id))?;
        let container = self
            .level(level)
            .data_manager()
            .data_container(id)
            .ok_or_else(|| CoreError::ObjectNotFound {
                object_id: id.clone(),
            })?;
        if container.state() == DataContainerState::Deleted {
            return Err(CoreError::ObjectDeleted {
                object_id: id.clone(),
                transaction_id: tx,
            });
        }
        Ok(container)
    }

    fn modifiable_container(&mut self, level: usize, id: &ObjectId) -> CoreResult<&mut DataContainer> {
        self.ensure_valid(level, id)?;
        self.ensure_not_pending(id)?;
        self.load_containers(level, std::slice::from_ref(id))?;
        let transaction_id = self.level(level).id();
        let container = self
            .level_mut(level)
            .data_manager_mut()
            .data_container_mut(id)
            .ok_or_else(|| CoreError::ObjectNotFound {
                object_id: id.clone(),
            })?;
        if container.state() == DataContainerState::Deleted {
            return Err(CoreError::ObjectDeleted {
                object_id: id.clone(),
                transaction_id,
            });
        }
        Ok(container)
    }

    fn readable_end_point(
        &mut self,
        tx: TransactionId,
        id: &ObjectId,
        property: &str,
        cardinality: Cardinality,
    ) -> CoreResult<&RelationEndPoint> {
        let definition = self.relation_definition(id, property, cardinality)?;
        let level = self.level_of(tx)?;
        self.ensure_valid(level, id)?;
        if !definition.is_virtual {
            self.load_containers(level, std::slice::from_ref(id))?;
        }
        if self.container_state(level, id) == Some(DataContainerState::Deleted) {
            return Err(CoreError::ObjectDeleted {
                object_id: id.clone(),
                transaction_id: tx,
            });
        }
        let end_point_id = RelationEndPointId::new(id.clone(), property);
        self.complete_end_point(level, &end_point_id)?;
        self.level(level)
            .data_manager()
            .end_point(&end_point_id)
            .ok_or(CoreError::EndPointIncomplete { end_point_id })
    }

    fn relation_definition(
        &self,
        id: &ObjectId,
        property: &str,
        cardinality: Cardinality,
    ) -> CoreResult<RelationEndPointDefinition> {
        let definition = self
            .mapping()
            .end_point_definition(id.class_id(), property)?
            .clone();
        if definition.cardinality != cardinality {
            let expected = match cardinality {
                Cardinality::One => "a one-valued",
                Cardinality::Many => "a collection",
            };
            return Err(CoreError::invalid_end_point(
                RelationEndPointId::new(id.clone(), property),
                format!("not {expected} relation property"),
            ));
        }
        Ok(definition)
    }

    /// Returns the collection end-point and the item's foreign key.
    fn collection_item_end_point(
        &self,
        id: &ObjectId,
        property: &str,
        item: &ObjectId,
    ) -> CoreResult<(RelationEndPointId, RelationEndPointId)> {
        self.relation_definition(id, property, Cardinality::Many)?;
        let end_point_id = RelationEndPointId::new(id.clone(), property);
        let opposite = self.mapping().opposite(id.class_id(), property)?;
        self.check_target_class(&end_point_id, opposite, item)?;
        let foreign_key = opposite.property.as_deref().ok_or_else(|| {
            CoreError::invalid_end_point(end_point_id.clone(), "opposite side is anonymous")
        })?;
        let real = RelationEndPointId::new(item.clone(), foreign_key);
        Ok((end_point_id, real))
    }

    fn check_target_class(
        &self,
        end_point_id: &RelationEndPointId,
        opposite: &RelationEndPointDefinition,
        target: &ObjectId,
    ) -> CoreResult<()> {
        if target.class_id() != &opposite.class_id {
            return Err(CoreError::InvalidRelationTarget {
                end_point_id: end_point_id.clone(),
                target: target.clone(),
                message: format!("expected an object of class {}", opposite.class_id),
            });
        }
        Ok(())
    }
}

fn unknown_property(id: &ObjectId, property: &str) -> CoreError {
    CoreError::UnknownProperty {
        class_id: id.class_id().clone(),
        property: property.to_string(),
    }
}
