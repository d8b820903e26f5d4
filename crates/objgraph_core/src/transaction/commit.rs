//! Commit, rollback and sub-transaction lifecycle.

use super::hierarchy::TransactionHierarchy;
use super::loading::new_virtual_end_point;
use crate::data::{DataContainer, DataContainerState};
use crate::end_point::{RealObjectEndPoint, RelationEndPoint, RelationEndPointId};
use crate::error::{CoreError, CoreResult};
use crate::listener::TransactionEvent;
use crate::types::TransactionId;
use objgraph_store::{ChangeKind, ObjectId, PersistableChange};
use std::collections::BTreeMap;
use tracing::{debug, warn};

impl TransactionHierarchy {
    /// Creates a sub-transaction below the leaf.
    ///
    /// The parent becomes read-only for modifications until the
    /// sub-transaction is committed into it or discarded.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if `tx` is not the leaf or the
    /// maximum hierarchy depth is reached.
    pub fn create_sub_transaction(&mut self, tx: TransactionId) -> CoreResult<TransactionId> {
        let level = self.level_of(tx)?;
        self.ensure_no_unload_in_progress("creating a sub-transaction")?;
        if level != self.leaf_level() {
            return Err(CoreError::invalid_operation(format!(
                "{tx} already has a sub-transaction"
            )));
        }
        if self.depth() >= self.config().max_hierarchy_depth {
            return Err(CoreError::invalid_operation(format!(
                "hierarchy depth is limited to {}",
                self.config().max_hierarchy_depth
            )));
        }

        let sub_transaction = self.push_level();
        debug!(parent = %tx, transaction = %sub_transaction, "sub-transaction created");
        self.notify(level, &TransactionEvent::SubTransactionCreated { sub_transaction })?;
        Ok(sub_transaction)
    }

    /// Discards a sub-transaction and everything it changed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for the root, for a
    /// transaction that has a sub-transaction, and for a transaction that is
    /// the target of an active scope.
    pub fn discard(&mut self, tx: TransactionId) -> CoreResult<()> {
        let level = self.level_of(tx)?;
        self.ensure_no_unload_in_progress("discarding a transaction")?;
        if level == 0 {
            return Err(CoreError::invalid_operation("the root transaction cannot be discarded"));
        }
        if level != self.leaf_level() {
            return Err(CoreError::invalid_operation(format!(
                "{tx} has a sub-transaction and cannot be discarded"
            )));
        }
        if self.scopes.contains(&tx) {
            return Err(CoreError::invalid_operation(format!(
                "{tx} is the target of an active scope"
            )));
        }
        self.pop_level();
        debug!(transaction = %tx, "sub-transaction discarded");
        Ok(())
    }

    /// Commits a transaction.
    ///
    /// The root writes its changes to the store. A sub-transaction pushes
    /// its changes into its parent. Afterwards the transaction is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionReadOnly`] if `tx` has a
    /// sub-transaction and any store error (such as a concurrency violation)
    /// raised by the root commit, in which case nothing is changed.
    pub fn commit(&mut self, tx: TransactionId) -> CoreResult<()> {
        let level = self.lifecycle_level(tx, "commit")?;
        let changed = self.changed_objects(level);
        self.notify(
            level,
            &TransactionEvent::TransactionCommitting {
                object_ids: changed.clone(),
            },
        )?;

        if level == 0 {
            self.commit_root()?;
        } else {
            self.commit_into_parent(level)?;
        }
        self.commit_level(level)?;

        debug!(transaction = %tx, objects = changed.len(), "transaction committed");
        self.notify(
            level,
            &TransactionEvent::TransactionCommitted {
                object_ids: changed,
            },
        )
    }

    /// Reverts every change of a transaction.
    ///
    /// New objects are discarded and become invalid; every other object and
    /// end-point returns to its committed state.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionReadOnly`] if `tx` has a
    /// sub-transaction.
    pub fn rollback(&mut self, tx: TransactionId) -> CoreResult<()> {
        let level = self.lifecycle_level(tx, "rollback")?;
        let new_objects: Vec<ObjectId> = self
            .level(level)
            .data_manager()
            .data_containers()
            .filter(|c| c.state() == DataContainerState::New)
            .map(|c| c.id().clone())
            .collect();

        let data_manager = self.level_mut(level).data_manager_mut();
        let end_point_ids: Vec<RelationEndPointId> =
            data_manager.end_points().map(|e| e.id().clone()).collect();
        for end_point_id in &end_point_ids {
            if let Some(end_point) = data_manager.end_point_mut(end_point_id) {
                end_point.rollback();
            }
        }
        let container_ids: Vec<ObjectId> = data_manager
            .data_containers()
            .filter(|c| c.state() != DataContainerState::New)
            .map(|c| c.id().clone())
            .collect();
        for id in &container_ids {
            if let Some(container) = data_manager.data_container_mut(id) {
                container.rollback();
            }
        }
        for id in &new_objects {
            self.discard_object(level, id)?;
        }

        debug!(transaction = %tx, discarded = new_objects.len(), "transaction rolled back");
        self.notify(level, &TransactionEvent::TransactionRolledBack)
    }

    fn lifecycle_level(&self, tx: TransactionId, operation: &str) -> CoreResult<usize> {
        let level = self.level_of(tx)?;
        self.ensure_no_unload_in_progress(operation)?;
        if level != self.leaf_level() {
            return Err(CoreError::TransactionReadOnly { transaction_id: tx });
        }
        Ok(level)
    }

    /// Objects whose container or end-points have pending changes.
    fn changed_objects(&self, level: usize) -> Vec<ObjectId> {
        let data_manager = self.level(level).data_manager();
        let mut ids: Vec<ObjectId> = data_manager
            .data_containers()
            .filter(|c| c.state() != DataContainerState::Unchanged)
            .map(|c| c.id().clone())
            .collect();
        for end_point in data_manager.end_points().filter(|e| e.has_changed()) {
            let owner = &end_point.id().object_id;
            if !ids.contains(owner) {
                ids.push(owner.clone());
            }
        }
        ids
    }

    fn commit_root(&mut self) -> CoreResult<()> {
        let data_manager = self.level(0).data_manager();
        let mut changes = Vec::new();
        for container in data_manager.data_containers() {
            let id = container.id();
            let foreign_keys_changed = data_manager
                .end_points_of(id)
                .any(|e| !e.is_virtual() && e.has_changed());
            let kind = match container.state() {
                DataContainerState::New => ChangeKind::Insert,
                DataContainerState::Deleted => ChangeKind::Delete,
                DataContainerState::Changed => ChangeKind::Update,
                DataContainerState::Unchanged if foreign_keys_changed => ChangeKind::Update,
                DataContainerState::Unchanged | DataContainerState::Discarded => continue,
            };
            let (values, foreign_keys) = if kind == ChangeKind::Delete {
                (BTreeMap::new(), BTreeMap::new())
            } else {
                let foreign_keys = data_manager
                    .end_points_of(id)
                    .filter_map(RelationEndPoint::as_real)
                    .map(|real| {
                        (
                            real.id().property.clone(),
                            real.opposite_object_id().cloned(),
                        )
                    })
                    .collect();
                (container.values().clone(), foreign_keys)
            };
            changes.push(PersistableChange {
                object_id: id.clone(),
                kind,
                values,
                foreign_keys,
                expected_timestamp: container.timestamp(),
            });
        }

        if changes.is_empty() {
            return Ok(());
        }
        debug!(changes = changes.len(), "writing changes to store");
        let timestamps = self.store().commit(&changes).inspect_err(|error| {
            warn!(%error, "store rejected commit");
        })?;

        let data_manager = self.level_mut(0).data_manager_mut();
        for (id, timestamp) in timestamps {
            if let Some(container) = data_manager.data_container_mut(&id) {
                container.set_timestamp(Some(timestamp));
            }
        }
        Ok(())
    }

    /// Pushes data and relation changes into the parent level.
    fn commit_into_parent(&mut self, level: usize) -> CoreResult<()> {
        let parent = level - 1;
        let child = self.level(level).data_manager();
        let containers: Vec<DataContainer> = child
            .data_containers()
            .filter(|c| c.state() != DataContainerState::Unchanged)
            .cloned()
            .collect();
        let changed_end_points: Vec<RelationEndPoint> = child
            .end_points()
            .filter(|e| e.has_changed())
            .cloned()
            .collect();

        // New objects first, so relation changes can refer to them.
        for container in containers.iter().filter(|c| c.state() == DataContainerState::New) {
            self.register_new_in_parent(parent, container)?;
        }

        for container in containers.iter().filter(|c| c.state() == DataContainerState::Changed) {
            self.load_containers(parent, std::slice::from_ref(container.id()))?;
            if let Some(target) = self
                .level_mut(parent)
                .data_manager_mut()
                .data_container_mut(container.id())
            {
                target.take_values(container.values());
                if target.state() == DataContainerState::Unchanged {
                    target.mark_as_changed()?;
                }
            }
        }

        for end_point in &changed_end_points {
            self.complete_end_point(parent, end_point.id())?;
            if let Some(target) = self
                .level_mut(parent)
                .data_manager_mut()
                .end_point_mut(end_point.id())
            {
                target.take_current_from(end_point)?;
            }
        }

        for container in containers.iter().filter(|c| c.state() == DataContainerState::Deleted) {
            let id = container.id();
            match self
                .level(parent)
                .data_manager()
                .data_container(id)
                .map(DataContainer::state)
            {
                Some(DataContainerState::New) => self.discard_object(parent, id)?,
                Some(_) => {
                    if let Some(target) = self
                        .level_mut(parent)
                        .data_manager_mut()
                        .data_container_mut(id)
                    {
                        target.delete();
                    }
                }
                None => {}
            }
        }
        Ok(())
    }

    fn register_new_in_parent(&mut self, parent: usize, container: &DataContainer) -> CoreResult<()> {
        let id = container.id();
        let mut copy = DataContainer::new_object(id.clone(), BTreeMap::new());
        copy.take_values(container.values());
        self.register_container(parent, copy)?;

        let definitions: Vec<_> = self
            .mapping()
            .end_point_definitions(id.class_id())
            .cloned()
            .collect();
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
            self.register_end_point(parent, end_point)?;
        }
        Ok(())
    }

    /// Makes a level's state its committed state.
    fn commit_level(&mut self, level: usize) -> CoreResult<()> {
        let deleted: Vec<ObjectId> = self
            .level(level)
            .data_manager()
            .data_containers()
            .filter(|c| c.state() == DataContainerState::Deleted)
            .map(|c| c.id().clone())
            .collect();
        for id in &deleted {
            self.discard_object(level, id)?;
        }

        let data_manager = self.level_mut(level).data_manager_mut();
        let container_ids: Vec<ObjectId> =
            data_manager.data_containers().map(|c| c.id().clone()).collect();
        for id in &container_ids {
            if let Some(container) = data_manager.data_container_mut(id) {
                container.commit();
            }
        }
        let end_point_ids: Vec<RelationEndPointId> =
            data_manager.end_points().map(|e| e.id().clone()).collect();
        for end_point_id in &end_point_ids {
            if let Some(end_point) = data_manager.end_point_mut(end_point_id) {
                end_point.commit();
            }
        }
        Ok(())
    }
}
