//! Lazy loading of data containers and end-points.

use super::hierarchy::TransactionHierarchy;
use crate::data::{DataContainer, DataContainerState};
use crate::end_point::{
    CollectionEndPoint, RealObjectEndPoint, RelationEndPoint, RelationEndPointId,
    VirtualObjectEndPoint,
};
use crate::error::{CoreError, CoreResult};
use crate::listener::TransactionEvent;
use crate::mapping::{Cardinality, RelationEndPointDefinition};
use crate::types::TransactionId;
use objgraph_store::{DataRecord, ObjectId, RelationQuery, Value};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// A freshly loaded container with its foreign keys.
struct LoadedObject {
    container: DataContainer,
    real_end_points: Vec<RealObjectEndPoint>,
}

impl TransactionHierarchy {
    /// Returns the data container of an object, loading it if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ObjectNotFound`] if the store does not hold the
    /// object and [`CoreError::ObjectInvalid`] if the object is invalid in
    /// the transaction.
    pub fn get_or_load(&mut self, tx: TransactionId, id: &ObjectId) -> CoreResult<&DataContainer> {
        let level = self.level_of(tx)?;
        self.load_containers(level, std::slice::from_ref(id))?;
        self.level(level)
            .data_manager()
            .data_container(id)
            .ok_or_else(|| CoreError::ObjectNotFound {
                object_id: id.clone(),
            })
    }

    /// Returns the data containers of several objects, loading the missing
    /// ones in a single batch.
    ///
    /// # Errors
    ///
    /// Fails like [`TransactionHierarchy::get_or_load`]; if any object
    /// cannot be loaded, none of the batch is registered.
    pub fn get_or_load_many(
        &mut self,
        tx: TransactionId,
        ids: &[ObjectId],
    ) -> CoreResult<Vec<&DataContainer>> {
        let level = self.level_of(tx)?;
        self.load_containers(level, ids)?;
        let data_manager = self.level(level).data_manager();
        ids.iter()
            .map(|id| {
                data_manager
                    .data_container(id)
                    .ok_or_else(|| CoreError::ObjectNotFound {
                        object_id: id.clone(),
                    })
            })
            .collect()
    }

    /// Makes sure the object's data container is loaded.
    ///
    /// # Errors
    ///
    /// Fails like [`TransactionHierarchy::get_or_load`].
    pub fn ensure_data_available(&mut self, tx: TransactionId, id: &ObjectId) -> CoreResult<()> {
        let level = self.level_of(tx)?;
        self.load_containers(level, std::slice::from_ref(id))
    }

    /// Makes sure the end-point is registered and complete.
    ///
    /// For a real end-point this loads the owning object. For a virtual
    /// end-point the contents are resolved from the opposite side and any
    /// newly discovered opposite objects are loaded.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownProperty`] if the end-point is not mapped
    /// and [`CoreError::InconsistentRelation`] if a one-to-one relation
    /// resolves to more than one object.
    pub fn ensure_data_complete(
        &mut self,
        tx: TransactionId,
        end_point_id: &RelationEndPointId,
    ) -> CoreResult<()> {
        let level = self.level_of(tx)?;
        self.complete_end_point(level, end_point_id)
    }

    /// Loads the objects of `ids` that are not loaded at `level` yet.
    pub(crate) fn load_containers(&mut self, level: usize, ids: &[ObjectId]) -> CoreResult<()> {
        let mut missing: Vec<ObjectId> = Vec::new();
        for id in ids {
            self.ensure_valid(level, id)?;
            if self.level(level).data_manager().contains_data_container(id) || missing.contains(id)
            {
                continue;
            }
            self.ensure_not_pending(id)?;
            self.mapping().class(id.class_id())?;
            missing.push(id.clone());
        }
        if missing.is_empty() {
            return Ok(());
        }

        self.notify(
            level,
            &TransactionEvent::ObjectsLoading {
                object_ids: missing.clone(),
            },
        )?;

        let loaded = if level == 0 {
            self.load_from_store(&missing)?
        } else {
            self.load_from_parent(level, &missing)?
        };

        for object in loaded {
            self.register_container(level, object.container)?;
            for end_point in object.real_end_points {
                if self.level(level).data_manager().end_point(end_point.id()).is_none() {
                    self.register_end_point(level, RelationEndPoint::Real(end_point))?;
                }
            }
        }

        self.notify(
            level,
            &TransactionEvent::ObjectsLoaded {
                object_ids: missing,
            },
        )
    }

    fn load_from_store(&self, ids: &[ObjectId]) -> CoreResult<Vec<LoadedObject>> {
        debug!(count = ids.len(), "loading objects from store");
        let records = self.store().load_many(ids)?;
        ids.iter()
            .zip(records)
            .map(|(id, record)| {
                let record = record.ok_or_else(|| CoreError::ObjectNotFound {
                    object_id: id.clone(),
                })?;
                self.object_from_record(&record)
            })
            .collect()
    }

    fn object_from_record(&self, record: &DataRecord) -> CoreResult<LoadedObject> {
        let class = self.mapping().class(record.id.class_id())?;
        let values: BTreeMap<String, Value> = class
            .properties
            .iter()
            .map(|p| {
                let value = record.values.get(&p.name).unwrap_or(&p.default);
                (p.name.clone(), value.clone())
            })
            .collect();

        let real_end_points = self
            .real_end_point_definitions(&record.id)
            .into_iter()
            .map(|property| {
                let opposite = record.foreign_key(&property).cloned();
                RealObjectEndPoint::new(RelationEndPointId::new(record.id.clone(), &property), opposite)
            })
            .collect();

        Ok(LoadedObject {
            container: DataContainer::existing(record.id.clone(), values, Some(record.timestamp)),
            real_end_points,
        })
    }

    /// Copies the parent's current state; the copy starts unchanged.
    fn load_from_parent(&mut self, level: usize, ids: &[ObjectId]) -> CoreResult<Vec<LoadedObject>> {
        let parent = level - 1;
        self.load_containers(parent, ids)?;
        trace!(count = ids.len(), transaction = %self.level(level).id(), "loading objects from parent");

        let parent_manager = self.level(parent).data_manager();
        let mut loaded = Vec::with_capacity(ids.len());
        for id in ids {
            let source = parent_manager
                .data_container(id)
                .ok_or_else(|| CoreError::ObjectNotFound {
                    object_id: id.clone(),
                })?;
            if source.state() == DataContainerState::Deleted {
                return Err(CoreError::ObjectInvalid {
                    object_id: id.clone(),
                    transaction_id: self.level(level).id(),
                });
            }
            let container = DataContainer::existing(id.clone(), source.values().clone(), source.timestamp());
            let real_end_points = self
                .real_end_point_definitions(id)
                .into_iter()
                .map(|property| {
                    let end_point_id = RelationEndPointId::new(id.clone(), &property);
                    let opposite = parent_manager
                        .end_point(&end_point_id)
                        .and_then(RelationEndPoint::as_real)
                        .and_then(RealObjectEndPoint::opposite_object_id)
                        .cloned();
                    RealObjectEndPoint::new(end_point_id, opposite)
                })
                .collect();
            loaded.push(LoadedObject {
                container,
                real_end_points,
            });
        }
        Ok(loaded)
    }

    pub(crate) fn real_end_point_definitions(&self, id: &ObjectId) -> Vec<String> {
        self.mapping()
            .end_point_definitions(id.class_id())
            .filter(|d| !d.is_virtual)
            .filter_map(|d| d.property.clone())
            .collect()
    }

    /// Registers and completes an end-point at `level`.
    pub(crate) fn complete_end_point(
        &mut self,
        level: usize,
        end_point_id: &RelationEndPointId,
    ) -> CoreResult<()> {
        let owner = &end_point_id.object_id;
        let definition = self
            .mapping()
            .end_point_definition(owner.class_id(), &end_point_id.property)?
            .clone();
        if !definition.is_virtual {
            return self.load_containers(level, std::slice::from_ref(owner));
        }

        let registered = self.level(level).data_manager().end_point(end_point_id);
        if registered.is_some_and(RelationEndPoint::is_data_complete) {
            return Ok(());
        }
        self.ensure_valid(level, owner)?;
        if self.config().load_owner_on_virtual_access {
            self.load_containers(level, std::slice::from_ref(owner))?;
        }

        let items = if level == 0 {
            self.resolve_from_store(end_point_id)?
        } else {
            self.resolve_from_parent(level, end_point_id)?
        };

        if definition.cardinality == Cardinality::One && items.len() > 1 {
            return Err(CoreError::InconsistentRelation {
                end_point_id: end_point_id.clone(),
                message: format!("{} objects refer to a one-to-one end-point", items.len()),
            });
        }

        debug!(
            transaction = %self.level(level).id(),
            end_point = %end_point_id,
            items = items.len(),
            "virtual end-point completed"
        );
        match self.level_mut(level).data_manager_mut().end_point_mut(end_point_id) {
            Some(end_point) => {
                end_point.mark_data_complete(items);
                Ok(())
            }
            None => {
                let end_point = new_virtual_end_point(end_point_id.clone(), &definition, items);
                self.register_end_point(level, end_point)
            }
        }
    }

    /// Queries the foreign-key side and loads the objects it returns.
    fn resolve_from_store(&mut self, end_point_id: &RelationEndPointId) -> CoreResult<Vec<ObjectId>> {
        let owner = &end_point_id.object_id;
        let opposite = self
            .mapping()
            .opposite(owner.class_id(), &end_point_id.property)?
            .clone();
        let foreign_key = opposite.property.clone().ok_or_else(|| {
            CoreError::invalid_end_point(end_point_id.clone(), "opposite side is anonymous")
        })?;
        let query = RelationQuery {
            class_id: opposite.class_id.clone(),
            foreign_key: foreign_key.clone(),
            referenced: owner.clone(),
        };
        let records = self.store().load_relation_targets(&query)?;
        trace!(end_point = %end_point_id, records = records.len(), "relation targets queried");

        let mut discovered: Vec<ObjectId> = Vec::new();
        for record in &records {
            if self.is_invalid_at(0, &record.id)
                || self.level(0).data_manager().contains_data_container(&record.id)
                || discovered.contains(&record.id)
            {
                continue;
            }
            self.ensure_not_pending(&record.id)?;
            discovered.push(record.id.clone());
        }

        if !discovered.is_empty() {
            self.notify(
                0,
                &TransactionEvent::ObjectsLoading {
                    object_ids: discovered.clone(),
                },
            )?;
            for record in records.iter().filter(|r| discovered.contains(&r.id)) {
                if self.level(0).data_manager().contains_data_container(&record.id) {
                    continue;
                }
                let object = self.object_from_record(record)?;
                self.register_container(0, object.container)?;
                for end_point in object.real_end_points {
                    if self.level(0).data_manager().end_point(end_point.id()).is_none() {
                        self.register_end_point(0, RelationEndPoint::Real(end_point))?;
                    }
                }
            }
            self.notify(
                0,
                &TransactionEvent::ObjectsLoaded {
                    object_ids: discovered,
                },
            )?;
        }

        // In-memory foreign keys win over the store.
        let data_manager = self.level(0).data_manager();
        let mut items = Vec::new();
        for record in &records {
            if self.is_invalid_at(0, &record.id) || items.contains(&record.id) {
                continue;
            }
            let end_point_id = RelationEndPointId::new(record.id.clone(), &foreign_key);
            let points_here = match data_manager.end_point(&end_point_id).and_then(RelationEndPoint::as_real) {
                Some(real) => real.opposite_object_id() == Some(owner),
                None => record.foreign_key(&foreign_key) == Some(owner),
            };
            if points_here {
                items.push(record.id.clone());
            }
        }
        Ok(items)
    }

    fn resolve_from_parent(
        &mut self,
        level: usize,
        end_point_id: &RelationEndPointId,
    ) -> CoreResult<Vec<ObjectId>> {
        self.complete_end_point(level - 1, end_point_id)?;
        let items: Vec<ObjectId> = self
            .level(level - 1)
            .data_manager()
            .end_point(end_point_id)
            .and_then(RelationEndPoint::current_object_ids)
            .unwrap_or_default()
            .into_iter()
            .filter(|id| !self.is_invalid_at(level, id))
            .collect();
        self.load_containers(level, &items)?;
        Ok(items)
    }
}

/// Creates a complete, unchanged virtual end-point for `definition`.
pub(crate) fn new_virtual_end_point(
    id: RelationEndPointId,
    definition: &RelationEndPointDefinition,
    items: Vec<ObjectId>,
) -> RelationEndPoint {
    match definition.cardinality {
        Cardinality::One => RelationEndPoint::VirtualObject(VirtualObjectEndPoint::complete(
            id,
            items.into_iter().next(),
        )),
        Cardinality::Many => RelationEndPoint::Collection(CollectionEndPoint::complete(id, items)),
    }
}
