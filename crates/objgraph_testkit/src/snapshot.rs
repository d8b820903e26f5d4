//! Hierarchy snapshots and consistency checks.
//!
//! A [`HierarchySnapshot`] captures everything an operation could change:
//! per level, every data container, every end-point and the invalid set.
//! Comparing snapshots taken before and after a failed operation proves the
//! operation had no effect.

use objgraph_core::{
    DataContainerState, MappingConfiguration, RelationEndPoint, RelationEndPointId,
    TransactionHierarchy, TransactionId,
};
use objgraph_store::{ObjectId, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Captured state of one data container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSnapshot {
    /// The container state.
    pub state: DataContainerState,
    /// Current values.
    pub values: BTreeMap<String, Value>,
    /// Original values.
    pub original_values: BTreeMap<String, Value>,
}

/// Captured state of one end-point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndPointSnapshot {
    /// Whether the contents are loaded.
    pub complete: bool,
    /// Whether the end-point has changed.
    pub changed: bool,
    /// Current contents, if complete.
    pub current: Option<Vec<ObjectId>>,
    /// Current and original contents, if complete.
    pub related: Vec<ObjectId>,
}

/// Captured state of one transaction level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelSnapshot {
    /// The transaction.
    pub transaction_id: TransactionId,
    /// Data containers in registration order.
    pub containers: Vec<(ObjectId, ContainerSnapshot)>,
    /// End-points in registration order.
    pub end_points: Vec<(RelationEndPointId, EndPointSnapshot)>,
    /// Objects marked invalid at this level.
    pub invalid: BTreeSet<String>,
}

/// Captured state of a whole hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchySnapshot {
    /// Levels, root first.
    pub levels: Vec<LevelSnapshot>,
}

impl HierarchySnapshot {
    /// Captures the current state of `hierarchy`.
    pub fn capture(hierarchy: &TransactionHierarchy) -> Self {
        let levels = hierarchy
            .transaction_ids()
            .into_iter()
            .map(|tx| {
                let transaction = hierarchy
                    .transaction(tx)
                    .expect("listed transaction exists");
                let data_manager = transaction.data_manager();
                LevelSnapshot {
                    transaction_id: tx,
                    containers: data_manager
                        .data_containers()
                        .map(|c| {
                            (
                                c.id().clone(),
                                ContainerSnapshot {
                                    state: c.state(),
                                    values: c.values().clone(),
                                    original_values: c.original_values().clone(),
                                },
                            )
                        })
                        .collect(),
                    end_points: data_manager
                        .end_points()
                        .map(|e| (e.id().clone(), capture_end_point(e)))
                        .collect(),
                    invalid: transaction
                        .invalid_objects()
                        .map(ToString::to_string)
                        .collect(),
                }
            })
            .collect();
        Self { levels }
    }

    /// Returns the total number of containers across levels.
    pub fn container_count(&self) -> usize {
        self.levels.iter().map(|l| l.containers.len()).sum()
    }

    /// Returns the total number of end-points across levels.
    pub fn end_point_count(&self) -> usize {
        self.levels.iter().map(|l| l.end_points.len()).sum()
    }
}

fn capture_end_point(end_point: &RelationEndPoint) -> EndPointSnapshot {
    let complete = end_point.is_data_complete();
    EndPointSnapshot {
        complete,
        changed: end_point.has_changed(),
        current: end_point.current_object_ids(),
        related: if complete {
            end_point.opposite_object_ids()
        } else {
            Vec::new()
        },
    }
}

/// Checks that both sides of every loaded relation agree, at every level.
///
/// For every registered real end-point pointing at `x`, a complete
/// opposite end-point of `x` must contain the owner; for every complete
/// virtual end-point, each registered real end-point of its items must
/// point back at the owner.
pub fn check_relation_consistency(hierarchy: &TransactionHierarchy) -> Result<(), String> {
    let mapping: &MappingConfiguration = hierarchy.mapping();
    for tx in hierarchy.transaction_ids() {
        let data_manager = hierarchy
            .transaction(tx)
            .map_err(|e| e.to_string())?
            .data_manager();
        for end_point in data_manager.end_points() {
            let id = end_point.id();
            let opposite = mapping
                .opposite(id.object_id.class_id(), &id.property)
                .map_err(|e| e.to_string())?;
            let Some(opposite_property) = &opposite.property else {
                continue;
            };
            let Some(current) = end_point.current_object_ids() else {
                continue;
            };
            for target in current {
                let opposite_id = RelationEndPointId::new(target, opposite_property);
                let Some(opposite_end_point) = data_manager.end_point(&opposite_id) else {
                    continue;
                };
                let Some(back) = opposite_end_point.current_object_ids() else {
                    continue;
                };
                if !back.contains(&id.object_id) {
                    return Err(format!(
                        "{tx}: {id} refers to {opposite_id}, which does not refer back (has {back:?})"
                    ));
                }
            }
        }
    }
    Ok(())
}
