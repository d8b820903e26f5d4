//! Unload planning.
//!
//! A plan lists, per transaction level, exactly what an unload will remove.
//! It is computed and validated completely before any callback runs, so a
//! rejected unload never changes anything and a reentrant callback cannot
//! change what the running unload does.

use super::problem::UnloadProblem;
use crate::data::DataContainerState;
use crate::end_point::{RelationEndPoint, RelationEndPointId};
use crate::error::{CoreError, CoreResult};
use crate::transaction::TransactionHierarchy;
use crate::types::TransactionId;
use objgraph_store::ObjectId;
use std::collections::HashSet;

/// What an unload removes from one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LevelPlan {
    pub(crate) level: usize,
    pub(crate) transaction_id: TransactionId,
    /// Data containers to unregister, in batch order.
    pub(crate) objects: Vec<ObjectId>,
    /// End-points to unregister.
    pub(crate) removed_end_points: Vec<RelationEndPointId>,
    /// Virtual end-points to mark incomplete.
    pub(crate) incomplete_end_points: Vec<RelationEndPointId>,
}

impl LevelPlan {
    fn new(hierarchy: &TransactionHierarchy, level: usize) -> Self {
        Self {
            level,
            transaction_id: hierarchy.level(level).id(),
            objects: Vec::new(),
            removed_end_points: Vec::new(),
            incomplete_end_points: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.objects.is_empty()
            && self.removed_end_points.is_empty()
            && self.incomplete_end_points.is_empty()
    }

    fn merge(&mut self, other: LevelPlan) {
        for id in other.objects {
            push_unique(&mut self.objects, id);
        }
        for id in other.removed_end_points {
            push_unique(&mut self.removed_end_points, id);
        }
        for id in other.incomplete_end_points {
            push_unique(&mut self.incomplete_end_points, id);
        }
    }
}

/// A validated unload covering the whole hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct UnloadPlan {
    /// Affected levels, leaf first.
    pub(crate) levels: Vec<LevelPlan>,
    /// New objects that become invalid at every level.
    pub(crate) invalidated: Vec<ObjectId>,
}

impl UnloadPlan {
    pub(crate) fn is_empty(&self) -> bool {
        self.levels.is_empty() && self.invalidated.is_empty()
    }

    /// Every object the plan touches.
    pub(crate) fn object_ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.levels
            .iter()
            .flat_map(|l| l.objects.iter())
            .chain(self.invalidated.iter())
    }

    /// Every end-point the plan touches.
    pub(crate) fn end_point_ids(&self) -> impl Iterator<Item = &RelationEndPointId> {
        self.levels.iter().flat_map(|l| {
            l.removed_end_points
                .iter()
                .chain(l.incomplete_end_points.iter())
        })
    }

    fn finish(mut levels: Vec<LevelPlan>, invalidated: Vec<ObjectId>) -> Self {
        levels.sort_by(|a, b| b.level.cmp(&a.level));
        Self { levels, invalidated }
    }
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

fn reject_if_any(problems: Vec<UnloadProblem>) -> CoreResult<()> {
    if problems.is_empty() {
        Ok(())
    } else {
        Err(CoreError::unload_rejected(problems))
    }
}

/// Plans unloading the data of `ids` from every level.
///
/// The containers and their foreign keys are removed; virtual end-points
/// opposite those foreign keys become incomplete. When `collection` is
/// given, the objects are the items of that end-point and container state
/// problems are reported as item problems.
pub(crate) fn plan_data(
    hierarchy: &TransactionHierarchy,
    ids: &[ObjectId],
    collection: Option<&RelationEndPointId>,
) -> CoreResult<UnloadPlan> {
    let mut problems = Vec::new();
    let mut levels = Vec::new();
    for level in (0..hierarchy.depth()).rev() {
        let level_plan = plan_data_at(hierarchy, level, ids, collection, &mut problems)?;
        if !level_plan.is_empty() {
            levels.push(level_plan);
        }
    }
    reject_if_any(problems)?;
    Ok(UnloadPlan::finish(levels, Vec::new()))
}

fn plan_data_at(
    hierarchy: &TransactionHierarchy,
    level: usize,
    ids: &[ObjectId],
    collection: Option<&RelationEndPointId>,
    problems: &mut Vec<UnloadProblem>,
) -> CoreResult<LevelPlan> {
    let data_manager = hierarchy.level(level).data_manager();
    let transaction_id = data_manager.transaction_id();
    let mut plan = LevelPlan::new(hierarchy, level);

    for id in ids {
        let Some(container) = data_manager.data_container(id) else {
            continue;
        };
        let state = container.state();
        if state != DataContainerState::Unchanged {
            problems.push(match collection {
                Some(end_point_id) => UnloadProblem::ItemNotUnchanged {
                    end_point_id: end_point_id.clone(),
                    object_id: id.clone(),
                    state,
                    transaction_id,
                },
                None => UnloadProblem::ObjectState {
                    object_id: id.clone(),
                    state,
                    transaction_id,
                },
            });
        }

        for end_point in data_manager.end_points_of(id) {
            if end_point.has_changed() {
                problems.push(UnloadProblem::ChangedEndPoint {
                    end_point_id: end_point.id().clone(),
                    transaction_id,
                });
            }
            let RelationEndPoint::Real(real) = end_point else {
                continue;
            };
            push_unique(&mut plan.removed_end_points, real.id().clone());

            let opposite = hierarchy
                .mapping()
                .opposite(id.class_id(), &real.id().property)?;
            let Some(opposite_property) = &opposite.property else {
                continue;
            };
            for opposite_object in end_point.opposite_object_ids() {
                let opposite_id = RelationEndPointId::new(opposite_object, opposite_property);
                if Some(&opposite_id) == collection {
                    continue;
                }
                match data_manager.end_point(&opposite_id) {
                    Some(virtual_end_point) if virtual_end_point.has_changed() => {
                        problems.push(UnloadProblem::ChangedOpposite {
                            end_point_id: real.id().clone(),
                            opposite_id,
                            transaction_id,
                        });
                    }
                    Some(virtual_end_point) if virtual_end_point.is_data_complete() => {
                        push_unique(&mut plan.incomplete_end_points, opposite_id);
                    }
                    _ => {}
                }
            }
        }
        plan.objects.push(id.clone());
    }
    Ok(plan)
}

/// Plans marking a virtual end-point incomplete at every level, optionally
/// together with the data of all its items.
pub(crate) fn plan_virtual_end_point(
    hierarchy: &TransactionHierarchy,
    end_point_id: &RelationEndPointId,
    with_items: bool,
) -> CoreResult<UnloadPlan> {
    let owner = &end_point_id.object_id;
    let definition = hierarchy
        .mapping()
        .end_point_definition(owner.class_id(), &end_point_id.property)?;
    if !definition.is_virtual {
        return Err(CoreError::invalid_end_point(
            end_point_id.clone(),
            "only virtual end-points can be unloaded",
        ));
    }

    let mut problems = Vec::new();
    let mut levels = Vec::new();
    let mut items: Vec<ObjectId> = Vec::new();
    for level in (0..hierarchy.depth()).rev() {
        let data_manager = hierarchy.level(level).data_manager();
        let transaction_id = data_manager.transaction_id();
        let Some(end_point) = data_manager
            .end_point(end_point_id)
            .filter(|e| e.is_data_complete())
        else {
            continue;
        };

        let owner_state = data_manager.data_container(owner).map(|c| c.state());
        if let Some(state @ (DataContainerState::New | DataContainerState::Deleted)) = owner_state {
            problems.push(UnloadProblem::OwnerState {
                end_point_id: end_point_id.clone(),
                state,
                transaction_id,
            });
        }
        if end_point.has_changed() {
            problems.push(UnloadProblem::ChangedEndPoint {
                end_point_id: end_point_id.clone(),
                transaction_id,
            });
        }
        for item in end_point.opposite_object_ids() {
            push_unique(&mut items, item);
        }

        let mut level_plan = LevelPlan::new(hierarchy, level);
        level_plan.incomplete_end_points.push(end_point_id.clone());
        levels.push(level_plan);
    }

    if with_items && !items.is_empty() {
        for level in (0..hierarchy.depth()).rev() {
            let item_plan = plan_data_at(hierarchy, level, &items, Some(end_point_id), &mut problems)?;
            if item_plan.is_empty() {
                continue;
            }
            match levels.iter_mut().find(|l| l.level == level) {
                Some(existing) => existing.merge(item_plan),
                None => levels.push(item_plan),
            }
        }
    }

    reject_if_any(problems)?;
    Ok(UnloadPlan::finish(levels, Vec::new()))
}

/// Plans unloading every object selected by `filter` from every level.
///
/// Pending changes of selected objects are discarded and selected new
/// objects become invalid. Without a filter nothing is ever rejected; with
/// one, relations between selected and remaining objects must allow the
/// remaining side to stay consistent.
pub(crate) fn plan_filtered(
    hierarchy: &TransactionHierarchy,
    filter: Option<&dyn Fn(&ObjectId) -> bool>,
) -> CoreResult<UnloadPlan> {
    let selected = |id: &ObjectId| filter.map_or(true, |f| f(id));

    // Batch order: first appearance, root to leaf, in registration order.
    let mut batch: Vec<ObjectId> = Vec::new();
    let mut seen = HashSet::new();
    let mut invalidated = Vec::new();
    for level in 0..hierarchy.depth() {
        for container in hierarchy.level(level).data_manager().data_containers() {
            let id = container.id();
            if !selected(id) {
                continue;
            }
            if seen.insert(id.clone()) {
                batch.push(id.clone());
            }
            if container.state() == DataContainerState::New {
                push_unique(&mut invalidated, id.clone());
            }
        }
    }

    let mut problems = Vec::new();
    let mut levels = Vec::new();
    for level in (0..hierarchy.depth()).rev() {
        let data_manager = hierarchy.level(level).data_manager();
        let transaction_id = data_manager.transaction_id();
        let mut plan = LevelPlan::new(hierarchy, level);
        plan.objects = batch
            .iter()
            .filter(|id| data_manager.contains_data_container(id))
            .cloned()
            .collect();

        for end_point in data_manager.end_points() {
            let end_point_id = end_point.id();
            let owner = &end_point_id.object_id;
            if !selected(owner) {
                if filter.is_some() {
                    check_anonymous_reference(hierarchy, end_point, &invalidated, transaction_id, &mut problems)?;
                }
                continue;
            }
            plan.removed_end_points.push(end_point_id.clone());
            if filter.is_none() {
                continue;
            }

            let opposite = hierarchy
                .mapping()
                .opposite(owner.class_id(), &end_point_id.property)?;
            let Some(opposite_property) = &opposite.property else {
                continue;
            };
            for opposite_object in end_point.opposite_object_ids() {
                if selected(&opposite_object) {
                    continue;
                }
                if end_point.has_changed() {
                    problems.push(UnloadProblem::StrandedRelation {
                        end_point_id: end_point_id.clone(),
                        object_id: opposite_object,
                        transaction_id,
                    });
                    continue;
                }
                if end_point.is_virtual() {
                    continue;
                }
                let opposite_id = RelationEndPointId::new(opposite_object, opposite_property);
                match data_manager.end_point(&opposite_id) {
                    Some(virtual_end_point) if virtual_end_point.has_changed() => {
                        problems.push(UnloadProblem::ChangedOpposite {
                            end_point_id: end_point_id.clone(),
                            opposite_id,
                            transaction_id,
                        });
                    }
                    Some(virtual_end_point) if virtual_end_point.is_data_complete() => {
                        push_unique(&mut plan.incomplete_end_points, opposite_id);
                    }
                    _ => {}
                }
            }
        }

        if !plan.is_empty() || !invalidated.is_empty() {
            levels.push(plan);
        }
    }

    reject_if_any(problems)?;
    Ok(UnloadPlan::finish(levels, invalidated))
}

/// A remaining object may point at a selected new object through a relation
/// whose other side is anonymous; nothing on the selected side records it.
fn check_anonymous_reference(
    hierarchy: &TransactionHierarchy,
    end_point: &RelationEndPoint,
    invalidated: &[ObjectId],
    transaction_id: TransactionId,
    problems: &mut Vec<UnloadProblem>,
) -> CoreResult<()> {
    let RelationEndPoint::Real(real) = end_point else {
        return Ok(());
    };
    let end_point_id = real.id();
    let opposite = hierarchy
        .mapping()
        .opposite(end_point_id.object_id.class_id(), &end_point_id.property)?;
    if !opposite.is_anonymous() {
        return Ok(());
    }
    for target in end_point.opposite_object_ids() {
        if invalidated.contains(&target) {
            problems.push(UnloadProblem::StrandedRelation {
                end_point_id: end_point_id.clone(),
                object_id: target,
                transaction_id,
            });
        }
    }
    Ok(())
}
