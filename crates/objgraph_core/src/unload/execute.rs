//! Unload execution.

use super::plan::{LevelPlan, UnloadPlan};
use crate::data_manager::DataManager;
use crate::error::{CoreError, CoreResult};
use crate::listener::TransactionEvent;
use crate::transaction::TransactionHierarchy;
use objgraph_store::ObjectId;
use tracing::debug;

/// Runs a validated plan.
///
/// Every notification that can cancel the unload runs before the first
/// container or end-point is touched; while they run, the planned objects
/// and end-points are pending and refuse modification. Eviction itself
/// cannot fail. The closing notifications run last, leaf first.
///
/// Each phase covers every level before the next phase starts, so a
/// listener registered on several levels sees all `ObjectsUnloading`
/// events before the first map notification, and every level is evicted
/// before the first `on_unloaded` hook. Objects that became invalid lose
/// their unload hook once the closing notifications ran.
pub(crate) fn execute(hierarchy: &mut TransactionHierarchy, plan: &UnloadPlan) -> CoreResult<()> {
    if plan.is_empty() {
        return Ok(());
    }
    check_not_pending(hierarchy, plan)?;

    {
        let pending = hierarchy.pending_mut();
        pending.objects.extend(plan.object_ids().cloned());
        pending.end_points.extend(plan.end_point_ids().cloned());
    }
    let announced = begin(hierarchy, plan).and_then(|()| announce(hierarchy, plan));
    {
        let pending = hierarchy.pending_mut();
        for id in plan.object_ids() {
            pending.objects.remove(id);
        }
        for id in plan.end_point_ids() {
            pending.end_points.remove(id);
        }
    }
    if let Err(err) = announced {
        debug!(error = %err, "unload cancelled");
        return Err(err);
    }

    evict(hierarchy, plan);
    debug!(
        levels = plan.levels.len(),
        objects = plan.levels.iter().map(|l| l.objects.len()).sum::<usize>(),
        invalidated = plan.invalidated.len(),
        "unloaded"
    );
    let finished = finish(hierarchy, plan);
    for id in &plan.invalidated {
        hierarchy.remove_unload_hook(id);
    }
    finished
}

fn check_not_pending(hierarchy: &TransactionHierarchy, plan: &UnloadPlan) -> CoreResult<()> {
    let pending = hierarchy.pending();
    if let Some(id) = plan.object_ids().find(|id| pending.objects.contains(*id)) {
        return Err(CoreError::ObjectBeingUnloaded {
            object_id: id.clone(),
        });
    }
    if let Some(id) = plan
        .end_point_ids()
        .find(|id| pending.end_points.contains(*id))
    {
        return Err(CoreError::ObjectBeingUnloaded {
            object_id: id.object_id.clone(),
        });
    }
    Ok(())
}

/// Unloading notifications and per-object hooks.
fn begin(hierarchy: &mut TransactionHierarchy, plan: &UnloadPlan) -> CoreResult<()> {
    for level_plan in &plan.levels {
        if level_plan.objects.is_empty() {
            continue;
        }
        let level = hierarchy.level_of(level_plan.transaction_id)?;
        hierarchy.notify(
            level,
            &TransactionEvent::ObjectsUnloading {
                object_ids: level_plan.objects.clone(),
            },
        )?;
        for id in &level_plan.objects {
            if let Some(hook) = hierarchy.unload_hook(id) {
                hook.on_unloading(hierarchy, level_plan.transaction_id, id)?;
            }
        }
    }
    Ok(())
}

/// Map notifications for everything the eviction will change.
///
/// The events of a level are collected before its listeners run.
fn announce(hierarchy: &mut TransactionHierarchy, plan: &UnloadPlan) -> CoreResult<()> {
    for level_plan in &plan.levels {
        let level = hierarchy.level_of(level_plan.transaction_id)?;
        let events = map_events(
            hierarchy.level(level).data_manager(),
            level_plan,
            &plan.invalidated,
        );
        for event in &events {
            hierarchy.notify(level, event)?;
        }
    }
    Ok(())
}

fn map_events(
    data_manager: &DataManager,
    level_plan: &LevelPlan,
    invalidated: &[ObjectId],
) -> Vec<TransactionEvent> {
    let removed = level_plan
        .removed_end_points
        .iter()
        .filter(|id| data_manager.end_point(id).is_some())
        .map(|id| TransactionEvent::RelationEndPointMapUnregistering {
            end_point_id: id.clone(),
        });
    let incomplete = level_plan
        .incomplete_end_points
        .iter()
        .filter(|id| {
            data_manager
                .end_point(id)
                .is_some_and(|e| e.is_data_complete())
        })
        .map(|id| TransactionEvent::RelationEndPointBecomingIncomplete {
            end_point_id: id.clone(),
        });
    let containers = level_plan
        .objects
        .iter()
        .filter(|id| data_manager.contains_data_container(id))
        .map(|id| TransactionEvent::DataContainerMapUnregistering {
            object_id: id.clone(),
        });
    let marked = invalidated
        .iter()
        .map(|id| TransactionEvent::ObjectMarkedInvalid {
            object_id: id.clone(),
        });
    removed
        .chain(incomplete)
        .chain(containers)
        .chain(marked)
        .collect()
}

fn evict(hierarchy: &mut TransactionHierarchy, plan: &UnloadPlan) {
    for level_plan in &plan.levels {
        let Ok(level) = hierarchy.level_of(level_plan.transaction_id) else {
            continue;
        };
        let transaction = hierarchy.level_mut(level);
        let data_manager = transaction.data_manager_mut();
        for id in &level_plan.removed_end_points {
            data_manager.unregister_end_point(id);
        }
        for id in &level_plan.incomplete_end_points {
            if let Some(end_point) = data_manager.end_point_mut(id) {
                end_point.mark_data_incomplete();
            }
        }
        for id in &level_plan.objects {
            data_manager.unregister_data_container(id);
        }
        for id in &plan.invalidated {
            let leftovers: Vec<_> = data_manager.end_points_of(id).map(|e| e.id().clone()).collect();
            for end_point_id in &leftovers {
                data_manager.unregister_end_point(end_point_id);
            }
            data_manager.unregister_data_container(id);
        }
        for id in &plan.invalidated {
            transaction.mark_invalid(id.clone());
        }
    }
}

/// Unloaded hooks in reverse batch order, then the unloaded notification.
/// Levels discarded by an earlier hook are skipped.
fn finish(hierarchy: &mut TransactionHierarchy, plan: &UnloadPlan) -> CoreResult<()> {
    for level_plan in &plan.levels {
        if level_plan.objects.is_empty() || hierarchy.level_of(level_plan.transaction_id).is_err() {
            continue;
        }
        for id in level_plan.objects.iter().rev() {
            if let Some(hook) = hierarchy.unload_hook(id) {
                hook.on_unloaded(hierarchy, level_plan.transaction_id, id)?;
            }
        }
        let Ok(level) = hierarchy.level_of(level_plan.transaction_id) else {
            continue;
        };
        hierarchy.notify(
            level,
            &TransactionEvent::ObjectsUnloaded {
                object_ids: level_plan.objects.clone(),
            },
        )?;
    }
    Ok(())
}
