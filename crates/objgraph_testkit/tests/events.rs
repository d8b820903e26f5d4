//! Integration tests for unload notification order, failure injection and
//! reentrant hooks.

use objgraph_testkit::prelude::*;
use std::cell::Cell;
use std::rc::Rc;

fn is_loaded(hierarchy: &TransactionHierarchy, tx: TransactionId, id: &ObjectId) -> bool {
    hierarchy.data_container(tx, id).unwrap().is_some()
}

#[test]
fn unload_data_raises_events_in_order() {
    init_tracing();
    let mut fixture = TestHierarchy::new();
    let tx = fixture.root_transaction();
    fixture.related_objects(tx, &customer(1), "Orders").unwrap();
    fixture.get_or_load(tx, &order(1)).unwrap();
    let log = EventLog::new();
    log.listen(&mut fixture, tx);

    UnloadService::unload_data(&mut fixture, tx, &order(1)).unwrap();

    let events: Vec<TransactionEvent> = log.events().into_iter().map(|(_, e)| e).collect();
    assert_eq!(
        events,
        vec![
            TransactionEvent::ObjectsUnloading {
                object_ids: vec![order(1)]
            },
            TransactionEvent::RelationEndPointMapUnregistering {
                end_point_id: order_customer(1)
            },
            TransactionEvent::RelationEndPointBecomingIncomplete {
                end_point_id: customer_orders(1)
            },
            TransactionEvent::DataContainerMapUnregistering { object_id: order(1) },
            TransactionEvent::ObjectsUnloaded {
                object_ids: vec![order(1)]
            },
        ]
    );
}

#[test]
fn hooks_run_in_batch_order_then_in_reverse() {
    let mut fixture = TestHierarchy::new();
    let tx = fixture.root_transaction();
    fixture.get_or_load(tx, &order(1)).unwrap();
    fixture.get_or_load(tx, &order(2)).unwrap();
    let log = EventLog::new();
    log.hook(&mut fixture, &[order(1), order(2)]);
    log.listen(&mut fixture, tx);

    UnloadService::unload_all(&mut fixture, tx).unwrap();

    assert_eq!(
        log.hook_calls(),
        vec![
            Recorded::Unloading(tx, order(1)),
            Recorded::Unloading(tx, order(2)),
            Recorded::Unloaded(tx, order(2)),
            Recorded::Unloaded(tx, order(1)),
        ]
    );
    let entries = log.entries();
    assert!(matches!(
        entries.first(),
        Some(Recorded::Event(_, TransactionEvent::ObjectsUnloading { .. }))
    ));
    assert!(matches!(
        entries.last(),
        Some(Recorded::Event(_, TransactionEvent::ObjectsUnloaded { .. }))
    ));
}

#[test]
fn every_level_sees_its_own_batch_leaf_first() {
    let (mut fixture, levels) = TestHierarchy::three_levels();
    let [root, middle, leaf] = levels;
    fixture.get_or_load(leaf, &order(1)).unwrap();
    let log = EventLog::new();
    log.listen_all(&mut fixture);
    log.hook(&mut fixture, &[order(1)]);

    UnloadService::unload_data(&mut fixture, middle, &order(1)).unwrap();

    let unloading: Vec<TransactionId> = log
        .events()
        .into_iter()
        .filter(|(_, e)| matches!(e, TransactionEvent::ObjectsUnloading { .. }))
        .map(|(tx, _)| tx)
        .collect();
    assert_eq!(unloading, vec![leaf, middle, root]);
    assert_eq!(
        log.hook_calls(),
        vec![
            Recorded::Unloading(leaf, order(1)),
            Recorded::Unloading(middle, order(1)),
            Recorded::Unloading(root, order(1)),
            Recorded::Unloaded(leaf, order(1)),
            Recorded::Unloaded(middle, order(1)),
            Recorded::Unloaded(root, order(1)),
        ]
    );
}

#[test]
fn failing_unloading_listener_cancels_unload_all() {
    let (mut fixture, [root, _, leaf]) = TestHierarchy::three_levels();
    fixture.related_objects(leaf, &customer(1), "Orders").unwrap();
    fixture.get_or_load_many(leaf, &[order(1), order(2)]).unwrap();
    fixture
        .add_listener(
            root,
            Rc::new(FailingListener::new("no unloading", |e: &TransactionEvent| {
                matches!(e, TransactionEvent::ObjectsUnloading { .. })
            })),
        )
        .unwrap();
    let log = EventLog::new();
    log.hook(&mut fixture, &[order(1)]);
    let before = HierarchySnapshot::capture(&fixture);

    let err = UnloadService::unload_all(&mut fixture, leaf).unwrap_err();

    assert!(is_injected(&err, "no unloading"), "{err}");
    assert_eq!(HierarchySnapshot::capture(&fixture), before);
    assert!(!fixture.is_being_unloaded(&order(1)));
    // The leaf and middle levels were announced before the root refused.
    assert!(log
        .hook_calls()
        .iter()
        .all(|c| matches!(c, Recorded::Unloading(..))));
    assert!(!log.hook_calls().is_empty());

    // No object is left pending.
    fixture.set_property(leaf, &order(2), "OrderNumber", 22).unwrap();
    assert_eq!(fixture.property(leaf, &order(2), "OrderNumber").unwrap(), Value::Integer(22));
}

#[test]
fn failing_map_listener_cancels_after_hooks_ran() {
    let mut fixture = TestHierarchy::new();
    let tx = fixture.root_transaction();
    fixture.related_objects(tx, &order(1), "OrderItems").unwrap();
    fixture
        .add_listener(
            tx,
            Rc::new(FailingListener::new("keep containers", |e: &TransactionEvent| {
                matches!(e, TransactionEvent::DataContainerMapUnregistering { .. })
            })),
        )
        .unwrap();
    let log = EventLog::new();
    log.hook(&mut fixture, &[order_item(1), order_item(2)]);
    let before = HierarchySnapshot::capture(&fixture);

    let err =
        UnloadService::unload_virtual_end_point_and_item_data(&mut fixture, tx, &order_items(1))
            .unwrap_err();

    assert!(is_injected(&err, "keep containers"));
    assert_eq!(HierarchySnapshot::capture(&fixture), before);
    assert_eq!(
        log.hook_calls(),
        vec![
            Recorded::Unloading(tx, order_item(1)),
            Recorded::Unloading(tx, order_item(2)),
        ]
    );
}

#[test]
fn failing_unloaded_hook_reports_after_the_unload() {
    let mut fixture = TestHierarchy::new();
    let tx = fixture.root_transaction();
    fixture.get_or_load(tx, &order(1)).unwrap();
    fixture.set_unload_hook(
        order(1),
        Rc::new(FailingHook::new(HookPhase::Unloaded, "too late")),
    );
    let log = EventLog::new();
    log.listen(&mut fixture, tx);

    let err = UnloadService::unload_data(&mut fixture, tx, &order(1)).unwrap_err();

    assert!(is_injected(&err, "too late"));
    assert!(!is_loaded(&fixture, tx, &order(1)));
    assert_eq!(
        log.count(|e| matches!(e, TransactionEvent::ObjectsUnloaded { .. })),
        0
    );
    assert_eq!(
        log.count(|e| matches!(e, TransactionEvent::DataContainerMapUnregistering { .. })),
        1
    );
}

#[test]
fn failing_unloading_hook_is_reported_by_try_variants() {
    let mut fixture = TestHierarchy::new();
    let tx = fixture.root_transaction();
    fixture.get_or_load(tx, &order(1)).unwrap();
    fixture.set_unload_hook(
        order(1),
        Rc::new(FailingHook::new(HookPhase::Unloading, "not now")),
    );

    let err = UnloadService::try_unload_data(&mut fixture, tx, &order(1)).unwrap_err();
    assert!(is_injected(&err, "not now"));
    assert!(is_loaded(&fixture, tx, &order(1)));

    fixture.remove_unload_hook(&order(1));
    assert!(UnloadService::try_unload_data(&mut fixture, tx, &order(1)).unwrap());
}

#[test]
fn hook_can_load_other_objects_while_unloading() {
    let mut fixture = TestHierarchy::new();
    let tx = fixture.root_transaction();
    fixture.get_or_load(tx, &order(1)).unwrap();
    let saw_pending = Rc::new(Cell::new(false));
    let seen = saw_pending.clone();
    fixture.set_unload_hook(
        order(1),
        Rc::new(FnHook::new(move |hierarchy, tx, id| {
            seen.set(hierarchy.is_being_unloaded(id));
            hierarchy.ensure_data_available(tx, &order(2))?;
            let err = hierarchy.delete_object(tx, id).unwrap_err();
            assert!(matches!(err, CoreError::ObjectBeingUnloaded { .. }));
            let err = hierarchy.create_sub_transaction(tx).unwrap_err();
            assert!(matches!(err, CoreError::InvalidOperation { .. }));
            Ok(())
        })),
    );

    UnloadService::unload_data(&mut fixture, tx, &order(1)).unwrap();

    assert!(saw_pending.get());
    assert!(!is_loaded(&fixture, tx, &order(1)));
    assert!(is_loaded(&fixture, tx, &order(2)));
    assert!(!fixture.is_being_unloaded(&order(1)));
}

#[test]
fn hook_can_unload_another_object() {
    let mut fixture = TestHierarchy::new();
    let tx = fixture.root_transaction();
    fixture.get_or_load_many(tx, &[order(1), order(3)]).unwrap();
    fixture.set_unload_hook(
        order(1),
        Rc::new(FnHook::new(|hierarchy, tx, _| {
            UnloadService::unload_data(hierarchy, tx, &order(3))
        })),
    );

    UnloadService::unload_data(&mut fixture, tx, &order(1)).unwrap();
    assert!(!is_loaded(&fixture, tx, &order(1)));
    assert!(!is_loaded(&fixture, tx, &order(3)));
}

#[test]
fn listener_can_load_other_objects_while_unloading() {
    let (mut fixture, [root, _, leaf]) = TestHierarchy::three_levels();
    fixture.get_or_load(leaf, &order(1)).unwrap();
    fixture
        .add_listener(
            root,
            Rc::new(
                |hierarchy: &mut TransactionHierarchy,
                 tx: TransactionId,
                 event: &TransactionEvent|
                 -> CoreResult<()> {
                    if let TransactionEvent::ObjectsUnloading { object_ids } = event {
                        assert!(object_ids.iter().all(|id| hierarchy.is_being_unloaded(id)));
                        hierarchy.ensure_data_available(tx, &order(2))?;
                    }
                    Ok(())
                },
            ),
        )
        .unwrap();

    UnloadService::unload_data(&mut fixture, leaf, &order(1)).unwrap();

    assert!(!is_loaded(&fixture, root, &order(1)));
    assert!(is_loaded(&fixture, root, &order(2)));
    assert!(!is_loaded(&fixture, leaf, &order(2)));
}

#[test]
fn rejection_from_a_hook_is_an_error_for_try_variants() {
    let mut fixture = TestHierarchy::new();
    let tx = fixture.root_transaction();
    fixture.get_or_load(tx, &order(1)).unwrap();
    fixture.set_property(tx, &order(2), "OrderNumber", 20).unwrap();
    fixture.set_unload_hook(
        order(1),
        Rc::new(FnHook::new(|hierarchy, tx, _| {
            UnloadService::unload_data(hierarchy, tx, &order(2))
        })),
    );

    let err = UnloadService::try_unload_data(&mut fixture, tx, &order(1)).unwrap_err();

    assert!(err.is_unload_rejection());
    assert!(is_loaded(&fixture, tx, &order(1)));
    assert!(!fixture.is_being_unloaded(&order(1)));
}
