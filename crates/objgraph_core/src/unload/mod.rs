//! Eviction of cached state from a transaction hierarchy.
//!
//! Every operation acts on all levels of the hierarchy at once: it is first
//! planned and validated against every level, and only then executed. A
//! rejected unload returns [`CoreError::NotUnloadable`] or
//! [`CoreError::InconsistentUnload`] and changes nothing; the `try_*`
//! variants report the same rejection as `Ok(false)`. Errors raised by
//! listeners and hooks are never turned into `false`, whatever their kind.
//!
//! Executing an unload raises, per affected level and leaf first:
//!
//! 1. `ObjectsUnloading` and each object's [`UnloadHook::on_unloading`]
//! 2. the map notifications (`RelationEndPointMapUnregistering`,
//!    `RelationEndPointBecomingIncomplete`, `DataContainerMapUnregistering`,
//!    `ObjectMarkedInvalid`)
//! 3. each object's [`UnloadHook::on_unloaded`] in reverse order, then
//!    `ObjectsUnloaded`
//!
//! Steps 1 and 2 complete for every level before anything is evicted, so an
//! error from a listener or hook leaves the hierarchy unchanged.
//!
//! [`UnloadHook::on_unloading`]: crate::UnloadHook::on_unloading
//! [`UnloadHook::on_unloaded`]: crate::UnloadHook::on_unloaded

mod execute;
mod plan;
mod problem;

pub use problem::UnloadProblem;

use crate::end_point::RelationEndPointId;
use crate::error::CoreResult;
use crate::transaction::TransactionHierarchy;
use crate::types::TransactionId;
use objgraph_store::ObjectId;
use plan::UnloadPlan;

/// Entry points for unloading data and relations.
///
/// All operations take the transaction they are issued from; the unload
/// nevertheless covers the whole hierarchy.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnloadService;

impl UnloadService {
    /// Unloads the data container and foreign keys of an object.
    ///
    /// Virtual end-points opposite the object's foreign keys become
    /// incomplete; the object's own virtual end-points stay. Unloading an
    /// object that is not loaded anywhere does nothing.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ObjectInvalid`] if the object is invalid in `tx`
    /// - [`CoreError::NotUnloadable`] if the object or one of its
    ///   end-points has pending changes at any level
    /// - [`CoreError::InconsistentUnload`] if a virtual end-point opposite
    ///   one of its foreign keys has changed
    /// - any error raised by a listener or hook
    pub fn unload_data(
        hierarchy: &mut TransactionHierarchy,
        tx: TransactionId,
        id: &ObjectId,
    ) -> CoreResult<()> {
        let plan = data_plan(hierarchy, tx, id)?;
        execute::execute(hierarchy, &plan)
    }

    /// Like [`Self::unload_data`], returning `Ok(false)` on rejection.
    ///
    /// # Errors
    ///
    /// Everything [`Self::unload_data`] returns except a rejection.
    pub fn try_unload_data(
        hierarchy: &mut TransactionHierarchy,
        tx: TransactionId,
        id: &ObjectId,
    ) -> CoreResult<bool> {
        let planned = data_plan(hierarchy, tx, id);
        unloaded(hierarchy, planned)
    }

    /// Marks a virtual end-point incomplete at every level; it is reloaded
    /// on next access.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidEndPoint`] if the end-point is not virtual
    /// - [`CoreError::NotUnloadable`] if the end-point has changed or its
    ///   owner is new or deleted at any level
    /// - any error raised by a listener
    pub fn unload_virtual_end_point(
        hierarchy: &mut TransactionHierarchy,
        tx: TransactionId,
        end_point_id: &RelationEndPointId,
    ) -> CoreResult<()> {
        let plan = virtual_end_point_plan(hierarchy, tx, end_point_id, false)?;
        execute::execute(hierarchy, &plan)
    }

    /// Like [`Self::unload_virtual_end_point`], returning `Ok(false)` on
    /// rejection.
    ///
    /// # Errors
    ///
    /// Everything [`Self::unload_virtual_end_point`] returns except a
    /// rejection.
    pub fn try_unload_virtual_end_point(
        hierarchy: &mut TransactionHierarchy,
        tx: TransactionId,
        end_point_id: &RelationEndPointId,
    ) -> CoreResult<bool> {
        let planned = virtual_end_point_plan(hierarchy, tx, end_point_id, false);
        unloaded(hierarchy, planned)
    }

    /// Unloads a virtual end-point together with the data of every object
    /// it currently or originally refers to.
    ///
    /// # Errors
    ///
    /// As [`Self::unload_virtual_end_point`]; additionally
    /// [`CoreError::InconsistentUnload`] if an item is not unchanged.
    pub fn unload_virtual_end_point_and_item_data(
        hierarchy: &mut TransactionHierarchy,
        tx: TransactionId,
        end_point_id: &RelationEndPointId,
    ) -> CoreResult<()> {
        let plan = virtual_end_point_plan(hierarchy, tx, end_point_id, true)?;
        execute::execute(hierarchy, &plan)
    }

    /// Like [`Self::unload_virtual_end_point_and_item_data`], returning
    /// `Ok(false)` on rejection.
    ///
    /// # Errors
    ///
    /// Everything [`Self::unload_virtual_end_point_and_item_data`] returns
    /// except a rejection.
    pub fn try_unload_virtual_end_point_and_item_data(
        hierarchy: &mut TransactionHierarchy,
        tx: TransactionId,
        end_point_id: &RelationEndPointId,
    ) -> CoreResult<bool> {
        let planned = virtual_end_point_plan(hierarchy, tx, end_point_id, true);
        unloaded(hierarchy, planned)
    }

    /// Evicts every data container and end-point at every level.
    ///
    /// Pending changes are discarded. New objects become invalid everywhere.
    ///
    /// # Errors
    ///
    /// Only errors raised by listeners or hooks; such an error leaves the
    /// hierarchy unchanged.
    pub fn unload_all(hierarchy: &mut TransactionHierarchy, tx: TransactionId) -> CoreResult<()> {
        let plan = filtered_plan(hierarchy, tx, None)?;
        execute::execute(hierarchy, &plan)
    }

    /// Like [`Self::unload_all`], returning `Ok(true)` once done.
    ///
    /// # Errors
    ///
    /// Everything [`Self::unload_all`] returns.
    pub fn try_unload_all(hierarchy: &mut TransactionHierarchy, tx: TransactionId) -> CoreResult<bool> {
        let planned = filtered_plan(hierarchy, tx, None);
        unloaded(hierarchy, planned)
    }

    /// Evicts the objects selected by `filter`, with all their end-points,
    /// from every level.
    ///
    /// Pending changes of selected objects are discarded and selected new
    /// objects become invalid. Virtual end-points of remaining objects that
    /// refer to selected objects become incomplete.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InconsistentUnload`] if a changed relation connects a
    ///   selected object with a remaining one
    /// - any error raised by a listener or hook
    pub fn unload_filtered<F>(
        hierarchy: &mut TransactionHierarchy,
        tx: TransactionId,
        filter: F,
    ) -> CoreResult<()>
    where
        F: Fn(&ObjectId) -> bool,
    {
        let plan = filtered_plan(hierarchy, tx, Some(&filter))?;
        execute::execute(hierarchy, &plan)
    }

    /// Like [`Self::unload_filtered`], returning `Ok(false)` on rejection.
    ///
    /// # Errors
    ///
    /// Everything [`Self::unload_filtered`] returns except a rejection.
    pub fn try_unload_filtered<F>(
        hierarchy: &mut TransactionHierarchy,
        tx: TransactionId,
        filter: F,
    ) -> CoreResult<bool>
    where
        F: Fn(&ObjectId) -> bool,
    {
        let planned = filtered_plan(hierarchy, tx, Some(&filter));
        unloaded(hierarchy, planned)
    }
}

fn data_plan(
    hierarchy: &TransactionHierarchy,
    tx: TransactionId,
    id: &ObjectId,
) -> CoreResult<UnloadPlan> {
    let level = hierarchy.level_of(tx)?;
    hierarchy.ensure_valid(level, id)?;
    plan::plan_data(hierarchy, std::slice::from_ref(id), None)
}

fn virtual_end_point_plan(
    hierarchy: &TransactionHierarchy,
    tx: TransactionId,
    end_point_id: &RelationEndPointId,
    with_items: bool,
) -> CoreResult<UnloadPlan> {
    let level = hierarchy.level_of(tx)?;
    hierarchy.ensure_valid(level, &end_point_id.object_id)?;
    plan::plan_virtual_end_point(hierarchy, end_point_id, with_items)
}

fn filtered_plan(
    hierarchy: &TransactionHierarchy,
    tx: TransactionId,
    filter: Option<&dyn Fn(&ObjectId) -> bool>,
) -> CoreResult<UnloadPlan> {
    hierarchy.level_of(tx)?;
    plan::plan_filtered(hierarchy, filter)
}

/// Runs a plan for a `try_*` variant.
///
/// Only a rejection from planning becomes `false`. Once execution starts
/// every error is passed on, since callbacks may already have changed state.
fn unloaded(
    hierarchy: &mut TransactionHierarchy,
    planned: CoreResult<UnloadPlan>,
) -> CoreResult<bool> {
    match planned {
        Ok(plan) => execute::execute(hierarchy, &plan).map(|()| true),
        Err(err) if err.is_unload_rejection() => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataContainerState;
    use crate::error::CoreError;
    use crate::listener::{ClientTransactionListener, TransactionEvent, UnloadHook};
    use crate::transaction::hierarchy::tests::{customer, fixture, order, ticket};
    use objgraph_store::{ClassId, Value};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn orders_of_customer() -> RelationEndPointId {
        RelationEndPointId::new(customer(), "Orders")
    }

    fn is_complete(hierarchy: &TransactionHierarchy, tx: TransactionId, id: &RelationEndPointId) -> bool {
        hierarchy
            .end_point(tx, id)
            .unwrap()
            .is_some_and(|e| e.is_data_complete())
    }

    #[test]
    fn unload_data_evicts_and_reloads() {
        let (mut hierarchy, store) = fixture();
        let tx = hierarchy.root_transaction();
        assert_eq!(hierarchy.related_objects(tx, &customer(), "Orders").unwrap().len(), 2);
        let loads = store.load_count();

        UnloadService::unload_data(&mut hierarchy, tx, &order(1)).unwrap();

        assert!(hierarchy.data_container(tx, &order(1)).unwrap().is_none());
        let customer_end_point = RelationEndPointId::new(order(1), "Customer");
        assert!(hierarchy.end_point(tx, &customer_end_point).unwrap().is_none());
        assert!(!is_complete(&hierarchy, tx, &orders_of_customer()));

        assert_eq!(
            hierarchy.property(tx, &order(1), "OrderNumber").unwrap(),
            Value::Integer(1)
        );
        assert!(store.load_count() > loads);
    }

    #[test]
    fn own_virtual_end_points_survive_data_unload() {
        let (mut hierarchy, _) = fixture();
        let tx = hierarchy.root_transaction();
        hierarchy.get_or_load(tx, &customer()).unwrap();
        hierarchy.related_objects(tx, &customer(), "Orders").unwrap();

        UnloadService::unload_data(&mut hierarchy, tx, &customer()).unwrap();

        assert!(hierarchy.data_container(tx, &customer()).unwrap().is_none());
        assert!(is_complete(&hierarchy, tx, &orders_of_customer()));
    }

    #[test]
    fn unloading_an_unloaded_object_does_nothing() {
        let (mut hierarchy, _) = fixture();
        let tx = hierarchy.root_transaction();
        let events = Rc::new(RefCell::new(0));
        let counter = events.clone();
        hierarchy
            .add_listener(
                tx,
                Rc::new(move |_: &mut TransactionHierarchy, _: TransactionId, _: &TransactionEvent| -> CoreResult<()> {
                    *counter.borrow_mut() += 1;
                    Ok(())
                }),
            )
            .unwrap();

        assert!(UnloadService::try_unload_data(&mut hierarchy, tx, &order(2)).unwrap());
        assert_eq!(*events.borrow(), 0);
    }

    #[test]
    fn changed_object_is_not_unloadable() {
        let (mut hierarchy, _) = fixture();
        let tx = hierarchy.root_transaction();
        hierarchy.set_property(tx, &order(1), "OrderNumber", 7).unwrap();

        let err = UnloadService::unload_data(&mut hierarchy, tx, &order(1)).unwrap_err();
        assert!(matches!(err, CoreError::NotUnloadable { .. }));
        assert!(matches!(
            err.unload_problems(),
            [UnloadProblem::ObjectState {
                state: DataContainerState::Changed,
                ..
            }]
        ));
        assert!(!UnloadService::try_unload_data(&mut hierarchy, tx, &order(1)).unwrap());
        assert_eq!(
            hierarchy.property(tx, &order(1), "OrderNumber").unwrap(),
            Value::Integer(7)
        );
    }

    #[test]
    fn changed_opposite_collection_blocks_data_unload() {
        let (mut hierarchy, _) = fixture();
        let tx = hierarchy.root_transaction();
        let new_order = hierarchy.new_object(tx, &ClassId::new("Order")).unwrap();
        hierarchy
            .set_related_object(tx, &new_order, "Customer", Some(&customer()))
            .unwrap();

        let err = UnloadService::unload_data(&mut hierarchy, tx, &order(1)).unwrap_err();
        assert!(matches!(err, CoreError::InconsistentUnload { .. }));
        assert!(hierarchy.data_container(tx, &order(1)).unwrap().is_some());
    }

    #[test]
    fn invalid_object_cannot_be_unloaded() {
        let (mut hierarchy, _) = fixture();
        let tx = hierarchy.root_transaction();
        let id = hierarchy.new_object(tx, &ClassId::new("Order")).unwrap();
        hierarchy.delete_object(tx, &id).unwrap();

        let err = UnloadService::try_unload_data(&mut hierarchy, tx, &id).unwrap_err();
        assert!(matches!(err, CoreError::ObjectInvalid { .. }));
    }

    #[test]
    fn real_end_point_is_not_a_virtual_end_point() {
        let (mut hierarchy, _) = fixture();
        let tx = hierarchy.root_transaction();
        let id = RelationEndPointId::new(order(1), "Customer");
        let err = UnloadService::unload_virtual_end_point(&mut hierarchy, tx, &id).unwrap_err();
        assert!(matches!(err, CoreError::InvalidEndPoint { .. }));
    }

    #[test]
    fn virtual_end_point_becomes_incomplete_at_every_level() {
        let (mut hierarchy, _) = fixture();
        let root = hierarchy.root_transaction();
        let sub = hierarchy.create_sub_transaction(root).unwrap();
        hierarchy.related_objects(sub, &customer(), "Orders").unwrap();
        assert!(is_complete(&hierarchy, root, &orders_of_customer()));
        assert!(is_complete(&hierarchy, sub, &orders_of_customer()));

        UnloadService::unload_virtual_end_point(&mut hierarchy, root, &orders_of_customer()).unwrap();

        assert!(!is_complete(&hierarchy, root, &orders_of_customer()));
        assert!(!is_complete(&hierarchy, sub, &orders_of_customer()));
        assert_eq!(hierarchy.related_objects(sub, &customer(), "Orders").unwrap().len(), 2);
    }

    #[test]
    fn changed_virtual_end_point_in_sub_transaction_blocks_unload() {
        let (mut hierarchy, _) = fixture();
        let root = hierarchy.root_transaction();
        let sub = hierarchy.create_sub_transaction(root).unwrap();
        hierarchy
            .remove_related_object(sub, &customer(), "Orders", &order(2))
            .unwrap();

        assert!(!UnloadService::try_unload_virtual_end_point(&mut hierarchy, root, &orders_of_customer()).unwrap());
        assert!(is_complete(&hierarchy, root, &orders_of_customer()));
        assert!(is_complete(&hierarchy, sub, &orders_of_customer()));
    }

    #[test]
    fn end_point_with_items_unloads_item_data() {
        let (mut hierarchy, _) = fixture();
        let tx = hierarchy.root_transaction();
        hierarchy.related_objects(tx, &customer(), "Orders").unwrap();
        hierarchy.get_or_load_many(tx, &[customer(), order(1), order(2)]).unwrap();

        UnloadService::unload_virtual_end_point_and_item_data(&mut hierarchy, tx, &orders_of_customer())
            .unwrap();

        assert!(hierarchy.data_container(tx, &order(1)).unwrap().is_none());
        assert!(hierarchy.data_container(tx, &order(2)).unwrap().is_none());
        assert!(hierarchy.data_container(tx, &customer()).unwrap().is_some());
        assert!(!is_complete(&hierarchy, tx, &orders_of_customer()));
    }

    #[test]
    fn changed_item_is_reported_as_structural() {
        let (mut hierarchy, _) = fixture();
        let tx = hierarchy.root_transaction();
        hierarchy.related_objects(tx, &customer(), "Orders").unwrap();
        hierarchy.set_property(tx, &order(2), "OrderNumber", 20).unwrap();

        let err = UnloadService::unload_virtual_end_point_and_item_data(&mut hierarchy, tx, &orders_of_customer())
            .unwrap_err();
        assert!(matches!(err, CoreError::InconsistentUnload { .. }));
        assert!(err
            .unload_problems()
            .iter()
            .any(|p| matches!(p, UnloadProblem::ItemNotUnchanged { object_id, .. } if *object_id == order(2))));
    }

    #[test]
    fn unload_all_clears_every_level_and_invalidates_new_objects() {
        let (mut hierarchy, _) = fixture();
        let root = hierarchy.root_transaction();
        hierarchy.related_objects(root, &customer(), "Orders").unwrap();
        let sub = hierarchy.create_sub_transaction(root).unwrap();
        hierarchy.set_property(sub, &order(1), "OrderNumber", 5).unwrap();
        let created = hierarchy.new_object(sub, &ClassId::new("Order")).unwrap();

        UnloadService::unload_all(&mut hierarchy, sub).unwrap();

        for tx in [root, sub] {
            assert!(hierarchy.transaction(tx).unwrap().data_manager().is_empty());
            assert!(hierarchy.is_invalid(tx, &created).unwrap());
        }
        assert_eq!(
            hierarchy.property(sub, &order(1), "OrderNumber").unwrap(),
            Value::Integer(1)
        );
    }

    #[test]
    fn unload_filtered_keeps_unselected_objects() {
        let (mut hierarchy, _) = fixture();
        let tx = hierarchy.root_transaction();
        hierarchy.related_objects(tx, &customer(), "Orders").unwrap();
        hierarchy.get_or_load(tx, &customer()).unwrap();

        let order_class = ClassId::new("Order");
        UnloadService::unload_filtered(&mut hierarchy, tx, |id| id.class_id() == &order_class).unwrap();

        assert!(hierarchy.data_container(tx, &order(1)).unwrap().is_none());
        assert!(hierarchy.data_container(tx, &customer()).unwrap().is_some());
        assert!(!is_complete(&hierarchy, tx, &orders_of_customer()));
    }

    #[test]
    fn unload_filtered_refuses_to_strand_changed_relations() {
        let (mut hierarchy, _) = fixture();
        let tx = hierarchy.root_transaction();
        hierarchy.set_related_object(tx, &ticket(), "Order", Some(&order(2))).unwrap();

        let ticket_class = ClassId::new("OrderTicket");
        let selected = |id: &ObjectId| id.class_id() == &ticket_class;
        assert!(!UnloadService::try_unload_filtered(&mut hierarchy, tx, selected).unwrap());
        assert!(hierarchy.data_container(tx, &ticket()).unwrap().is_some());
    }

    struct Recorder(Rc<RefCell<Vec<String>>>);

    impl UnloadHook for Recorder {
        fn on_unloading(
            &self,
            hierarchy: &mut TransactionHierarchy,
            transaction_id: TransactionId,
            object_id: &ObjectId,
        ) -> CoreResult<()> {
            assert!(hierarchy.is_being_unloaded(object_id));
            self.0.borrow_mut().push(format!("unloading {object_id} in {transaction_id}"));
            Ok(())
        }

        fn on_unloaded(
            &self,
            hierarchy: &mut TransactionHierarchy,
            transaction_id: TransactionId,
            object_id: &ObjectId,
        ) -> CoreResult<()> {
            assert!(!hierarchy.is_being_unloaded(object_id));
            self.0.borrow_mut().push(format!("unloaded {object_id} in {transaction_id}"));
            Ok(())
        }
    }

    #[test]
    fn hooks_run_per_level_leaf_first() {
        let (mut hierarchy, _) = fixture();
        let root = hierarchy.root_transaction();
        let sub = hierarchy.create_sub_transaction(root).unwrap();
        hierarchy.get_or_load(sub, &order(1)).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        hierarchy.set_unload_hook(order(1), Rc::new(Recorder(log.clone())));

        UnloadService::unload_data(&mut hierarchy, root, &order(1)).unwrap();

        let id = order(1);
        assert_eq!(
            *log.borrow(),
            vec![
                format!("unloading {id} in {sub}"),
                format!("unloading {id} in {root}"),
                format!("unloaded {id} in {sub}"),
                format!("unloaded {id} in {root}"),
            ]
        );
    }

    struct Reentrant;

    impl UnloadHook for Reentrant {
        fn on_unloading(
            &self,
            hierarchy: &mut TransactionHierarchy,
            transaction_id: TransactionId,
            object_id: &ObjectId,
        ) -> CoreResult<()> {
            // Reads work, writes and nested unloads of the same object do not.
            hierarchy.property(transaction_id, object_id, "OrderNumber")?;
            let err = hierarchy
                .set_property(transaction_id, object_id, "OrderNumber", 3)
                .unwrap_err();
            assert!(matches!(err, CoreError::ObjectBeingUnloaded { .. }));
            let err = UnloadService::unload_data(hierarchy, transaction_id, object_id).unwrap_err();
            assert!(matches!(err, CoreError::ObjectBeingUnloaded { .. }));
            hierarchy.get_or_load(transaction_id, &order(2))?;
            Ok(())
        }
    }

    #[test]
    fn hooks_may_reenter() {
        let (mut hierarchy, _) = fixture();
        let tx = hierarchy.root_transaction();
        hierarchy.get_or_load(tx, &order(1)).unwrap();
        hierarchy.set_unload_hook(order(1), Rc::new(Reentrant));

        UnloadService::unload_data(&mut hierarchy, tx, &order(1)).unwrap();

        assert!(hierarchy.data_container(tx, &order(1)).unwrap().is_none());
        assert!(hierarchy.data_container(tx, &order(2)).unwrap().is_some());
    }

    struct Refuse;

    impl UnloadHook for Refuse {
        fn on_unloading(&self, _: &mut TransactionHierarchy, _: TransactionId, _: &ObjectId) -> CoreResult<()> {
            Err(CoreError::invalid_operation("refused"))
        }
    }

    #[test]
    fn failing_hook_leaves_everything_loaded() {
        let (mut hierarchy, _) = fixture();
        let tx = hierarchy.root_transaction();
        hierarchy.related_objects(tx, &customer(), "Orders").unwrap();
        hierarchy.get_or_load_many(tx, &[order(1), order(2)]).unwrap();
        hierarchy.set_unload_hook(order(2), Rc::new(Refuse));

        let err = UnloadService::unload_all(&mut hierarchy, tx).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
        assert!(hierarchy.data_container(tx, &order(1)).unwrap().is_some());
        assert!(hierarchy.data_container(tx, &order(2)).unwrap().is_some());
        assert!(is_complete(&hierarchy, tx, &orders_of_customer()));
        assert!(!hierarchy.is_being_unloaded(&order(1)));
    }

    struct UnloadOther(ObjectId);

    impl UnloadHook for UnloadOther {
        fn on_unloaded(&self, hierarchy: &mut TransactionHierarchy, tx: TransactionId, _: &ObjectId) -> CoreResult<()> {
            UnloadService::unload_data(hierarchy, tx, &self.0)
        }
    }

    #[test]
    fn rejection_raised_by_a_hook_is_not_reported_as_false() {
        let (mut hierarchy, _) = fixture();
        let tx = hierarchy.root_transaction();
        hierarchy.get_or_load(tx, &order(1)).unwrap();
        hierarchy.set_property(tx, &order(2), "OrderNumber", 20).unwrap();
        hierarchy.set_unload_hook(order(1), Rc::new(UnloadOther(order(2))));

        let err = UnloadService::try_unload_data(&mut hierarchy, tx, &order(1)).unwrap_err();

        assert!(matches!(err, CoreError::NotUnloadable { .. }));
        assert!(hierarchy.data_container(tx, &order(1)).unwrap().is_none());
        assert!(hierarchy.data_container(tx, &order(2)).unwrap().is_some());
    }

    struct LoadOnUnloading(ObjectId);

    impl ClientTransactionListener for LoadOnUnloading {
        fn on_event(
            &self,
            hierarchy: &mut TransactionHierarchy,
            transaction_id: TransactionId,
            event: &TransactionEvent,
        ) -> CoreResult<()> {
            if matches!(event, TransactionEvent::ObjectsUnloading { .. }) {
                hierarchy.ensure_data_available(transaction_id, &self.0)?;
                let err = hierarchy.rollback(transaction_id).unwrap_err();
                assert!(matches!(err, CoreError::InvalidOperation { .. }));
            }
            Ok(())
        }
    }

    #[test]
    fn listeners_may_load_while_an_unload_is_announced() {
        let (mut hierarchy, _) = fixture();
        let tx = hierarchy.root_transaction();
        hierarchy.get_or_load(tx, &order(1)).unwrap();
        hierarchy
            .add_listener(tx, Rc::new(LoadOnUnloading(order(2))))
            .unwrap();

        UnloadService::unload_data(&mut hierarchy, tx, &order(1)).unwrap();

        assert!(hierarchy.data_container(tx, &order(1)).unwrap().is_none());
        assert!(hierarchy.data_container(tx, &order(2)).unwrap().is_some());
    }

    #[test]
    fn lifecycle_operations_are_refused_from_listeners() {
        let (mut hierarchy, _) = fixture();
        let tx = hierarchy.root_transaction();
        let refused = Rc::new(RefCell::new(Vec::new()));
        let seen = refused.clone();
        hierarchy
            .add_listener(
                tx,
                Rc::new(move |h: &mut TransactionHierarchy, tx: TransactionId, event: &TransactionEvent| -> CoreResult<()> {
                    if matches!(event, TransactionEvent::ObjectsLoaded { .. }) {
                        let err = h.create_sub_transaction(tx).unwrap_err();
                        seen.borrow_mut().push(err.to_string());
                    }
                    Ok(())
                }),
            )
            .unwrap();

        hierarchy.get_or_load(tx, &order(1)).unwrap();

        assert_eq!(refused.borrow().len(), 1);
        assert!(refused.borrow()[0].contains("from a listener"));
        assert_eq!(hierarchy.depth(), 1);
        hierarchy.create_sub_transaction(tx).unwrap();
    }

    #[test]
    fn invalidated_objects_lose_their_hooks() {
        let (mut hierarchy, _) = fixture();
        let tx = hierarchy.root_transaction();
        let unloaded_new = hierarchy.new_object(tx, &ClassId::new("Order")).unwrap();
        let rolled_back = hierarchy.new_object(tx, &ClassId::new("Order")).unwrap();
        hierarchy.get_or_load(tx, &order(1)).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        for id in [&unloaded_new, &rolled_back, &order(1)] {
            hierarchy.set_unload_hook(id.clone(), Rc::new(Recorder(log.clone())));
        }

        let filter = |id: &ObjectId| *id == unloaded_new || *id == order(1);
        UnloadService::unload_filtered(&mut hierarchy, tx, filter).unwrap();
        assert!(hierarchy.unload_hook(&unloaded_new).is_none());
        assert!(hierarchy.unload_hook(&order(1)).is_some());
        assert!(log.borrow().contains(&format!("unloaded {unloaded_new} in {tx}")));

        hierarchy.rollback(tx).unwrap();
        assert!(hierarchy.unload_hook(&rolled_back).is_none());
    }
}
