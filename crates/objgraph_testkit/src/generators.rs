//! Property-based test generators using proptest.
//!
//! Strategies produce objects and end-points of the fixture domain and
//! random sequences of engine operations; [`Operation::apply`] runs one
//! against a hierarchy, always issuing it from the current leaf.

use crate::fixtures::{
    all_objects, customer, customer_orders, order, order_items, order_ticket_of,
};
use objgraph_core::{CoreResult, RelationEndPointId, TransactionHierarchy, UnloadService};
use objgraph_store::ObjectId;
use proptest::prelude::*;

/// Strategy picking any object of the fixture store.
pub fn fixture_object_strategy() -> impl Strategy<Value = ObjectId> {
    prop::sample::select(all_objects())
}

/// Strategy picking a customer or an order.
pub fn owner_strategy() -> impl Strategy<Value = ObjectId> {
    prop_oneof![(1u128..=2).prop_map(customer), (1u128..=3).prop_map(order)]
}

/// Strategy picking a virtual end-point of the fixture domain.
pub fn virtual_end_point_strategy() -> impl Strategy<Value = RelationEndPointId> {
    prop_oneof![
        (1u128..=2).prop_map(customer_orders),
        (1u128..=3).prop_map(order_items),
        (1u128..=3).prop_map(order_ticket_of),
    ]
}

/// One engine operation.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Load an object.
    Load(ObjectId),
    /// Read a virtual end-point.
    Navigate(RelationEndPointId),
    /// Change an order number.
    SetOrderNumber(u128, i64),
    /// Move an order to another customer.
    MoveOrder(u128, u128),
    /// Create a new order for a customer.
    NewOrder(u128),
    /// Unload an object's data.
    UnloadData(ObjectId),
    /// Unload a virtual end-point.
    UnloadEndPoint(RelationEndPointId),
    /// Unload a virtual end-point with its items.
    UnloadEndPointAndItems(RelationEndPointId),
    /// Unload everything.
    UnloadAll,
    /// Unload all orders.
    UnloadOrders,
    /// Create a sub-transaction below the leaf.
    CreateSubTransaction,
    /// Commit the leaf.
    Commit,
    /// Roll back the leaf.
    Rollback,
}

impl Operation {
    /// Runs the operation from the current leaf transaction.
    ///
    /// Unload rejections are not errors; any other failure is returned.
    pub fn apply(&self, hierarchy: &mut TransactionHierarchy) -> CoreResult<()> {
        let tx = hierarchy.leaf_transaction();
        match self {
            Operation::Load(id) => {
                if !hierarchy.is_invalid(tx, id)? {
                    hierarchy.ensure_data_available(tx, id)?;
                }
            }
            Operation::Navigate(end_point_id) => {
                hierarchy.ensure_data_complete(tx, end_point_id)?;
            }
            Operation::SetOrderNumber(n, value) => {
                hierarchy.set_property(tx, &order(*n), "OrderNumber", *value)?;
            }
            Operation::MoveOrder(n, owner) => {
                hierarchy.set_related_object(tx, &order(*n), "Customer", Some(&customer(*owner)))?;
            }
            Operation::NewOrder(owner) => {
                let id = hierarchy.new_object(tx, &"Order".into())?;
                hierarchy.set_related_object(tx, &id, "Customer", Some(&customer(*owner)))?;
            }
            Operation::UnloadData(id) => {
                if !hierarchy.is_invalid(tx, id)? {
                    UnloadService::try_unload_data(hierarchy, tx, id)?;
                }
            }
            Operation::UnloadEndPoint(end_point_id) => {
                UnloadService::try_unload_virtual_end_point(hierarchy, tx, end_point_id)?;
            }
            Operation::UnloadEndPointAndItems(end_point_id) => {
                UnloadService::try_unload_virtual_end_point_and_item_data(
                    hierarchy,
                    tx,
                    end_point_id,
                )?;
            }
            Operation::UnloadAll => {
                UnloadService::unload_all(hierarchy, tx)?;
            }
            Operation::UnloadOrders => {
                UnloadService::try_unload_filtered(hierarchy, tx, |id| {
                    id.class_id().as_str() == "Order"
                })?;
            }
            Operation::CreateSubTransaction => {
                if hierarchy.depth() < 3 {
                    hierarchy.create_sub_transaction(tx)?;
                }
            }
            Operation::Commit => hierarchy.commit(tx)?,
            Operation::Rollback => hierarchy.rollback(tx)?,
        }
        Ok(())
    }
}

/// Strategy producing one operation.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        3 => fixture_object_strategy().prop_map(Operation::Load),
        3 => virtual_end_point_strategy().prop_map(Operation::Navigate),
        2 => (1u128..=3, 10i64..100).prop_map(|(n, v)| Operation::SetOrderNumber(n, v)),
        1 => (1u128..=3, 1u128..=2).prop_map(|(n, c)| Operation::MoveOrder(n, c)),
        1 => (1u128..=2).prop_map(Operation::NewOrder),
        3 => fixture_object_strategy().prop_map(Operation::UnloadData),
        2 => virtual_end_point_strategy().prop_map(Operation::UnloadEndPoint),
        2 => virtual_end_point_strategy().prop_map(Operation::UnloadEndPointAndItems),
        1 => Just(Operation::UnloadAll),
        1 => Just(Operation::UnloadOrders),
        1 => Just(Operation::CreateSubTransaction),
        1 => Just(Operation::Commit),
        1 => Just(Operation::Rollback),
    ]
}

/// Strategy producing a sequence of operations.
pub fn operations_strategy(max_len: usize) -> impl Strategy<Value = Vec<Operation>> {
    prop::collection::vec(operation_strategy(), 1..max_len)
}
