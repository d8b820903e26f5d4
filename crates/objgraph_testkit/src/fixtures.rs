//! Test fixtures and hierarchy helpers.
//!
//! The fixture domain is a small order system:
//!
//! - `Customer` (`Name`) has a collection of `Orders`
//! - `Order` (`OrderNumber`) belongs to a `Customer`, has a collection of
//!   `OrderItems` and an optional `OrderTicket`
//! - `OrderItem` (`Position`, `Product`) belongs to an `Order`
//! - `OrderTicket` (`FileName`) belongs to an `Order`
//! - `Location` (`City`) refers to a `Customer` as its `Client`; the relation
//!   cannot be navigated from the customer
//!
//! The store holds:
//!
//! | Object | Data | Relations |
//! |---|---|---|
//! | customer 1 | "Ada" | orders 1, 2 |
//! | customer 2 | "Grace" | order 3 |
//! | order 1 | 1 | items 1, 2; ticket 1 |
//! | order 2 | 2 | item 3 |
//! | order 3 | 3 | none |
//! | location 1 | "Lisbon" | client customer 1 |

use objgraph_core::{
    ClassDefinition, Config, MappingConfiguration, PropertyDefinition, RelationDefinition,
    RelationEndPointDefinition, RelationEndPointId, TransactionHierarchy,
};
use objgraph_store::{DataRecord, InMemoryStore, ObjectId};
use std::sync::Arc;

/// Builds the fixture mapping.
pub fn order_mapping() -> MappingConfiguration {
    MappingConfiguration::builder()
        .class(ClassDefinition::new("Customer").property("Name"))
        .class(
            ClassDefinition::new("Order")
                .property_definition(PropertyDefinition::new("OrderNumber").with_default(0)),
        )
        .class(
            ClassDefinition::new("OrderItem")
                .property("Position")
                .property("Product"),
        )
        .class(ClassDefinition::new("OrderTicket").property("FileName"))
        .class(ClassDefinition::new("Location").property("City"))
        .relation(RelationDefinition::new(
            "Customer:Orders",
            RelationEndPointDefinition::real("Order", "Customer"),
            RelationEndPointDefinition::collection("Customer", "Orders"),
        ))
        .relation(RelationDefinition::new(
            "Order:OrderItems",
            RelationEndPointDefinition::real("OrderItem", "Order"),
            RelationEndPointDefinition::collection("Order", "OrderItems"),
        ))
        .relation(RelationDefinition::new(
            "Order:OrderTicket",
            RelationEndPointDefinition::real("OrderTicket", "Order"),
            RelationEndPointDefinition::virtual_object("Order", "OrderTicket"),
        ))
        .relation(RelationDefinition::new(
            "Location:Client",
            RelationEndPointDefinition::real("Location", "Client"),
            RelationEndPointDefinition::anonymous("Customer"),
        ))
        .build()
        .expect("fixture mapping is valid")
}

/// Creates a store populated with the fixture records.
pub fn order_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store.insert(DataRecord::new(customer(1)).with_value("Name", "Ada"));
    store.insert(DataRecord::new(customer(2)).with_value("Name", "Grace"));
    for (n, owner) in [(1, 1), (2, 1), (3, 2)] {
        store.insert(
            DataRecord::new(order(n))
                .with_value("OrderNumber", i64::try_from(n).expect("small number"))
                .with_foreign_key("Customer", Some(customer(owner))),
        );
    }
    for (n, owner, product) in [(1, 1, "Mainboard"), (2, 1, "CPU"), (3, 2, "Harddisk")] {
        store.insert(
            DataRecord::new(order_item(n))
                .with_value("Position", i64::try_from(n).expect("small number"))
                .with_value("Product", product)
                .with_foreign_key("Order", Some(order(owner))),
        );
    }
    store.insert(
        DataRecord::new(order_ticket(1))
            .with_value("FileName", "ticket1.txt")
            .with_foreign_key("Order", Some(order(1))),
    );
    store.insert(
        DataRecord::new(location(1))
            .with_value("City", "Lisbon")
            .with_foreign_key("Client", Some(customer(1))),
    );
    store
}

/// A fixture hierarchy together with its store.
pub struct TestHierarchy {
    /// The hierarchy under test.
    pub hierarchy: TransactionHierarchy,
    /// The store behind the root transaction.
    pub store: Arc<InMemoryStore>,
}

impl TestHierarchy {
    /// Creates a hierarchy over the fixture store.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a hierarchy over the fixture store with custom configuration.
    pub fn with_config(config: Config) -> Self {
        Self::with_store(Arc::new(order_store()), config)
    }

    /// Creates a hierarchy over an existing store.
    pub fn with_store(store: Arc<InMemoryStore>, config: Config) -> Self {
        let hierarchy =
            TransactionHierarchy::with_config(Arc::new(order_mapping()), store.clone(), config);
        Self { hierarchy, store }
    }

    /// Creates a root, a middle and a leaf transaction.
    pub fn three_levels() -> (Self, [objgraph_core::TransactionId; 3]) {
        let mut fixture = Self::new();
        let root = fixture.root_transaction();
        let middle = fixture
            .create_sub_transaction(root)
            .expect("Failed to create middle transaction");
        let leaf = fixture
            .create_sub_transaction(middle)
            .expect("Failed to create leaf transaction");
        (fixture, [root, middle, leaf])
    }
}

impl Default for TestHierarchy {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestHierarchy {
    type Target = TransactionHierarchy;

    fn deref(&self) -> &Self::Target {
        &self.hierarchy
    }
}

impl std::ops::DerefMut for TestHierarchy {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.hierarchy
    }
}

/// Runs a test with a fresh fixture hierarchy.
///
/// # Example
///
/// ```rust,ignore
/// use objgraph_testkit::with_hierarchy;
///
/// #[test]
/// fn my_test() {
///     with_hierarchy(|hierarchy| {
///         let tx = hierarchy.root_transaction();
///         // ... test operations
///     });
/// }
/// ```
pub fn with_hierarchy<F, R>(f: F) -> R
where
    F: FnOnce(&mut TransactionHierarchy) -> R,
{
    let mut fixture = TestHierarchy::new();
    f(&mut fixture.hierarchy)
}

/// Customer `n`.
pub fn customer(n: u128) -> ObjectId {
    ObjectId::from_u128("Customer", n)
}

/// Order `n`.
pub fn order(n: u128) -> ObjectId {
    ObjectId::from_u128("Order", n)
}

/// Order item `n`.
pub fn order_item(n: u128) -> ObjectId {
    ObjectId::from_u128("OrderItem", n)
}

/// Order ticket `n`.
pub fn order_ticket(n: u128) -> ObjectId {
    ObjectId::from_u128("OrderTicket", n)
}

/// Location `n`.
pub fn location(n: u128) -> ObjectId {
    ObjectId::from_u128("Location", n)
}

/// Every object in the fixture store.
pub fn all_objects() -> Vec<ObjectId> {
    vec![
        customer(1),
        customer(2),
        order(1),
        order(2),
        order(3),
        order_item(1),
        order_item(2),
        order_item(3),
        order_ticket(1),
        location(1),
    ]
}

/// `Customer.Orders` of customer `n`.
pub fn customer_orders(n: u128) -> RelationEndPointId {
    RelationEndPointId::new(customer(n), "Orders")
}

/// `Order.Customer` of order `n`.
pub fn order_customer(n: u128) -> RelationEndPointId {
    RelationEndPointId::new(order(n), "Customer")
}

/// `Order.OrderItems` of order `n`.
pub fn order_items(n: u128) -> RelationEndPointId {
    RelationEndPointId::new(order(n), "OrderItems")
}

/// `Order.OrderTicket` of order `n`.
pub fn order_ticket_of(n: u128) -> RelationEndPointId {
    RelationEndPointId::new(order(n), "OrderTicket")
}

/// `OrderItem.Order` of item `n`.
pub fn item_order(n: u128) -> RelationEndPointId {
    RelationEndPointId::new(order_item(n), "Order")
}

/// `OrderTicket.Order` of ticket `n`.
pub fn ticket_order(n: u128) -> RelationEndPointId {
    RelationEndPointId::new(order_ticket(n), "Order")
}

/// `Location.Client` of location `n`.
pub fn location_client(n: u128) -> RelationEndPointId {
    RelationEndPointId::new(location(n), "Client")
}

#[cfg(test)]
mod tests {
    use super::*;
    use objgraph_core::Value;

    #[test]
    fn fixture_loads() {
        let mut fixture = TestHierarchy::new();
        let tx = fixture.root_transaction();
        assert_eq!(
            fixture.property(tx, &customer(2), "Name").unwrap(),
            Value::Text("Grace".into())
        );
        assert_eq!(fixture.related_objects(tx, &customer(1), "Orders").unwrap().len(), 2);
        assert_eq!(
            fixture.related_object(tx, &order(1), "OrderTicket").unwrap(),
            Some(order_ticket(1))
        );
        assert_eq!(fixture.store.len(), all_objects().len());
    }

    #[test]
    fn three_levels_form_a_chain() {
        let (fixture, [root, middle, leaf]) = TestHierarchy::three_levels();
        assert_eq!(fixture.depth(), 3);
        assert_eq!(fixture.parent_transaction(leaf).unwrap(), Some(middle));
        assert_eq!(fixture.parent_transaction(middle).unwrap(), Some(root));
    }
}
