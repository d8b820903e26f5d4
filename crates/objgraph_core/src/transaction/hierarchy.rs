//! The transaction hierarchy arena.

use super::client::ClientTransaction;
use crate::config::Config;
use crate::data::{DataContainer, DataContainerState, ObjectState};
use crate::end_point::{RelationEndPoint, RelationEndPointId};
use crate::error::{CoreError, CoreResult};
use crate::listener::{ClientTransactionListener, TransactionEvent, UnloadHook};
use crate::mapping::MappingConfiguration;
use crate::types::TransactionId;
use objgraph_store::{ObjectId, PersistenceStore};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::trace;

/// Objects and end-points whose unload notifications are in progress.
#[derive(Debug, Default)]
pub(crate) struct PendingUnload {
    pub(crate) objects: HashSet<ObjectId>,
    pub(crate) end_points: HashSet<RelationEndPointId>,
}

impl PendingUnload {
    pub(crate) fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.end_points.is_empty()
    }
}

/// A root transaction and its chain of nested sub-transactions.
///
/// The hierarchy owns every [`ClientTransaction`]. Callers address them
/// through [`TransactionId`] handles; a handle of a discarded transaction is
/// rejected with [`CoreError::TransactionNotFound`].
///
/// Levels form a chain: only the innermost transaction (the leaf) may have
/// a sub-transaction created below it, and only the leaf accepts
/// modifications. Every level holds its own copies of the data containers
/// and end-points it has loaded; a sub-transaction loads from its parent.
pub struct TransactionHierarchy {
    config: Config,
    mapping: Arc<MappingConfiguration>,
    store: Arc<dyn PersistenceStore>,
    /// Index 0 is the root, the last entry is the leaf.
    levels: Vec<ClientTransaction>,
    next_transaction_id: TransactionId,
    hooks: HashMap<ObjectId, Rc<dyn UnloadHook>>,
    pending: PendingUnload,
    /// Number of listener fan-outs currently running.
    notifying: usize,
    pub(super) scopes: Vec<TransactionId>,
}

impl TransactionHierarchy {
    /// Creates a hierarchy with a single root transaction.
    #[must_use]
    pub fn new(mapping: Arc<MappingConfiguration>, store: Arc<dyn PersistenceStore>) -> Self {
        Self::with_config(mapping, store, Config::default())
    }

    /// Creates a hierarchy with custom configuration.
    #[must_use]
    pub fn with_config(
        mapping: Arc<MappingConfiguration>,
        store: Arc<dyn PersistenceStore>,
        config: Config,
    ) -> Self {
        let root_id = TransactionId::new(1);
        Self {
            config,
            mapping,
            store,
            levels: vec![ClientTransaction::new(root_id, None)],
            next_transaction_id: root_id.next(),
            hooks: HashMap::new(),
            pending: PendingUnload::default(),
            notifying: 0,
            scopes: Vec::new(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the mapping.
    #[must_use]
    pub fn mapping(&self) -> &MappingConfiguration {
        &self.mapping
    }

    /// Returns the persistence store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn PersistenceStore> {
        &self.store
    }

    /// Returns the root transaction.
    #[must_use]
    pub fn root_transaction(&self) -> TransactionId {
        self.levels[0].id()
    }

    /// Returns the innermost transaction.
    #[must_use]
    pub fn leaf_transaction(&self) -> TransactionId {
        self.levels[self.levels.len() - 1].id()
    }

    /// Returns all transactions from the root to the leaf.
    #[must_use]
    pub fn transaction_ids(&self) -> Vec<TransactionId> {
        self.levels.iter().map(ClientTransaction::id).collect()
    }

    /// Returns the number of transactions in the hierarchy.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Returns a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionNotFound`] for an unknown handle.
    pub fn transaction(&self, tx: TransactionId) -> CoreResult<&ClientTransaction> {
        Ok(&self.levels[self.level_of(tx)?])
    }

    /// Returns the parent of a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionNotFound`] for an unknown handle.
    pub fn parent_transaction(&self, tx: TransactionId) -> CoreResult<Option<TransactionId>> {
        Ok(self.transaction(tx)?.parent())
    }

    /// Returns the sub-transaction of a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionNotFound`] for an unknown handle.
    pub fn sub_transaction(&self, tx: TransactionId) -> CoreResult<Option<TransactionId>> {
        let level = self.level_of(tx)?;
        Ok(self.levels.get(level + 1).map(ClientTransaction::id))
    }

    /// Registers a listener on a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionNotFound`] for an unknown handle.
    pub fn add_listener(
        &mut self,
        tx: TransactionId,
        listener: Rc<dyn ClientTransactionListener>,
    ) -> CoreResult<()> {
        let level = self.level_of(tx)?;
        self.levels[level].add_listener(listener);
        Ok(())
    }

    /// Registers the unload hook of an object, replacing any previous one.
    ///
    /// The hook is shared by every level of the hierarchy.
    pub fn set_unload_hook(&mut self, object_id: ObjectId, hook: Rc<dyn UnloadHook>) {
        self.hooks.insert(object_id, hook);
    }

    /// Removes the unload hook of an object.
    pub fn remove_unload_hook(&mut self, object_id: &ObjectId) -> Option<Rc<dyn UnloadHook>> {
        self.hooks.remove(object_id)
    }

    /// Returns the data container of an object in a transaction, if loaded.
    ///
    /// Never loads.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionNotFound`] for an unknown handle.
    pub fn data_container(
        &self,
        tx: TransactionId,
        id: &ObjectId,
    ) -> CoreResult<Option<&DataContainer>> {
        Ok(self.transaction(tx)?.data_manager().data_container(id))
    }

    /// Returns an end-point in a transaction, if registered.
    ///
    /// Never loads.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionNotFound`] for an unknown handle.
    pub fn end_point(
        &self,
        tx: TransactionId,
        id: &RelationEndPointId,
    ) -> CoreResult<Option<&RelationEndPoint>> {
        Ok(self.transaction(tx)?.data_manager().end_point(id))
    }

    /// Returns `true` if the object is invalid in a transaction.
    ///
    /// An object is invalid where it was marked invalid, below any level
    /// where it was marked invalid, and below any level where it is deleted.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionNotFound`] for an unknown handle.
    pub fn is_invalid(&self, tx: TransactionId, id: &ObjectId) -> CoreResult<bool> {
        Ok(self.is_invalid_at(self.level_of(tx)?, id))
    }

    /// Returns the state of an object as seen from a transaction.
    ///
    /// Never loads.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionNotFound`] for an unknown handle.
    pub fn object_state(&self, tx: TransactionId, id: &ObjectId) -> CoreResult<ObjectState> {
        let level = self.level_of(tx)?;
        if self.is_invalid_at(level, id) {
            return Ok(ObjectState::Invalid);
        }
        let data_manager = self.levels[level].data_manager();
        Ok(match data_manager.data_container(id) {
            Some(container) => {
                let relations_changed = data_manager
                    .end_points_of(id)
                    .any(RelationEndPoint::has_changed);
                ObjectState::from_parts(container.state(), relations_changed)
            }
            None => ObjectState::NotLoadedYet,
        })
    }

    /// Returns `true` while the object's unload notifications are running.
    #[must_use]
    pub fn is_being_unloaded(&self, id: &ObjectId) -> bool {
        self.pending.objects.contains(id)
    }

    pub(crate) fn level_of(&self, tx: TransactionId) -> CoreResult<usize> {
        self.levels
            .iter()
            .position(|t| t.id() == tx)
            .ok_or(CoreError::TransactionNotFound { transaction_id: tx })
    }

    pub(crate) fn level(&self, level: usize) -> &ClientTransaction {
        &self.levels[level]
    }

    pub(crate) fn level_mut(&mut self, level: usize) -> &mut ClientTransaction {
        &mut self.levels[level]
    }

    pub(crate) fn leaf_level(&self) -> usize {
        self.levels.len() - 1
    }

    pub(crate) fn push_level(&mut self) -> TransactionId {
        let id = self.next_transaction_id;
        self.next_transaction_id = id.next();
        let parent = self.leaf_transaction();
        self.levels.push(ClientTransaction::new(id, Some(parent)));
        id
    }

    pub(crate) fn pop_level(&mut self) -> Option<ClientTransaction> {
        if self.levels.len() > 1 {
            self.levels.pop()
        } else {
            None
        }
    }

    pub(crate) fn unload_hook(&self, id: &ObjectId) -> Option<Rc<dyn UnloadHook>> {
        self.hooks.get(id).cloned()
    }

    pub(crate) fn pending(&self) -> &PendingUnload {
        &self.pending
    }

    pub(crate) fn pending_mut(&mut self) -> &mut PendingUnload {
        &mut self.pending
    }

    pub(crate) fn is_invalid_at(&self, level: usize, id: &ObjectId) -> bool {
        self.levels[..=level]
            .iter()
            .any(|t| t.is_marked_invalid(id))
            || self.levels[..level].iter().any(|t| {
                t.data_manager()
                    .data_container(id)
                    .is_some_and(|c| c.state() == DataContainerState::Deleted)
            })
    }

    pub(crate) fn ensure_valid(&self, level: usize, id: &ObjectId) -> CoreResult<()> {
        if self.is_invalid_at(level, id) {
            return Err(CoreError::ObjectInvalid {
                object_id: id.clone(),
                transaction_id: self.levels[level].id(),
            });
        }
        Ok(())
    }

    pub(crate) fn ensure_not_pending(&self, id: &ObjectId) -> CoreResult<()> {
        if self.pending.objects.contains(id) {
            return Err(CoreError::ObjectBeingUnloaded {
                object_id: id.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn ensure_end_point_not_pending(&self, id: &RelationEndPointId) -> CoreResult<()> {
        self.ensure_not_pending(&id.object_id)?;
        if self.pending.end_points.contains(id) {
            return Err(CoreError::ObjectBeingUnloaded {
                object_id: id.object_id.clone(),
            });
        }
        Ok(())
    }

    /// Lifecycle operations change the set of levels that unload plans and
    /// listener fan-outs refer to. They are refused while either is running.
    pub(crate) fn ensure_no_unload_in_progress(&self, operation: &str) -> CoreResult<()> {
        if !self.pending.is_empty() {
            return Err(CoreError::invalid_operation(format!(
                "{operation} is not allowed while an unload is in progress"
            )));
        }
        if self.notifying > 0 {
            return Err(CoreError::invalid_operation(format!(
                "{operation} is not allowed from a listener"
            )));
        }
        Ok(())
    }

    /// Fans an event out to the listeners of one level, in registration
    /// order. The first error stops the fan-out and is returned.
    ///
    /// Listeners registered while the fan-out runs are called from the next
    /// event on.
    pub(crate) fn notify(&mut self, level: usize, event: &TransactionEvent) -> CoreResult<()> {
        let transaction = &self.levels[level];
        if transaction.listeners().is_empty() {
            return Ok(());
        }
        let transaction_id = transaction.id();
        let listeners = transaction.listeners().to_vec();
        trace!(transaction = %transaction_id, ?event, "notifying listeners");

        self.notifying += 1;
        let result = listeners
            .iter()
            .try_for_each(|listener| listener.on_event(self, transaction_id, event));
        self.notifying -= 1;
        result
    }

    pub(crate) fn register_container(
        &mut self,
        level: usize,
        container: DataContainer,
    ) -> CoreResult<()> {
        self.notify(
            level,
            &TransactionEvent::DataContainerMapRegistering {
                object_id: container.id().clone(),
            },
        )?;
        // A listener may have loaded the object itself.
        if self.levels[level].data_manager().contains_data_container(container.id()) {
            trace!(object = %container.id(), "container registered by a listener");
            return Ok(());
        }
        self.levels[level]
            .data_manager_mut()
            .register_data_container(container)
    }

    pub(crate) fn unregister_container(&mut self, level: usize, id: &ObjectId) -> CoreResult<()> {
        if !self.levels[level].data_manager().contains_data_container(id) {
            return Ok(());
        }
        self.notify(
            level,
            &TransactionEvent::DataContainerMapUnregistering {
                object_id: id.clone(),
            },
        )?;
        self.levels[level]
            .data_manager_mut()
            .unregister_data_container(id);
        Ok(())
    }

    pub(crate) fn register_end_point(
        &mut self,
        level: usize,
        end_point: RelationEndPoint,
    ) -> CoreResult<()> {
        self.notify(
            level,
            &TransactionEvent::RelationEndPointMapRegistering {
                end_point_id: end_point.id().clone(),
            },
        )?;
        if self.levels[level].data_manager().end_point(end_point.id()).is_some() {
            trace!(end_point = %end_point.id(), "end-point registered by a listener");
            return Ok(());
        }
        self.levels[level]
            .data_manager_mut()
            .register_end_point(end_point)
    }

    pub(crate) fn unregister_end_point(
        &mut self,
        level: usize,
        id: &RelationEndPointId,
    ) -> CoreResult<()> {
        if self.levels[level].data_manager().end_point(id).is_none() {
            return Ok(());
        }
        self.notify(
            level,
            &TransactionEvent::RelationEndPointMapUnregistering {
                end_point_id: id.clone(),
            },
        )?;
        self.levels[level].data_manager_mut().unregister_end_point(id);
        Ok(())
    }

    /// Removes an object from a level and marks it invalid there.
    ///
    /// Discarding a new object makes it invalid at every level, since it has
    /// no persisted identity it could be reloaded from. An object invalid at
    /// the root also loses its unload hook.
    pub(crate) fn discard_object(&mut self, level: usize, id: &ObjectId) -> CoreResult<()> {
        let is_new = self.levels[level]
            .data_manager()
            .data_container(id)
            .is_some_and(|c| c.state() == DataContainerState::New);
        if is_new || level == 0 {
            self.hooks.remove(id);
        }
        let levels: Vec<usize> = if is_new {
            (0..self.levels.len()).collect()
        } else {
            vec![level]
        };

        for level in levels {
            let end_point_ids: Vec<RelationEndPointId> = self.levels[level]
                .data_manager()
                .end_points_of(id)
                .map(|e| e.id().clone())
                .collect();
            for end_point_id in &end_point_ids {
                self.unregister_end_point(level, end_point_id)?;
            }
            if let Some(container) = self.levels[level].data_manager_mut().data_container_mut(id) {
                container.discard();
            }
            self.unregister_container(level, id)?;
            self.notify(
                level,
                &TransactionEvent::ObjectMarkedInvalid {
                    object_id: id.clone(),
                },
            )?;
            self.levels[level].mark_invalid(id.clone());
            trace!(transaction = %self.levels[level].id(), object = %id, "object discarded");
        }
        Ok(())
    }
}

impl fmt::Debug for TransactionHierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHierarchy")
            .field("config", &self.config)
            .field("levels", &self.levels)
            .field("hooks", &self.hooks.len())
            .field("pending", &self.pending)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mapping::{ClassDefinition, RelationDefinition, RelationEndPointDefinition};
    use objgraph_store::{DataRecord, InMemoryStore};
    use std::cell::RefCell;

    /// Customer 1 with orders 1 and 2; order 1 has ticket 1.
    pub(crate) fn fixture() -> (TransactionHierarchy, Arc<InMemoryStore>) {
        let mapping = MappingConfiguration::builder()
            .class(ClassDefinition::new("Customer").property("Name"))
            .class(ClassDefinition::new("Order").property("OrderNumber"))
            .class(ClassDefinition::new("OrderTicket").property("FileName"))
            .relation(RelationDefinition::new(
                "Customer:Orders",
                RelationEndPointDefinition::real("Order", "Customer"),
                RelationEndPointDefinition::collection("Customer", "Orders"),
            ))
            .relation(RelationDefinition::new(
                "Order:OrderTicket",
                RelationEndPointDefinition::real("OrderTicket", "Order"),
                RelationEndPointDefinition::virtual_object("Order", "OrderTicket"),
            ))
            .build()
            .unwrap();

        let store = Arc::new(InMemoryStore::new());
        store.insert(DataRecord::new(customer()).with_value("Name", "Ada"));
        for n in 1..=2 {
            store.insert(
                DataRecord::new(order(n))
                    .with_value("OrderNumber", i64::try_from(n).unwrap())
                    .with_foreign_key("Customer", Some(customer())),
            );
        }
        store.insert(
            DataRecord::new(ticket())
                .with_value("FileName", "ticket1.txt")
                .with_foreign_key("Order", Some(order(1))),
        );

        let hierarchy = TransactionHierarchy::new(Arc::new(mapping), store.clone());
        (hierarchy, store)
    }

    pub(crate) fn customer() -> ObjectId {
        ObjectId::from_u128("Customer", 1)
    }

    pub(crate) fn order(n: u128) -> ObjectId {
        ObjectId::from_u128("Order", n)
    }

    pub(crate) fn ticket() -> ObjectId {
        ObjectId::from_u128("OrderTicket", 1)
    }

    #[test]
    fn new_hierarchy_has_only_a_root() {
        let (hierarchy, _) = fixture();
        let root = hierarchy.root_transaction();
        assert_eq!(hierarchy.leaf_transaction(), root);
        assert_eq!(hierarchy.depth(), 1);
        assert!(hierarchy.transaction(root).unwrap().is_root());
        assert_eq!(hierarchy.sub_transaction(root).unwrap(), None);
    }

    #[test]
    fn unknown_transaction_is_rejected() {
        let (hierarchy, _) = fixture();
        let err = hierarchy.transaction(TransactionId::new(99)).unwrap_err();
        assert!(matches!(err, CoreError::TransactionNotFound { .. }));
    }

    #[test]
    fn object_state_of_unloaded_object() {
        let (hierarchy, _) = fixture();
        let root = hierarchy.root_transaction();
        assert_eq!(
            hierarchy.object_state(root, &order(1)).unwrap(),
            ObjectState::NotLoadedYet
        );
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let (mut hierarchy, _) = fixture();
        let root = hierarchy.root_transaction();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for name in ["first", "second"] {
            let seen = seen.clone();
            hierarchy
                .add_listener(
                    root,
                    Rc::new(move |_: &mut TransactionHierarchy, _: TransactionId, _: &TransactionEvent| -> CoreResult<()> {
                        seen.borrow_mut().push(name);
                        Ok(())
                    }),
                )
                .unwrap();
        }

        hierarchy
            .notify(0, &TransactionEvent::TransactionRolledBack)
            .unwrap();
        assert_eq!(*seen.borrow(), ["first", "second"]);
    }

    #[test]
    fn listener_error_stops_fan_out() {
        let (mut hierarchy, _) = fixture();
        let root = hierarchy.root_transaction();
        let calls = Rc::new(RefCell::new(0));
        hierarchy
            .add_listener(
                root,
                Rc::new(|_: &mut TransactionHierarchy, _: TransactionId, _: &TransactionEvent| -> CoreResult<()> {
                    Err(CoreError::invalid_operation("listener refused"))
                }),
            )
            .unwrap();
        let counter = calls.clone();
        hierarchy
            .add_listener(
                root,
                Rc::new(move |_: &mut TransactionHierarchy, _: TransactionId, _: &TransactionEvent| -> CoreResult<()> {
                    *counter.borrow_mut() += 1;
                    Ok(())
                }),
            )
            .unwrap();

        let err = hierarchy
            .notify(0, &TransactionEvent::TransactionRolledBack)
            .unwrap_err();
        assert!(err.to_string().contains("listener refused"));
        assert_eq!(*calls.borrow(), 0);
    }
}
