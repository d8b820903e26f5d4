//! One level of a transaction hierarchy.

use crate::data_manager::DataManager;
use crate::listener::ClientTransactionListener;
use crate::types::TransactionId;
use objgraph_store::ObjectId;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// A unit of work: one level of a [`crate::TransactionHierarchy`].
///
/// A transaction owns its [`DataManager`], its listeners and the set of
/// objects that became invalid in it. It is only reachable through the
/// hierarchy, which coordinates loading, modification and unloading across
/// levels.
pub struct ClientTransaction {
    id: TransactionId,
    parent: Option<TransactionId>,
    data_manager: DataManager,
    listeners: Vec<Rc<dyn ClientTransactionListener>>,
    invalid_objects: HashSet<ObjectId>,
}

impl ClientTransaction {
    pub(crate) fn new(id: TransactionId, parent: Option<TransactionId>) -> Self {
        Self {
            id,
            parent,
            data_manager: DataManager::new(id),
            listeners: Vec::new(),
            invalid_objects: HashSet::new(),
        }
    }

    /// Returns the transaction's ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the parent transaction, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<TransactionId> {
        self.parent
    }

    /// Returns `true` for the root transaction.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Returns the transaction's identity map.
    #[must_use]
    pub fn data_manager(&self) -> &DataManager {
        &self.data_manager
    }

    pub(crate) fn data_manager_mut(&mut self) -> &mut DataManager {
        &mut self.data_manager
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn listeners(&self) -> &[Rc<dyn ClientTransactionListener>] {
        &self.listeners
    }

    pub(crate) fn add_listener(&mut self, listener: Rc<dyn ClientTransactionListener>) {
        self.listeners.push(listener);
    }

    /// Returns `true` if the object was marked invalid in this transaction.
    ///
    /// Objects invalid in an ancestor are invalid here as well; use
    /// [`crate::TransactionHierarchy::is_invalid`] for the full answer.
    #[must_use]
    pub fn is_marked_invalid(&self, id: &ObjectId) -> bool {
        self.invalid_objects.contains(id)
    }

    /// Iterates over the objects marked invalid in this transaction.
    pub fn invalid_objects(&self) -> impl Iterator<Item = &ObjectId> {
        self.invalid_objects.iter()
    }

    pub(crate) fn mark_invalid(&mut self, id: ObjectId) {
        self.invalid_objects.insert(id);
    }
}

impl fmt::Debug for ClientTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientTransaction")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("data_manager", &self.data_manager)
            .field("listeners", &self.listeners.len())
            .field("invalid_objects", &self.invalid_objects)
            .finish()
    }
}
