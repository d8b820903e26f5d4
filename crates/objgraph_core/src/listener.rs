//! Transaction listeners and per-object unload hooks.

use crate::end_point::RelationEndPointId;
use crate::error::CoreResult;
use crate::transaction::TransactionHierarchy;
use crate::types::TransactionId;
use objgraph_store::ObjectId;

/// A lifecycle event of one transaction level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionEvent {
    /// Objects are about to be loaded into the transaction.
    ObjectsLoading {
        /// The objects, in load order.
        object_ids: Vec<ObjectId>,
    },
    /// Objects were loaded into the transaction.
    ObjectsLoaded {
        /// The objects, in load order.
        object_ids: Vec<ObjectId>,
    },
    /// Objects are about to be unloaded from the transaction.
    ObjectsUnloading {
        /// The objects, in batch order.
        object_ids: Vec<ObjectId>,
    },
    /// Objects were unloaded from the transaction.
    ObjectsUnloaded {
        /// The objects, in batch order.
        object_ids: Vec<ObjectId>,
    },
    /// A data container is about to be registered.
    DataContainerMapRegistering {
        /// The container's object.
        object_id: ObjectId,
    },
    /// A data container is about to be unregistered.
    DataContainerMapUnregistering {
        /// The container's object.
        object_id: ObjectId,
    },
    /// An end-point is about to be registered.
    RelationEndPointMapRegistering {
        /// The end-point.
        end_point_id: RelationEndPointId,
    },
    /// An end-point is about to be unregistered.
    RelationEndPointMapUnregistering {
        /// The end-point.
        end_point_id: RelationEndPointId,
    },
    /// A complete virtual end-point is about to forget its contents.
    RelationEndPointBecomingIncomplete {
        /// The end-point.
        end_point_id: RelationEndPointId,
    },
    /// An object is about to become invalid in the transaction.
    ObjectMarkedInvalid {
        /// The object.
        object_id: ObjectId,
    },
    /// A sub-transaction was created below the transaction.
    SubTransactionCreated {
        /// The new sub-transaction.
        sub_transaction: TransactionId,
    },
    /// The transaction is about to commit.
    TransactionCommitting {
        /// The objects with pending changes.
        object_ids: Vec<ObjectId>,
    },
    /// The transaction committed.
    TransactionCommitted {
        /// The objects that had pending changes.
        object_ids: Vec<ObjectId>,
    },
    /// The transaction rolled back.
    TransactionRolledBack,
}

/// Observer of the events of one transaction level.
///
/// Listeners are invoked in registration order. Like unload hooks they get
/// the hierarchy mutably and may load or unload other objects; objects
/// whose unload is being announced refuse modification. Creating,
/// committing, rolling back or discarding transactions is refused while a
/// listener runs. An error returned by a listener aborts the operation that
/// raised the event and reaches the caller unchanged.
///
/// Closures with the same signature are listeners:
///
/// ```rust,ignore
/// hierarchy.add_listener(tx, Rc::new(|_: &mut TransactionHierarchy, _, event: &TransactionEvent| {
///     println!("{event:?}");
///     Ok(())
/// }))?;
/// ```
pub trait ClientTransactionListener {
    /// Handles one event raised by `transaction_id`.
    ///
    /// # Errors
    ///
    /// Any error aborts the operation in progress.
    fn on_event(
        &self,
        hierarchy: &mut TransactionHierarchy,
        transaction_id: TransactionId,
        event: &TransactionEvent,
    ) -> CoreResult<()>;
}

impl<F> ClientTransactionListener for F
where
    F: Fn(&mut TransactionHierarchy, TransactionId, &TransactionEvent) -> CoreResult<()>,
{
    fn on_event(
        &self,
        hierarchy: &mut TransactionHierarchy,
        transaction_id: TransactionId,
        event: &TransactionEvent,
    ) -> CoreResult<()> {
        self(hierarchy, transaction_id, event)
    }
}

/// Per-object receiver of unload notifications.
///
/// Hooks run with full access to the hierarchy and may load or unload
/// other objects. The object being unloaded can still be read during
/// `on_unloading` but cannot be modified or unloaded again.
pub trait UnloadHook {
    /// Called before the object is unloaded from `transaction_id`.
    ///
    /// # Errors
    ///
    /// An error cancels the whole unload; nothing is evicted.
    fn on_unloading(
        &self,
        _hierarchy: &mut TransactionHierarchy,
        _transaction_id: TransactionId,
        _object_id: &ObjectId,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// Called after the object was unloaded from `transaction_id`.
    ///
    /// # Errors
    ///
    /// The eviction is already complete; the error is returned to the
    /// caller and the remaining notifications are skipped.
    fn on_unloaded(
        &self,
        _hierarchy: &mut TransactionHierarchy,
        _transaction_id: TransactionId,
        _object_id: &ObjectId,
    ) -> CoreResult<()> {
        Ok(())
    }
}
