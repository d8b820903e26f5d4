//! Recording and failing listeners and hooks.
//!
//! A single [`EventLog`] can be attached to several transactions and
//! objects at once; it records listener events and hook calls in the exact
//! order they happen.

use objgraph_core::{
    ClientTransactionListener, CoreError, CoreResult, TransactionEvent, TransactionHierarchy,
    TransactionId, UnloadHook,
};
use objgraph_store::ObjectId;
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

/// One recorded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    /// A listener event.
    Event(TransactionId, TransactionEvent),
    /// An `on_unloading` hook call.
    Unloading(TransactionId, ObjectId),
    /// An `on_unloaded` hook call.
    Unloaded(TransactionId, ObjectId),
}

/// Shared, ordered record of notifications.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Rc<RefCell<Vec<Recorded>>>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every event of `tx`.
    pub fn listen(&self, hierarchy: &mut TransactionHierarchy, tx: TransactionId) {
        hierarchy
            .add_listener(tx, Rc::new(self.clone()))
            .expect("Failed to add listener");
    }

    /// Records every event of every current transaction.
    pub fn listen_all(&self, hierarchy: &mut TransactionHierarchy) {
        for tx in hierarchy.transaction_ids() {
            self.listen(hierarchy, tx);
        }
    }

    /// Records the unload hook calls of each object.
    pub fn hook(&self, hierarchy: &mut TransactionHierarchy, objects: &[ObjectId]) {
        for id in objects {
            hierarchy.set_unload_hook(id.clone(), Rc::new(self.clone()));
        }
    }

    /// Returns a copy of everything recorded so far.
    pub fn entries(&self) -> Vec<Recorded> {
        self.entries.borrow().clone()
    }

    /// Returns the recorded listener events only.
    pub fn events(&self) -> Vec<(TransactionId, TransactionEvent)> {
        self.entries
            .borrow()
            .iter()
            .filter_map(|entry| match entry {
                Recorded::Event(tx, event) => Some((*tx, event.clone())),
                _ => None,
            })
            .collect()
    }

    /// Returns the recorded hook calls only.
    pub fn hook_calls(&self) -> Vec<Recorded> {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| !matches!(entry, Recorded::Event(..)))
            .cloned()
            .collect()
    }

    /// Counts the recorded events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&TransactionEvent) -> bool) -> usize {
        self.events().iter().filter(|(_, e)| predicate(e)).count()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// Returns the number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    fn push(&self, entry: Recorded) {
        self.entries.borrow_mut().push(entry);
    }
}

impl ClientTransactionListener for EventLog {
    fn on_event(
        &self,
        _hierarchy: &mut TransactionHierarchy,
        transaction_id: TransactionId,
        event: &TransactionEvent,
    ) -> CoreResult<()> {
        self.push(Recorded::Event(transaction_id, event.clone()));
        Ok(())
    }
}

impl UnloadHook for EventLog {
    fn on_unloading(
        &self,
        _hierarchy: &mut TransactionHierarchy,
        transaction_id: TransactionId,
        object_id: &ObjectId,
    ) -> CoreResult<()> {
        self.push(Recorded::Unloading(transaction_id, object_id.clone()));
        Ok(())
    }

    fn on_unloaded(
        &self,
        _hierarchy: &mut TransactionHierarchy,
        transaction_id: TransactionId,
        object_id: &ObjectId,
    ) -> CoreResult<()> {
        self.push(Recorded::Unloaded(transaction_id, object_id.clone()));
        Ok(())
    }
}

/// The error raised by injected failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("injected failure: {0}")]
pub struct InjectedFailure(pub String);

impl InjectedFailure {
    /// Wraps the failure as a callback error.
    pub fn into_error(self) -> CoreError {
        CoreError::callback(self)
    }
}

/// Returns `true` if `err` is the injected failure with `message`.
pub fn is_injected(err: &CoreError, message: &str) -> bool {
    match err {
        CoreError::Callback { source } => source
            .downcast_ref::<InjectedFailure>()
            .is_some_and(|f| f.0 == message),
        _ => false,
    }
}

/// A listener that fails on the first event matching a predicate.
pub struct FailingListener<P> {
    message: String,
    predicate: P,
}

impl<P> FailingListener<P>
where
    P: Fn(&TransactionEvent) -> bool,
{
    /// Creates a listener failing with `message` on matching events.
    pub fn new(message: &str, predicate: P) -> Self {
        Self {
            message: message.to_string(),
            predicate,
        }
    }
}

impl<P> ClientTransactionListener for FailingListener<P>
where
    P: Fn(&TransactionEvent) -> bool,
{
    fn on_event(
        &self,
        _hierarchy: &mut TransactionHierarchy,
        _transaction_id: TransactionId,
        event: &TransactionEvent,
    ) -> CoreResult<()> {
        if (self.predicate)(event) {
            debug!(?event, message = %self.message, "listener failure injected");
            return Err(InjectedFailure(self.message.clone()).into_error());
        }
        Ok(())
    }
}

/// When a [`FailingHook`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    /// In `on_unloading`.
    Unloading,
    /// In `on_unloaded`.
    Unloaded,
}

/// A hook that always fails in one phase.
#[derive(Debug, Clone)]
pub struct FailingHook {
    /// The failing phase.
    pub phase: HookPhase,
    /// The failure message.
    pub message: String,
}

impl FailingHook {
    /// Creates a hook failing with `message` in `phase`.
    pub fn new(phase: HookPhase, message: &str) -> Self {
        Self {
            phase,
            message: message.to_string(),
        }
    }

    fn fail_in(&self, phase: HookPhase) -> CoreResult<()> {
        if self.phase == phase {
            debug!(?phase, message = %self.message, "hook failure injected");
            Err(InjectedFailure(self.message.clone()).into_error())
        } else {
            Ok(())
        }
    }
}

impl UnloadHook for FailingHook {
    fn on_unloading(
        &self,
        _hierarchy: &mut TransactionHierarchy,
        _transaction_id: TransactionId,
        _object_id: &ObjectId,
    ) -> CoreResult<()> {
        self.fail_in(HookPhase::Unloading)
    }

    fn on_unloaded(
        &self,
        _hierarchy: &mut TransactionHierarchy,
        _transaction_id: TransactionId,
        _object_id: &ObjectId,
    ) -> CoreResult<()> {
        self.fail_in(HookPhase::Unloaded)
    }
}

/// A hook running a closure in `on_unloading`.
///
/// Used for reentrancy tests: the closure gets full access to the
/// hierarchy while the unload is in progress.
pub struct FnHook<F> {
    f: F,
}

impl<F> FnHook<F>
where
    F: Fn(&mut TransactionHierarchy, TransactionId, &ObjectId) -> CoreResult<()>,
{
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> UnloadHook for FnHook<F>
where
    F: Fn(&mut TransactionHierarchy, TransactionId, &ObjectId) -> CoreResult<()>,
{
    fn on_unloading(
        &self,
        hierarchy: &mut TransactionHierarchy,
        transaction_id: TransactionId,
        object_id: &ObjectId,
    ) -> CoreResult<()> {
        (self.f)(hierarchy, transaction_id, object_id)
    }
}
