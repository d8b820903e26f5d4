//! Ambient transaction scopes.

use super::hierarchy::TransactionHierarchy;
use crate::error::CoreResult;
use crate::types::TransactionId;
use std::ops::{Deref, DerefMut};

/// Guard making a transaction the current one until dropped.
///
/// Scopes nest: entering a scope through a guard borrows the guard, so
/// inner scopes are always left before outer ones.
///
/// ```rust,ignore
/// let mut scope = hierarchy.enter_scope(root)?;
/// assert_eq!(scope.current_transaction(), Some(root));
/// {
///     let inner = scope.enter_scope(sub)?;
///     assert_eq!(inner.current_transaction(), Some(sub));
/// }
/// assert_eq!(scope.current_transaction(), Some(root));
/// ```
#[derive(Debug)]
pub struct TransactionScope<'a> {
    hierarchy: &'a mut TransactionHierarchy,
    transaction_id: TransactionId,
    depth: usize,
}

impl TransactionScope<'_> {
    /// Returns the transaction this scope made current.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }
}

impl Deref for TransactionScope<'_> {
    type Target = TransactionHierarchy;

    fn deref(&self) -> &Self::Target {
        self.hierarchy
    }
}

impl DerefMut for TransactionScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.hierarchy
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        self.hierarchy.scopes.truncate(self.depth);
    }
}

impl TransactionHierarchy {
    /// Makes `tx` the current transaction until the returned guard is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::TransactionNotFound`] for an unknown
    /// handle.
    pub fn enter_scope(&mut self, tx: TransactionId) -> CoreResult<TransactionScope<'_>> {
        self.level_of(tx)?;
        let depth = self.scopes.len();
        self.scopes.push(tx);
        Ok(TransactionScope {
            hierarchy: self,
            transaction_id: tx,
            depth,
        })
    }

    /// Returns the transaction of the innermost active scope.
    #[must_use]
    pub fn current_transaction(&self) -> Option<TransactionId> {
        self.scopes.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::super::hierarchy::tests::fixture;
    use crate::error::CoreError;

    #[test]
    fn scopes_nest_and_restore() {
        let (mut hierarchy, _) = fixture();
        let root = hierarchy.root_transaction();
        let sub = hierarchy.create_sub_transaction(root).unwrap();
        assert_eq!(hierarchy.current_transaction(), None);

        {
            let mut outer = hierarchy.enter_scope(root).unwrap();
            assert_eq!(outer.current_transaction(), Some(root));
            {
                let inner = outer.enter_scope(sub).unwrap();
                assert_eq!(inner.current_transaction(), Some(sub));
                assert_eq!(inner.transaction_id(), sub);
            }
            assert_eq!(outer.current_transaction(), Some(root));
        }
        assert_eq!(hierarchy.current_transaction(), None);
    }

    #[test]
    fn scoped_transaction_cannot_be_discarded() {
        let (mut hierarchy, _) = fixture();
        let root = hierarchy.root_transaction();
        let sub = hierarchy.create_sub_transaction(root).unwrap();

        let mut scope = hierarchy.enter_scope(sub).unwrap();
        let err = scope.discard(sub).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
        drop(scope);

        hierarchy.discard(sub).unwrap();
    }
}
