//! Object identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Name of a persistent class.
///
/// Cheap to clone; the name is shared.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassId(Arc<str>);

impl ClassId {
    /// Creates a class ID from its name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    /// Returns the class name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Identity of one logical business object.
///
/// An `ObjectId` is an immutable (class, storage key) pair. It is the same
/// value at every level of a transaction hierarchy and stays stable for the
/// object's lifetime, including across unloads.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    class_id: ClassId,
    key: Uuid,
}

impl ObjectId {
    /// Creates an object ID from a class and a storage key.
    #[must_use]
    pub fn new(class_id: impl Into<ClassId>, key: Uuid) -> Self {
        Self {
            class_id: class_id.into(),
            key,
        }
    }

    /// Creates an object ID with a fresh random key.
    #[must_use]
    pub fn generate(class_id: impl Into<ClassId>) -> Self {
        Self::new(class_id, Uuid::new_v4())
    }

    /// Creates an object ID whose key is the given integer.
    ///
    /// Handy for fixtures with well-known identities.
    #[must_use]
    pub fn from_u128(class_id: impl Into<ClassId>, key: u128) -> Self {
        Self::new(class_id, Uuid::from_u128(key))
    }

    /// Returns the class of the object.
    #[must_use]
    pub fn class_id(&self) -> &ClassId {
        &self.class_id
    }

    /// Returns the storage key.
    #[must_use]
    pub fn key(&self) -> Uuid {
        self.key
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({}|{})", self.class_id, self.key)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.class_id, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_is_unique() {
        let a = ObjectId::generate("Order");
        let b = ObjectId::generate("Order");
        assert_ne!(a, b);
        assert_eq!(a.class_id(), b.class_id());
    }

    #[test]
    fn same_key_different_class_differs() {
        let order = ObjectId::from_u128("Order", 1);
        let customer = ObjectId::from_u128("Customer", 1);
        assert_ne!(order, customer);
        assert_eq!(order.key(), customer.key());
    }

    #[test]
    fn display_contains_class_and_key() {
        let id = ObjectId::from_u128("Order", 1);
        assert_eq!(
            id.to_string(),
            "Order|00000000-0000-0000-0000-000000000001"
        );
    }

    #[test]
    fn ordering_groups_by_class() {
        let a = ObjectId::from_u128("A", 9);
        let b = ObjectId::from_u128("B", 1);
        assert!(a < b);
    }
}
