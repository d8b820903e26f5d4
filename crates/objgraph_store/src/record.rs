//! Records exchanged with a persistence store.

use crate::id::{ClassId, ObjectId};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Optimistic-concurrency stamp of a stored record.
///
/// Every successful commit of a record assigns it a new, strictly larger
/// timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Creates a timestamp.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ts:{}", self.0)
    }
}

/// The persisted state of one object as returned by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRecord {
    /// Identity of the object.
    pub id: ObjectId,
    /// Timestamp of the last committed version.
    pub timestamp: Timestamp,
    /// Data property values by property name.
    pub values: BTreeMap<String, Value>,
    /// Foreign key values by relation property name.
    pub foreign_keys: BTreeMap<String, Option<ObjectId>>,
}

impl DataRecord {
    /// Creates an empty record with timestamp zero.
    #[must_use]
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            timestamp: Timestamp::new(0),
            values: BTreeMap::new(),
            foreign_keys: BTreeMap::new(),
        }
    }

    /// Adds a data property value.
    #[must_use]
    pub fn with_value(mut self, property: &str, value: impl Into<Value>) -> Self {
        self.values.insert(property.to_string(), value.into());
        self
    }

    /// Adds a foreign key value.
    #[must_use]
    pub fn with_foreign_key(mut self, property: &str, target: Option<ObjectId>) -> Self {
        self.foreign_keys.insert(property.to_string(), target);
        self
    }

    /// Returns the foreign key stored for a relation property.
    #[must_use]
    pub fn foreign_key(&self, property: &str) -> Option<&ObjectId> {
        self.foreign_keys.get(property).and_then(Option::as_ref)
    }
}

/// "Which objects of `class_id` point at `referenced` through `foreign_key`?"
///
/// This is how the virtual side of a relation is materialized: by querying
/// the foreign-key-bearing side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationQuery {
    /// Class holding the foreign key.
    pub class_id: ClassId,
    /// Name of the foreign key property.
    pub foreign_key: String,
    /// The object being pointed at.
    pub referenced: ObjectId,
}

/// Kind of a persistable change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// The object is new and must be inserted.
    Insert,
    /// The object exists and its fields or foreign keys changed.
    Update,
    /// The object must be removed.
    Delete,
}

/// One change handed to [`crate::PersistenceStore::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistableChange {
    /// Identity of the changed object.
    pub object_id: ObjectId,
    /// What happened to it.
    pub kind: ChangeKind,
    /// Full set of current data property values (empty for deletes).
    pub values: BTreeMap<String, Value>,
    /// Full set of current foreign key values (empty for deletes).
    pub foreign_keys: BTreeMap<String, Option<ObjectId>>,
    /// Timestamp the change is based on; `None` for inserts.
    pub expected_timestamp: Option<Timestamp>,
}
