//! The data container of one object at one transaction level.

use super::state::DataContainerState;
use crate::error::{CoreError, CoreResult};
use objgraph_store::{ObjectId, Timestamp, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    New,
    Existing,
    Deleted,
    Discarded,
}

/// Cached persisted field state of one object.
///
/// A container holds the current and original (last committed) values of
/// every data property of its class. `Changed` is derived by comparing the
/// two, so writing a value back to its original makes the container
/// `Unchanged` again unless it was explicitly marked as changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataContainer {
    id: ObjectId,
    lifecycle: Lifecycle,
    marked_changed: bool,
    current: BTreeMap<String, Value>,
    original: BTreeMap<String, Value>,
    timestamp: Option<Timestamp>,
}

impl DataContainer {
    /// Creates the container of a brand-new object.
    #[must_use]
    pub fn new_object(id: ObjectId, values: BTreeMap<String, Value>) -> Self {
        Self {
            id,
            lifecycle: Lifecycle::New,
            marked_changed: false,
            original: values.clone(),
            current: values,
            timestamp: None,
        }
    }

    /// Creates an unchanged container for an object that already exists.
    #[must_use]
    pub fn existing(
        id: ObjectId,
        values: BTreeMap<String, Value>,
        timestamp: Option<Timestamp>,
    ) -> Self {
        Self {
            id,
            lifecycle: Lifecycle::Existing,
            marked_changed: false,
            original: values.clone(),
            current: values,
            timestamp,
        }
    }

    /// Returns the object's identity.
    #[must_use]
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Returns the container's state.
    #[must_use]
    pub fn state(&self) -> DataContainerState {
        match self.lifecycle {
            Lifecycle::New => DataContainerState::New,
            Lifecycle::Deleted => DataContainerState::Deleted,
            Lifecycle::Discarded => DataContainerState::Discarded,
            Lifecycle::Existing if self.marked_changed || self.current != self.original => {
                DataContainerState::Changed
            }
            Lifecycle::Existing => DataContainerState::Unchanged,
        }
    }

    /// Returns the timestamp of the version this container was loaded from.
    #[must_use]
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    /// Replaces the timestamp after a commit.
    pub fn set_timestamp(&mut self, timestamp: Option<Timestamp>) {
        self.timestamp = timestamp;
    }

    /// Returns the current value of a property.
    #[must_use]
    pub fn value(&self, property: &str) -> Option<&Value> {
        self.current.get(property)
    }

    /// Returns the original value of a property.
    #[must_use]
    pub fn original_value(&self, property: &str) -> Option<&Value> {
        self.original.get(property)
    }

    /// Returns all current values.
    #[must_use]
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.current
    }

    /// Returns all original values.
    #[must_use]
    pub fn original_values(&self) -> &BTreeMap<String, Value> {
        &self.original
    }

    /// Writes a property value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownProperty`] if the container has no such
    /// property, and [`CoreError::InvalidOperation`] if it is deleted or
    /// discarded.
    pub fn set_value(&mut self, property: &str, value: Value) -> CoreResult<()> {
        self.ensure_writable()?;
        let slot = self
            .current
            .get_mut(property)
            .ok_or_else(|| CoreError::UnknownProperty {
                class_id: self.id.class_id().clone(),
                property: property.to_string(),
            })?;
        *slot = value;
        Ok(())
    }

    /// Flags the container as changed even if no value differs.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] unless the container is
    /// unchanged or changed.
    pub fn mark_as_changed(&mut self) -> CoreResult<()> {
        if self.lifecycle != Lifecycle::Existing {
            return Err(CoreError::invalid_operation(format!(
                "only existing objects can be marked as changed, {} is {}",
                self.id,
                self.state()
            )));
        }
        self.marked_changed = true;
        Ok(())
    }

    /// Overwrites the current values with those of another container,
    /// keeping this container's original values.
    pub(crate) fn take_values(&mut self, values: &BTreeMap<String, Value>) {
        self.current.clone_from(values);
    }

    /// Deletes the container.
    ///
    /// A new container is discarded immediately; an existing one becomes
    /// `Deleted`.
    pub fn delete(&mut self) {
        self.lifecycle = match self.lifecycle {
            Lifecycle::New | Lifecycle::Discarded => Lifecycle::Discarded,
            Lifecycle::Existing | Lifecycle::Deleted => Lifecycle::Deleted,
        };
    }

    /// Makes the current state the committed state.
    ///
    /// New and changed containers become unchanged; deleted containers are
    /// discarded.
    pub fn commit(&mut self) {
        match self.lifecycle {
            Lifecycle::New | Lifecycle::Existing => {
                self.lifecycle = Lifecycle::Existing;
                self.original.clone_from(&self.current);
                self.marked_changed = false;
            }
            Lifecycle::Deleted | Lifecycle::Discarded => self.lifecycle = Lifecycle::Discarded,
        }
    }

    /// Reverts to the committed state.
    ///
    /// A new container is discarded; every other container becomes
    /// unchanged with its original values.
    pub fn rollback(&mut self) {
        match self.lifecycle {
            Lifecycle::New | Lifecycle::Discarded => self.lifecycle = Lifecycle::Discarded,
            Lifecycle::Existing | Lifecycle::Deleted => {
                self.lifecycle = Lifecycle::Existing;
                self.current.clone_from(&self.original);
                self.marked_changed = false;
            }
        }
    }

    /// Marks the container as discarded.
    pub fn discard(&mut self) {
        self.lifecycle = Lifecycle::Discarded;
    }

    fn ensure_writable(&self) -> CoreResult<()> {
        match self.lifecycle {
            Lifecycle::New | Lifecycle::Existing => Ok(()),
            Lifecycle::Deleted | Lifecycle::Discarded => Err(CoreError::invalid_operation(
                format!("{} is {} and cannot be modified", self.id, self.state()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(number: i64) -> BTreeMap<String, Value> {
        BTreeMap::from([("OrderNumber".to_string(), Value::Integer(number))])
    }

    fn existing() -> DataContainer {
        DataContainer::existing(
            ObjectId::from_u128("Order", 1),
            values(1),
            Some(Timestamp::new(3)),
        )
    }

    #[test]
    fn write_makes_changed_and_writing_back_reverts() {
        let mut container = existing();
        assert_eq!(container.state(), DataContainerState::Unchanged);

        container.set_value("OrderNumber", Value::Integer(2)).unwrap();
        assert_eq!(container.state(), DataContainerState::Changed);
        assert_eq!(container.original_value("OrderNumber"), Some(&Value::Integer(1)));

        container.set_value("OrderNumber", Value::Integer(1)).unwrap();
        assert_eq!(container.state(), DataContainerState::Unchanged);
    }

    #[test]
    fn unknown_property_is_rejected() {
        let mut container = existing();
        let err = container.set_value("Nope", Value::Null).unwrap_err();
        assert!(matches!(err, CoreError::UnknownProperty { .. }));
    }

    #[test]
    fn mark_as_changed_survives_until_commit() {
        let mut container = existing();
        container.mark_as_changed().unwrap();
        assert_eq!(container.state(), DataContainerState::Changed);

        container.commit();
        assert_eq!(container.state(), DataContainerState::Unchanged);
    }

    #[test]
    fn new_object_transitions() {
        let mut container = DataContainer::new_object(ObjectId::from_u128("Order", 2), values(0));
        assert_eq!(container.state(), DataContainerState::New);
        assert!(container.mark_as_changed().is_err());

        container.commit();
        assert_eq!(container.state(), DataContainerState::Unchanged);

        let mut fresh = DataContainer::new_object(ObjectId::from_u128("Order", 3), values(0));
        fresh.delete();
        assert_eq!(fresh.state(), DataContainerState::Discarded);
    }

    #[test]
    fn delete_commit_discards() {
        let mut container = existing();
        container.delete();
        assert_eq!(container.state(), DataContainerState::Deleted);
        assert!(container.set_value("OrderNumber", Value::Integer(5)).is_err());

        container.commit();
        assert_eq!(container.state(), DataContainerState::Discarded);
    }

    #[test]
    fn rollback_restores_values() {
        let mut container = existing();
        container.set_value("OrderNumber", Value::Integer(9)).unwrap();
        container.delete();
        container.rollback();

        assert_eq!(container.state(), DataContainerState::Unchanged);
        assert_eq!(container.value("OrderNumber"), Some(&Value::Integer(1)));
    }
}
