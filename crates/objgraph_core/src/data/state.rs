//! Container and object states.

use std::fmt;

/// State of one [`crate::DataContainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataContainerState {
    /// Created in this transaction, not yet committed anywhere.
    New,
    /// Values equal the last committed values.
    Unchanged,
    /// Values differ from the last committed values, or the container was
    /// explicitly marked as changed.
    Changed,
    /// Deleted in this transaction.
    Deleted,
    /// Removed for good; the object is invalid.
    Discarded,
}

impl fmt::Display for DataContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "New",
            Self::Unchanged => "Unchanged",
            Self::Changed => "Changed",
            Self::Deleted => "Deleted",
            Self::Discarded => "Discarded",
        };
        f.write_str(name)
    }
}

/// What part of a changed object changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectChange {
    /// Only data properties.
    Data,
    /// Only relations.
    Relation,
    /// Both data properties and relations.
    Both,
}

/// The state of an object as seen from one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectState {
    /// Known by identity, but its data is not loaded in this transaction.
    NotLoadedYet,
    /// Loaded and unchanged.
    Unchanged,
    /// Loaded and changed.
    Changed(ObjectChange),
    /// Created in this transaction.
    New,
    /// Deleted in this transaction.
    Deleted,
    /// Terminal: the object cannot be used in this transaction anymore.
    Invalid,
}

impl ObjectState {
    /// Combines a loaded container's state with the change flag of the
    /// object's end-points.
    #[must_use]
    pub fn from_parts(container: DataContainerState, relations_changed: bool) -> Self {
        match (container, relations_changed) {
            (DataContainerState::New, _) => Self::New,
            (DataContainerState::Deleted, _) => Self::Deleted,
            (DataContainerState::Discarded, _) => Self::Invalid,
            (DataContainerState::Unchanged, false) => Self::Unchanged,
            (DataContainerState::Unchanged, true) => Self::Changed(ObjectChange::Relation),
            (DataContainerState::Changed, false) => Self::Changed(ObjectChange::Data),
            (DataContainerState::Changed, true) => Self::Changed(ObjectChange::Both),
        }
    }

    /// Returns `true` for [`ObjectState::Changed`].
    #[must_use]
    pub fn is_changed(self) -> bool {
        matches!(self, Self::Changed(_))
    }

    /// Returns `true` for [`ObjectState::New`].
    #[must_use]
    pub fn is_new(self) -> bool {
        self == Self::New
    }

    /// Returns `true` for [`ObjectState::Deleted`].
    #[must_use]
    pub fn is_deleted(self) -> bool {
        self == Self::Deleted
    }

    /// Returns `true` for [`ObjectState::Invalid`].
    #[must_use]
    pub fn is_invalid(self) -> bool {
        self == Self::Invalid
    }

    /// Returns `true` for [`ObjectState::NotLoadedYet`].
    #[must_use]
    pub fn is_not_loaded_yet(self) -> bool {
        self == Self::NotLoadedYet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combines_container_and_relation_changes() {
        use DataContainerState as C;
        assert_eq!(ObjectState::from_parts(C::Unchanged, false), ObjectState::Unchanged);
        assert_eq!(
            ObjectState::from_parts(C::Unchanged, true),
            ObjectState::Changed(ObjectChange::Relation)
        );
        assert_eq!(
            ObjectState::from_parts(C::Changed, true),
            ObjectState::Changed(ObjectChange::Both)
        );
        assert_eq!(ObjectState::from_parts(C::New, true), ObjectState::New);
        assert_eq!(ObjectState::from_parts(C::Discarded, false), ObjectState::Invalid);
    }

    #[test]
    fn predicates() {
        assert!(ObjectState::Changed(ObjectChange::Data).is_changed());
        assert!(ObjectState::New.is_new());
        assert!(ObjectState::Deleted.is_deleted());
        assert!(ObjectState::Invalid.is_invalid());
        assert!(ObjectState::NotLoadedYet.is_not_loaded_yet());
        assert!(!ObjectState::Unchanged.is_changed());
    }
}
