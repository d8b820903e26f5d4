//! Completeness of virtual end-points.

/// Contents of a virtual end-point.
///
/// An incomplete end-point knows nothing about its opposite objects; it is
/// resolved from the opposite side on the next access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LoadState<T> {
    Incomplete,
    Complete { original: T, current: T },
}

impl<T: Clone + PartialEq> LoadState<T> {
    pub(crate) fn complete(value: T) -> Self {
        Self::Complete {
            original: value.clone(),
            current: value,
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }

    pub(crate) fn has_changed(&self) -> bool {
        match self {
            Self::Incomplete => false,
            Self::Complete { original, current } => original != current,
        }
    }

    pub(crate) fn current(&self) -> Option<&T> {
        match self {
            Self::Incomplete => None,
            Self::Complete { current, .. } => Some(current),
        }
    }

    pub(crate) fn original(&self) -> Option<&T> {
        match self {
            Self::Incomplete => None,
            Self::Complete { original, .. } => Some(original),
        }
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Incomplete => None,
            Self::Complete { current, .. } => Some(current),
        }
    }

    pub(crate) fn commit(&mut self) {
        if let Self::Complete { original, current } = self {
            original.clone_from(current);
        }
    }

    pub(crate) fn rollback(&mut self) {
        if let Self::Complete { original, current } = self {
            current.clone_from(original);
        }
    }
}
