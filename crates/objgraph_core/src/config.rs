//! Transaction hierarchy configuration.

/// Configuration for a [`crate::TransactionHierarchy`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of transactions in one hierarchy, root included.
    pub max_hierarchy_depth: usize,

    /// Whether completing a virtual end-point also loads the owning
    /// object's data container.
    ///
    /// The owner's data is not needed to resolve the relation; this exists
    /// for callers that rely on the owner being loaded afterwards.
    pub load_owner_on_virtual_access: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_hierarchy_depth: 16,
            load_owner_on_virtual_access: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum hierarchy depth.
    #[must_use]
    pub const fn max_hierarchy_depth(mut self, depth: usize) -> Self {
        self.max_hierarchy_depth = depth;
        self
    }

    /// Sets whether completing a virtual end-point loads its owner.
    #[must_use]
    pub const fn load_owner_on_virtual_access(mut self, value: bool) -> Self {
        self.load_owner_on_virtual_access = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.max_hierarchy_depth, 16);
        assert!(!config.load_owner_on_virtual_access);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .max_hierarchy_depth(3)
            .load_owner_on_virtual_access(true);

        assert_eq!(config.max_hierarchy_depth, 3);
        assert!(config.load_owner_on_virtual_access);
    }
}
