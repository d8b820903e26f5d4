//! Class and data property definitions.

use objgraph_store::{ClassId, Value};

/// A persistent data property of a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDefinition {
    /// Property name, unique within its class.
    pub name: String,
    /// Value a new object starts with.
    pub default: Value,
}

impl PropertyDefinition {
    /// Creates a property whose default is [`Value::Null`].
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            default: Value::Null,
        }
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }
}

/// A persistent class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDefinition {
    /// Class identity.
    pub id: ClassId,
    /// Data properties in declaration order.
    pub properties: Vec<PropertyDefinition>,
}

impl ClassDefinition {
    /// Creates a class without properties.
    #[must_use]
    pub fn new(id: impl Into<ClassId>) -> Self {
        Self {
            id: id.into(),
            properties: Vec::new(),
        }
    }

    /// Adds a data property with a `Null` default.
    #[must_use]
    pub fn property(self, name: &str) -> Self {
        self.property_definition(PropertyDefinition::new(name))
    }

    /// Adds a data property definition.
    #[must_use]
    pub fn property_definition(mut self, property: PropertyDefinition) -> Self {
        self.properties.push(property);
        self
    }

    /// Looks up a data property.
    #[must_use]
    pub fn find_property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_keep_declaration_order() {
        let class = ClassDefinition::new("Order")
            .property("OrderNumber")
            .property_definition(PropertyDefinition::new("Status").with_default("open"));

        let names: Vec<_> = class.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["OrderNumber", "Status"]);
        assert_eq!(
            class.find_property("Status").map(|p| &p.default),
            Some(&Value::Text("open".into()))
        );
        assert!(class.find_property("Missing").is_none());
    }
}
