//! Validated, indexed mapping.

use super::class::ClassDefinition;
use super::relation::{Cardinality, RelationDefinition, RelationEndPointDefinition};
use crate::error::{CoreError, CoreResult};
use indexmap::IndexMap;
use objgraph_store::ClassId;
use std::collections::{HashMap, HashSet};

/// The complete, validated mapping of a hierarchy.
///
/// Created through [`MappingConfiguration::builder`].
#[derive(Debug, Clone)]
pub struct MappingConfiguration {
    classes: IndexMap<ClassId, ClassDefinition>,
    relations: Vec<RelationDefinition>,
    /// (class, property) -> (relation index, side index)
    end_points: HashMap<(ClassId, String), (usize, usize)>,
    /// Non-anonymous end-points per class, in declaration order.
    by_class: HashMap<ClassId, Vec<(usize, usize)>>,
}

impl MappingConfiguration {
    /// Starts building a mapping.
    #[must_use]
    pub fn builder() -> MappingBuilder {
        MappingBuilder::default()
    }

    /// Returns the definition of a class.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownClass`] if the class is not mapped.
    pub fn class(&self, class_id: &ClassId) -> CoreResult<&ClassDefinition> {
        self.classes
            .get(class_id)
            .ok_or_else(|| CoreError::UnknownClass {
                class_id: class_id.clone(),
            })
    }

    /// Iterates over all classes in declaration order.
    pub fn classes(&self) -> impl Iterator<Item = &ClassDefinition> {
        self.classes.values()
    }

    /// Iterates over all relations in declaration order.
    pub fn relations(&self) -> impl Iterator<Item = &RelationDefinition> {
        self.relations.iter()
    }

    /// Returns the definition of the relation end-point `class.property`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownProperty`] if the class has no such relation
    /// property.
    pub fn end_point_definition(
        &self,
        class_id: &ClassId,
        property: &str,
    ) -> CoreResult<&RelationEndPointDefinition> {
        let (relation, side) = self.locate(class_id, property)?;
        Ok(&self.relations[relation].end_points[side])
    }

    /// Returns the opposite side of the relation end-point `class.property`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownProperty`] if the class has no such relation
    /// property.
    pub fn opposite(
        &self,
        class_id: &ClassId,
        property: &str,
    ) -> CoreResult<&RelationEndPointDefinition> {
        let (relation, side) = self.locate(class_id, property)?;
        Ok(&self.relations[relation].end_points[1 - side])
    }

    /// Iterates over the navigable relation end-points of a class.
    pub fn end_point_definitions<'a>(
        &'a self,
        class_id: &ClassId,
    ) -> impl Iterator<Item = &'a RelationEndPointDefinition> + 'a {
        self.by_class
            .get(class_id)
            .into_iter()
            .flatten()
            .map(|&(relation, side)| &self.relations[relation].end_points[side])
    }

    /// Iterates over the anonymous real end-points whose opposite is
    /// anonymous and owned by `class_id`.
    ///
    /// These are the only references to an object of `class_id` that cannot
    /// be navigated from the object itself.
    pub fn anonymous_references<'a>(
        &'a self,
        class_id: &'a ClassId,
    ) -> impl Iterator<Item = &'a RelationEndPointDefinition> + 'a {
        self.relations.iter().filter_map(move |relation| {
            let [first, second] = &relation.end_points;
            if second.is_anonymous() && &second.class_id == class_id {
                Some(first)
            } else if first.is_anonymous() && &first.class_id == class_id {
                Some(second)
            } else {
                None
            }
        })
    }

    fn locate(&self, class_id: &ClassId, property: &str) -> CoreResult<(usize, usize)> {
        self.end_points
            .get(&(class_id.clone(), property.to_string()))
            .copied()
            .ok_or_else(|| CoreError::UnknownProperty {
                class_id: class_id.clone(),
                property: property.to_string(),
            })
    }
}

/// Builder for [`MappingConfiguration`].
#[derive(Debug, Default)]
pub struct MappingBuilder {
    classes: Vec<ClassDefinition>,
    relations: Vec<RelationDefinition>,
}

impl MappingBuilder {
    /// Adds a class.
    #[must_use]
    pub fn class(mut self, class: ClassDefinition) -> Self {
        self.classes.push(class);
        self
    }

    /// Adds a relation.
    #[must_use]
    pub fn relation(mut self, relation: RelationDefinition) -> Self {
        self.relations.push(relation);
        self
    }

    /// Validates and indexes the mapping.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidMapping`] if a class or property is
    /// declared twice, a relation refers to an unknown class, or a relation
    /// does not have exactly one real side with cardinality one.
    pub fn build(self) -> CoreResult<MappingConfiguration> {
        let mut classes = IndexMap::new();
        for class in self.classes {
            let mut names = HashSet::new();
            for property in &class.properties {
                if !names.insert(property.name.as_str()) {
                    return Err(CoreError::invalid_mapping(format!(
                        "property '{}' is declared twice on {}",
                        property.name, class.id
                    )));
                }
            }
            if classes.contains_key(&class.id) {
                return Err(CoreError::invalid_mapping(format!(
                    "class {} is declared twice",
                    class.id
                )));
            }
            classes.insert(class.id.clone(), class);
        }

        let mut relation_ids = HashSet::new();
        let mut end_points = HashMap::new();
        let mut by_class: HashMap<ClassId, Vec<(usize, usize)>> = HashMap::new();

        for (index, relation) in self.relations.iter().enumerate() {
            if !relation_ids.insert(relation.id.as_str()) {
                return Err(CoreError::invalid_mapping(format!(
                    "relation '{}' is declared twice",
                    relation.id
                )));
            }
            validate_relation(&classes, relation)?;

            for (side, end_point) in relation.end_points.iter().enumerate() {
                let Some(property) = &end_point.property else {
                    continue;
                };
                let class = &classes[&end_point.class_id];
                let key = (end_point.class_id.clone(), property.clone());
                if class.find_property(property).is_some() || end_points.contains_key(&key) {
                    return Err(CoreError::invalid_mapping(format!(
                        "property '{}' is declared twice on {}",
                        property, end_point.class_id
                    )));
                }
                end_points.insert(key, (index, side));
                by_class
                    .entry(end_point.class_id.clone())
                    .or_default()
                    .push((index, side));
            }
        }

        Ok(MappingConfiguration {
            classes,
            relations: self.relations,
            end_points,
            by_class,
        })
    }
}

fn validate_relation(
    classes: &IndexMap<ClassId, ClassDefinition>,
    relation: &RelationDefinition,
) -> CoreResult<()> {
    let fail = |message: &str| {
        Err(CoreError::invalid_mapping(format!(
            "relation '{}': {message}",
            relation.id
        )))
    };

    for end_point in &relation.end_points {
        if !classes.contains_key(&end_point.class_id) {
            return fail(&format!("class {} is not mapped", end_point.class_id));
        }
        if end_point.is_anonymous() && !end_point.is_virtual {
            return fail("an anonymous side must be virtual");
        }
    }

    let real: Vec<_> = relation
        .end_points
        .iter()
        .filter(|e| !e.is_virtual)
        .collect();
    match real.as_slice() {
        [single] => {
            if single.cardinality != Cardinality::One {
                return fail("the real side must have cardinality one");
            }
        }
        _ => return fail("exactly one side must be real"),
    }

    if relation.end_points.iter().all(|e| e.is_anonymous()) {
        return fail("at least one side must have a property");
    }
    Ok(())
}
