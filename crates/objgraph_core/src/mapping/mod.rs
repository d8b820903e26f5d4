//! Mapping metadata.
//!
//! The mapping describes which classes exist, which data properties they
//! carry and how they are related. It is built once, validated, and shared
//! read-only by every transaction of a hierarchy.

mod class;
mod configuration;
mod relation;

pub use class::{ClassDefinition, PropertyDefinition};
pub use configuration::{MappingBuilder, MappingConfiguration};
pub use relation::{Cardinality, RelationDefinition, RelationEndPointDefinition};
