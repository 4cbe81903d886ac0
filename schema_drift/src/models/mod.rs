//! Entity mappings
//!
//! Entities describe the schema the application expects. They are collected
//! in a [`ModelRegistry`] and turned into a reference snapshot by a
//! [`ReferenceSchemaProvider`].

pub mod provider;
pub mod registry;

use serde::{Deserialize, Serialize};

use crate::schema::types::FieldDefinition;

pub use provider::{
    EntityMapping, ModelSchemaProvider, ProviderRegistry, ReferenceSchemaProvider, MODEL_PROVIDER,
};
pub use registry::{ModelInfo, ModelRegistry};

/// A struct mapped to a database table
///
/// Usually derived with `#[derive(Entity)]`.
pub trait Entity {
    fn descriptor() -> EntityDescriptor;
}

/// Mapping metadata of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Rust type name
    pub name: String,
    /// Explicit table name, otherwise derived by the naming convention
    pub table: Option<String>,
    pub fields: Vec<FieldDefinition>,
}
