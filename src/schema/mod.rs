// Entity property schemas consumed by the property path resolver
mod provider;
mod types;

pub use provider::{SchemaProvider, StaticSchemaProvider};
pub use types::{EntitySchema, Property, PropertyKind, ScalarType};
