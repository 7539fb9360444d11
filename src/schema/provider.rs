use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::types::EntitySchema;

/// Supplies the property schema of an entity type to the path resolver.
pub trait SchemaProvider: Send + Sync {
    fn schema_for(&self, entity: &str) -> Option<Arc<EntitySchema>>;
}

/// Registry of schemas built once at startup.
#[derive(Default)]
pub struct StaticSchemaProvider {
    schemas: RwLock<HashMap<String, Arc<EntitySchema>>>,
}

impl StaticSchemaProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a schema under its entity name.
    pub fn register(&self, schema: EntitySchema) -> Arc<EntitySchema> {
        let schema = Arc::new(schema);
        self.schemas.write().insert(schema.name.clone(), schema.clone());
        schema
    }

    #[must_use]
    pub fn entity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl SchemaProvider for StaticSchemaProvider {
    fn schema_for(&self, entity: &str) -> Option<Arc<EntitySchema>> {
        self.schemas.read().get(entity).cloned()
    }
}
