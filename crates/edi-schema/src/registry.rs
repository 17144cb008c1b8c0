//! Concurrent registry of bound schemas

use crate::model::Schema;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::trace;

/// Thread-safe registry sharing bound schemas across validations.
///
/// Schemas are frozen once bound, so handing out `Arc<Schema>` clones is
/// enough for concurrent readers.
#[derive(Debug, Default)]
pub struct ConcurrentSchemaRegistry {
    schemas: DashMap<String, Arc<Schema>>,
}

impl ConcurrentSchemaRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema, replacing any previous one under `name`
    pub fn register(&self, name: impl Into<String>, schema: Arc<Schema>) {
        let name = name.into();
        trace!("Registering schema {}", name);
        self.schemas.insert(name, schema);
    }

    /// Get a schema by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Check if a schema exists
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Remove a schema
    pub fn remove(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas.remove(name).map(|(_, schema)| schema)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
