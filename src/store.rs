// Copyright 2025 Cowboy AI, LLC.

//! The owning document store as seen by the projection registry

use crate::options::StoreOptions;
use crate::storage::{DocumentStorage, InMemoryDocumentStorage};
use std::sync::Arc;

/// Document store that owns a [`ProjectionCollection`](crate::ProjectionCollection)
pub trait DocumentStore: Send + Sync {
    /// Store configuration
    fn options(&self) -> &StoreOptions;

    /// Storage collaborator used to provision document types
    fn storage(&self) -> Arc<dyn DocumentStorage>;
}

/// Minimal in-memory [`DocumentStore`]
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    options: StoreOptions,
    storage: Arc<InMemoryDocumentStorage>,
}

impl InMemoryDocumentStore {
    /// Create a store with the given options
    pub fn new(options: StoreOptions) -> Self {
        Self {
            storage: Arc::new(InMemoryDocumentStorage::with_database_schema(
                options.events.database_schema.clone(),
            )),
            options,
        }
    }

    /// Concrete storage, for inspecting ensured mappings
    pub fn document_storage(&self) -> &Arc<InMemoryDocumentStorage> {
        &self.storage
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn storage(&self) -> Arc<dyn DocumentStorage> {
        self.storage.clone()
    }
}
