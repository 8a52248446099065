// Copyright 2025 Cowboy AI, LLC.

//! Document sessions used by executing projections
//!
//! Inline projections run against the session of the transaction that appends
//! the events; async projections run against a session opened by the daemon.

use crate::errors::ProjectionResult;
use crate::storage::DocumentType;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Unit of work against stored documents
#[async_trait]
pub trait DocumentSession: Send + Sync {
    /// Load a document by id
    async fn load(
        &self,
        document_type: &DocumentType,
        id: &str,
    ) -> ProjectionResult<Option<serde_json::Value>>;

    /// Insert or replace a document
    async fn store(
        &self,
        document_type: &DocumentType,
        id: &str,
        document: serde_json::Value,
    ) -> ProjectionResult<()>;

    /// Delete a document; deleting a missing document is not an error
    async fn delete(&self, document_type: &DocumentType, id: &str) -> ProjectionResult<()>;
}

/// A pending change to a stored document
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOperation {
    /// Insert or replace
    Store {
        /// Target document type
        document_type: DocumentType,
        /// Document id
        id: String,
        /// Serialized document
        document: serde_json::Value,
    },
    /// Remove
    Delete {
        /// Target document type
        document_type: DocumentType,
        /// Document id
        id: String,
    },
}

/// Buffer of document operations produced by event handlers
#[derive(Debug, Default)]
pub struct ProjectionOperations {
    operations: Vec<DocumentOperation>,
}

impl ProjectionOperations {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a store of `document` under `id`
    pub fn store<D: Serialize + 'static>(
        &mut self,
        id: impl Into<String>,
        document: &D,
    ) -> ProjectionResult<()> {
        self.operations.push(DocumentOperation::Store {
            document_type: DocumentType::of::<D>(),
            id: id.into(),
            document: serde_json::to_value(document)?,
        });
        Ok(())
    }

    /// Queue a delete of the `D` document with `id`
    pub fn delete<D: 'static>(&mut self, id: impl Into<String>) {
        self.operations.push(DocumentOperation::Delete {
            document_type: DocumentType::of::<D>(),
            id: id.into(),
        });
    }

    /// Number of queued operations
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Queued operations in order
    pub fn operations(&self) -> &[DocumentOperation] {
        &self.operations
    }

    /// Apply every queued operation to the session, in order
    pub async fn flush(self, session: &dyn DocumentSession) -> ProjectionResult<()> {
        for operation in self.operations {
            match operation {
                DocumentOperation::Store {
                    document_type,
                    id,
                    document,
                } => session.store(&document_type, &id, document).await?,
                DocumentOperation::Delete { document_type, id } => {
                    session.delete(&document_type, &id).await?
                }
            }
        }
        Ok(())
    }
}

/// In-memory [`DocumentSession`]
#[derive(Debug, Default)]
pub struct InMemoryDocumentSession {
    documents: RwLock<HashMap<(DocumentType, String), serde_json::Value>>,
}

impl InMemoryDocumentSession {
    /// Create an empty session
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and deserialize a document
    pub async fn load_as<D: DeserializeOwned + 'static>(
        &self,
        id: &str,
    ) -> ProjectionResult<Option<D>> {
        let document = self.load(&DocumentType::of::<D>(), id).await?;
        Ok(document.map(serde_json::from_value).transpose()?)
    }

    /// Number of stored documents of a type
    pub async fn count(&self, document_type: &DocumentType) -> usize {
        self.documents
            .read()
            .await
            .keys()
            .filter(|(stored_type, _)| stored_type == document_type)
            .count()
    }
}

#[async_trait]
impl DocumentSession for InMemoryDocumentSession {
    async fn load(
        &self,
        document_type: &DocumentType,
        id: &str,
    ) -> ProjectionResult<Option<serde_json::Value>> {
        let documents = self.documents.read().await;
        Ok(documents.get(&(*document_type, id.to_string())).cloned())
    }

    async fn store(
        &self,
        document_type: &DocumentType,
        id: &str,
        document: serde_json::Value,
    ) -> ProjectionResult<()> {
        let mut documents = self.documents.write().await;
        documents.insert((*document_type, id.to_string()), document);
        Ok(())
    }

    async fn delete(&self, document_type: &DocumentType, id: &str) -> ProjectionResult<()> {
        let mut documents = self.documents.write().await;
        documents.remove(&(*document_type, id.to_string()));
        Ok(())
    }
}
