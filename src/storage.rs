// Copyright 2025 Cowboy AI, LLC.

//! Document storage collaborator
//!
//! The registry never provisions tables itself. Self-aggregating registrations
//! ask a [`DocumentStorage`] to guarantee that their document type is
//! persistable and hand the caller a [`MappingExpression`] to customize it.

use crate::options::EventStoreOptions;
use dashmap::DashMap;
use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Last path segment of a type name, without generic arguments
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Runtime identity of a document type
#[derive(Clone, Copy)]
pub struct DocumentType {
    id: TypeId,
    name: &'static str,
}

impl DocumentType {
    /// Identity of the document type `T`
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: short_type_name(std::any::type_name::<T>()),
        }
    }

    /// Short type name, e.g. `Invoice`
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The underlying type id
    pub fn type_id(&self) -> TypeId {
        self.id
    }
}

impl PartialEq for DocumentType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DocumentType {}

impl Hash for DocumentType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentType({})", self.name)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Persistence settings for one document type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMapping {
    /// The mapped type
    pub document_type: DocumentType,
    /// Storage alias, defaults to the lowercased type name
    pub alias: String,
    /// Schema the documents are stored in
    pub database_schema: String,
    /// Whether documents are partitioned by tenant
    pub multi_tenanted: bool,
    /// Indexed document fields
    pub indexes: Vec<String>,
}

impl DocumentMapping {
    /// Default mapping for a document type stored in `database_schema`
    pub fn new(document_type: DocumentType, database_schema: impl Into<String>) -> Self {
        Self {
            document_type,
            alias: document_type.name().to_lowercase(),
            database_schema: database_schema.into(),
            multi_tenanted: false,
            indexes: Vec::new(),
        }
    }
}

/// Storage/schema collaborator that owns document mappings
#[cfg_attr(test, mockall::automock)]
pub trait DocumentStorage: Send + Sync {
    /// Guarantee a mapping exists for the type and return its current state
    fn ensure_storage_for(&self, document_type: DocumentType) -> DocumentMapping;

    /// Replace the mapping for a type
    fn update_mapping(&self, mapping: DocumentMapping);

    /// Current mapping for a type, if storage was ensured
    fn mapping_for(&self, document_type: DocumentType) -> Option<DocumentMapping>;
}

/// In-memory [`DocumentStorage`]
#[derive(Debug)]
pub struct InMemoryDocumentStorage {
    mappings: DashMap<DocumentType, DocumentMapping>,
    database_schema: String,
}

impl InMemoryDocumentStorage {
    /// Create an empty storage registry using the default schema
    pub fn new() -> Self {
        Self::with_database_schema(EventStoreOptions::default().database_schema)
    }

    /// Create an empty storage registry placing new documents in `database_schema`
    pub fn with_database_schema(database_schema: impl Into<String>) -> Self {
        Self {
            mappings: DashMap::new(),
            database_schema: database_schema.into(),
        }
    }

    /// All document types with ensured storage
    pub fn document_types(&self) -> Vec<DocumentType> {
        self.mappings.iter().map(|entry| *entry.key()).collect()
    }
}

impl Default for InMemoryDocumentStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStorage for InMemoryDocumentStorage {
    fn ensure_storage_for(&self, document_type: DocumentType) -> DocumentMapping {
        self.mappings
            .entry(document_type)
            .or_insert_with(|| {
                debug!(document_type = %document_type, "Ensured document storage");
                DocumentMapping::new(document_type, self.database_schema.clone())
            })
            .value()
            .clone()
    }

    fn update_mapping(&self, mapping: DocumentMapping) {
        self.mappings.insert(mapping.document_type, mapping);
    }

    fn mapping_for(&self, document_type: DocumentType) -> Option<DocumentMapping> {
        self.mappings
            .get(&document_type)
            .map(|entry| entry.value().clone())
    }
}

/// Handle for customizing the persistence of `T` after registration
pub struct MappingExpression<T> {
    storage: Arc<dyn DocumentStorage>,
    document_type: DocumentType,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> MappingExpression<T> {
    pub(crate) fn new(storage: Arc<dyn DocumentStorage>, document_type: DocumentType) -> Self {
        Self {
            storage,
            document_type,
            _marker: PhantomData,
        }
    }

    /// Set the storage alias
    pub fn alias(self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        self.configure(|mapping| mapping.alias = alias)
    }

    /// Store documents in a specific schema
    pub fn database_schema(self, schema: impl Into<String>) -> Self {
        let schema = schema.into();
        self.configure(|mapping| mapping.database_schema = schema)
    }

    /// Partition documents by tenant
    pub fn multi_tenanted(self) -> Self {
        self.configure(|mapping| mapping.multi_tenanted = true)
    }

    /// Index a document field
    pub fn index(self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.configure(|mapping| {
            if !mapping.indexes.contains(&field) {
                mapping.indexes.push(field);
            }
        })
    }

    /// Snapshot of the current mapping
    pub fn mapping(&self) -> DocumentMapping {
        self.storage.ensure_storage_for(self.document_type)
    }

    fn configure(self, change: impl FnOnce(&mut DocumentMapping)) -> Self {
        let mut mapping = self.mapping();
        change(&mut mapping);
        self.storage.update_mapping(mapping);
        self
    }
}

impl<T> fmt::Debug for MappingExpression<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingExpression")
            .field("document_type", &self.document_type)
            .finish()
    }
}
