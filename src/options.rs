// Copyright 2025 Cowboy AI, LLC.

//! Store and daemon configuration consumed by projection sources

use crate::errors::ProjectionResult;
use crate::storage::DocumentType;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How event streams are identified
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum StreamIdentity {
    /// Streams are keyed by UUID
    #[default]
    AsGuid,
    /// Streams are keyed by an arbitrary string
    AsString,
}

/// Event store settings relevant to projections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EventStoreOptions {
    /// Identity strategy for event streams
    pub stream_identity: StreamIdentity,
    /// Schema holding the event tables and, unless a mapping overrides it, documents
    pub database_schema: String,
}

impl Default for EventStoreOptions {
    fn default() -> Self {
        Self {
            stream_identity: StreamIdentity::AsGuid,
            database_schema: "public".to_string(),
        }
    }
}

/// Defaults applied by the async daemon to every shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DaemonSettings {
    /// Events fetched per batch when a shard does not set its own batch size
    pub default_batch_size: usize,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            default_batch_size: 500,
        }
    }
}

/// Configuration of the owning document store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StoreOptions {
    /// Event store settings
    pub events: EventStoreOptions,
    /// Async daemon defaults
    pub daemon: DaemonSettings,
}

impl StoreOptions {
    /// Parse options from JSON, filling omitted fields with defaults
    pub fn from_json(json: &str) -> ProjectionResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// JSON schema describing the options document
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(StoreOptions)
    }
}

/// What the daemon should clear before rebuilding an async projection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownAction {
    /// Delete every stored document of the given type
    DeleteDocuments(DocumentType),
    /// Reset the shard's recorded progress to the start of the event log
    ResetProgress,
}

/// Rebuild and teardown options captured at registration for the async daemon
///
/// The registry never interprets these beyond validation; they are passed
/// through to each [`AsyncProjectionShard`](crate::AsyncProjectionShard).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsyncOptions {
    /// Events per batch; `None` falls back to [`DaemonSettings::default_batch_size`]
    pub batch_size: Option<usize>,
    /// Actions performed, in order, before a rebuild
    pub teardown: Vec<TeardownAction>,
}

impl AsyncOptions {
    /// Set the batch size
    pub fn batch_size(&mut self, size: usize) -> &mut Self {
        self.batch_size = Some(size);
        self
    }

    /// Delete all documents of type `T` on teardown
    pub fn delete_documents_on_teardown<T: 'static>(&mut self) -> &mut Self {
        self.add_teardown(TeardownAction::DeleteDocuments(DocumentType::of::<T>()))
    }

    /// Reset shard progress on teardown
    pub fn reset_progress_on_teardown(&mut self) -> &mut Self {
        self.add_teardown(TeardownAction::ResetProgress)
    }

    /// Append a teardown action
    pub fn add_teardown(&mut self, action: TeardownAction) -> &mut Self {
        self.teardown.push(action);
        self
    }

    pub(crate) fn problems(&self, projection: &str) -> Vec<String> {
        let mut problems = Vec::new();

        if self.batch_size == Some(0) {
            problems.push(format!(
                "Projection '{projection}' has an async batch size of 0; the batch size must be at least 1"
            ));
        }

        for (index, action) in self.teardown.iter().enumerate() {
            if self.teardown[..index].contains(action) {
                problems.push(format!(
                    "Projection '{projection}' declares the teardown action {action:?} more than once"
                ));
            }
        }

        problems
    }

    /// Fill unset values from the daemon defaults
    pub(crate) fn resolve(&self, daemon: &DaemonSettings) -> AsyncOptions {
        AsyncOptions {
            batch_size: Some(self.batch_size.unwrap_or(daemon.default_batch_size)),
            teardown: self.teardown.clone(),
        }
    }
}
