// Copyright 2025 Cowboy AI, LLC.

//! Error types for projection registration, validation and execution

use thiserror::Error;

/// Errors that can occur while registering, validating or running projections
#[derive(Debug, Clone, Error)]
pub enum ProjectionError {
    /// A self-validating source was rejected at registration time
    #[error("Invalid projection '{name}': {}", .problems.join("; "))]
    InvalidProjection {
        /// Name of the rejected projection
        name: String,
        /// Every problem reported by the projection's validation
        problems: Vec<String>,
    },

    /// An opaque projection was registered with the Live lifecycle
    #[error("Live cannot be used for an opaque projection: {name}")]
    LiveNotSupported {
        /// Name of the wrapped projection
        name: String,
    },

    /// A projection with the same (case-insensitive) name is already registered
    #[error("Duplicate projection name: {0}")]
    DuplicateProjectionName(String),

    /// Whole-collection validation found one or more problems
    #[error("Invalid projection configuration:\n{}", .0.join("\n"))]
    InvalidConfiguration(Vec<String>),

    /// Async shards were requested before the configuration was validated
    #[error("Async projection shards are not available until the projection configuration has been validated")]
    ShardIndexNotBuilt,

    /// A projection's event handler failed while processing an event
    #[error("Event handler error in {projection} for {event_type}: {reason}")]
    EventHandler {
        /// Projection that owns the failing handler
        projection: String,
        /// Event type being handled
        event_type: String,
        /// Failure description
        reason: String,
    },

    /// The document storage collaborator failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Document (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for projection operations
pub type ProjectionResult<T> = Result<T, ProjectionError>;

impl From<serde_json::Error> for ProjectionError {
    fn from(err: serde_json::Error) -> Self {
        ProjectionError::Serialization(err.to_string())
    }
}

impl ProjectionError {
    /// Check if this error describes a configuration mistake rather than a runtime failure
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ProjectionError::InvalidProjection { .. }
                | ProjectionError::LiveNotSupported { .. }
                | ProjectionError::DuplicateProjectionName(_)
                | ProjectionError::InvalidConfiguration(_)
        )
    }

    /// The individual problem descriptions carried by a validation error
    pub fn problems(&self) -> &[String] {
        match self {
            ProjectionError::InvalidProjection { problems, .. } => problems,
            ProjectionError::InvalidConfiguration(problems) => problems,
            _ => &[],
        }
    }
}
