// Copyright 2025 Cowboy AI, LLC.

//! Projection lifecycles

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// When and how a projection is executed
///
/// ```mermaid
/// graph LR
///     A[Append events] -->|same transaction| I[Inline]
///     A -->|daemon, out of band| S[Async]
///     Q[Query] -->|fold on demand| L[Live]
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum ProjectionLifecycle {
    /// Runs synchronously inside the transaction that appends the events
    #[default]
    Inline,
    /// Runs in the background daemon, driven by async shards
    Async,
    /// Computed on demand from raw events and never persisted
    Live,
}

impl ProjectionLifecycle {
    /// Whether the projection persists its output
    pub fn is_persisted(self) -> bool {
        !matches!(self, ProjectionLifecycle::Live)
    }
}

impl fmt::Display for ProjectionLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionLifecycle::Inline => write!(f, "Inline"),
            ProjectionLifecycle::Async => write!(f, "Async"),
            ProjectionLifecycle::Live => write!(f, "Live"),
        }
    }
}
