// Copyright 2025 Cowboy AI, LLC.

//! Async work descriptors handed to the projection daemon

use super::source::ProjectionSource;
use crate::events::{EventType, StoredEvent};
use crate::options::AsyncOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identity of one unit of async work
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardName {
    /// Owning projection
    pub projection_name: String,
    /// Shard key within the projection
    pub key: String,
    /// Projection version
    pub version: u32,
}

impl ShardName {
    /// Key of the single shard covering a projection's whole event log
    pub const ALL: &'static str = "All";

    /// The shard covering every event for a projection
    pub fn all(projection_name: impl Into<String>, version: u32) -> Self {
        Self {
            projection_name: projection_name.into(),
            key: Self::ALL.to_string(),
            version,
        }
    }

    /// `Name:Key`, or `Name:V2:Key` once the projection is past version 1
    pub fn identity(&self) -> String {
        if self.version > 1 {
            format!("{}:V{}:{}", self.projection_name, self.version, self.key)
        } else {
            format!("{}:{}", self.projection_name, self.key)
        }
    }
}

impl fmt::Display for ShardName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity())
    }
}

/// A named unit of async projection work
#[derive(Clone)]
pub struct AsyncProjectionShard {
    name: ShardName,
    source: Arc<ProjectionSource>,
    options: AsyncOptions,
    event_types: Vec<EventType>,
}

impl AsyncProjectionShard {
    /// Create a shard for `source`
    pub fn new(
        name: ShardName,
        source: Arc<ProjectionSource>,
        options: AsyncOptions,
        event_types: Vec<EventType>,
    ) -> Self {
        Self {
            name,
            source,
            options,
            event_types,
        }
    }

    /// Unique shard identity
    pub fn identity(&self) -> String {
        self.name.identity()
    }

    /// Structured shard name
    pub fn name(&self) -> &ShardName {
        &self.name
    }

    /// The source this shard executes
    pub fn source(&self) -> &Arc<ProjectionSource> {
        &self.source
    }

    /// Options resolved against the daemon defaults
    pub fn options(&self) -> &AsyncOptions {
        &self.options
    }

    /// Event type filter; empty accepts every event
    pub fn event_types(&self) -> &[EventType] {
        &self.event_types
    }

    /// Whether the daemon should feed `event` to this shard
    pub fn accepts(&self, event: &StoredEvent) -> bool {
        self.event_types.is_empty() || self.event_types.iter().any(|t| event.is(t))
    }
}

impl fmt::Debug for AsyncProjectionShard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncProjectionShard")
            .field("name", &self.name.identity())
            .field("options", &self.options)
            .field("event_types", &self.event_types)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1, "Orders:All" ; "first version omits the version")]
    #[test_case(3, "Orders:V3:All" ; "later versions are part of the identity")]
    fn identity_includes_version_after_the_first(version: u32, expected: &str) {
        assert_eq!(ShardName::all("Orders", version).identity(), expected);
    }

    #[test]
    fn shard_name_serializes_as_a_struct() {
        let json = serde_json::to_value(ShardName::all("Orders", 1)).unwrap();
        assert_eq!(json["key"], "All");
        assert_eq!(json["projection_name"], "Orders");
    }
}
