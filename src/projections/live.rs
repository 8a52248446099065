// Copyright 2025 Cowboy AI, LLC.

use super::aggregate::{Aggregate, AggregateHandlers};
use crate::events::StoredEvent;
use crate::storage::DocumentType;
use std::fmt;
use std::sync::Arc;

/// On-demand fold of a stream into `T`
///
/// Live aggregators hold no per-stream state and are shared between callers.
pub struct LiveAggregator<T> {
    projection_name: String,
    handlers: Arc<AggregateHandlers<T>>,
}

impl<T: Aggregate> LiveAggregator<T> {
    pub(crate) fn new(projection_name: String, handlers: Arc<AggregateHandlers<T>>) -> Self {
        Self {
            projection_name,
            handlers,
        }
    }

    /// Fold `events` in order, starting from `snapshot` when one is given
    ///
    /// Returns `None` when the stream never created the aggregate or ended by deleting it.
    pub fn build<'a, I>(&self, events: I, snapshot: Option<T>) -> Option<T>
    where
        I: IntoIterator<Item = &'a StoredEvent>,
    {
        self.handlers.fold(events, snapshot)
    }

    /// Name of the projection this aggregator was built from
    pub fn projection_name(&self) -> &str {
        &self.projection_name
    }

    /// The aggregated document type
    pub fn aggregate_type(&self) -> DocumentType {
        T::document_type()
    }
}

impl<T> fmt::Debug for LiveAggregator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveAggregator")
            .field("projection_name", &self.projection_name)
            .finish()
    }
}
