// Copyright 2025 Cowboy AI, LLC.

//! The projection source abstraction

use super::aggregate::{Aggregate, AggregateProjection};
use super::event_projection::EventProjection;
use super::shard::{AsyncProjectionShard, ShardName};
use super::wrapper::ProjectionWrapper;
use super::Projection;
use crate::errors::ProjectionResult;
use crate::events::EventType;
use crate::lifecycle::ProjectionLifecycle;
use crate::options::{AsyncOptions, StoreOptions, TeardownAction};
use crate::storage::DocumentType;
use crate::store::DocumentStore;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Case-insensitive projection name comparison
pub(crate) fn names_match(left: &str, right: &str) -> bool {
    left.chars()
        .flat_map(char::to_lowercase)
        .eq(right.chars().flat_map(char::to_lowercase))
}

/// Problems shared by every source variant
pub(crate) fn common_problems(
    name: &str,
    lifecycle: ProjectionLifecycle,
    async_options: &AsyncOptions,
) -> Vec<String> {
    let mut problems = Vec::new();
    if name.trim().is_empty() {
        problems.push("A projection must have a non-empty name".to_string());
    }
    if lifecycle == ProjectionLifecycle::Async {
        problems.extend(async_options.problems(name));
    }
    problems
}

/// Type-erased view of an [`AggregateProjection<T>`]
pub trait AggregateSource: Send + Sync {
    /// Projection name
    fn name(&self) -> &str;

    /// Registered lifecycle
    fn lifecycle(&self) -> ProjectionLifecycle;

    /// Projection version
    fn version(&self) -> u32;

    /// The aggregated document type
    fn aggregate_type(&self) -> DocumentType;

    /// Options passed through to the async daemon
    fn async_options(&self) -> &AsyncOptions;

    /// Event types with a create, apply or delete handler
    fn event_types(&self) -> Vec<EventType>;

    /// Teardown actions the daemon runs before a rebuild
    fn teardown_actions(&self) -> Vec<TeardownAction>;

    /// Configuration problems, empty when valid
    fn validate(&self, options: &StoreOptions) -> Vec<String>;

    /// Build the inline/async runtime
    fn build(&self, store: &dyn DocumentStore) -> ProjectionResult<Arc<dyn Projection>>;

    /// Access to the concrete projection for typed resolution
    fn as_any(&self) -> &dyn Any;
}

/// A registered projection declaration
pub enum ProjectionSource {
    /// User-authored event projection
    Event(EventProjection),
    /// Self-aggregating projection bound to a document type
    Aggregate(Box<dyn AggregateSource>),
    /// Externally built projection instance
    Wrapped(ProjectionWrapper),
}

impl ProjectionSource {
    /// Declared name
    pub fn name(&self) -> &str {
        match self {
            ProjectionSource::Event(projection) => projection.name(),
            ProjectionSource::Aggregate(source) => source.name(),
            ProjectionSource::Wrapped(wrapper) => wrapper.name(),
        }
    }

    /// Lifecycle
    pub fn lifecycle(&self) -> ProjectionLifecycle {
        match self {
            ProjectionSource::Event(projection) => projection.lifecycle(),
            ProjectionSource::Aggregate(source) => source.lifecycle(),
            ProjectionSource::Wrapped(wrapper) => wrapper.lifecycle(),
        }
    }

    /// Projection version
    pub fn version(&self) -> u32 {
        match self {
            ProjectionSource::Event(projection) => projection.version(),
            ProjectionSource::Aggregate(source) => source.version(),
            ProjectionSource::Wrapped(wrapper) => wrapper.version(),
        }
    }

    /// Aggregated document type, for self-aggregating sources only
    pub fn aggregate_type(&self) -> Option<DocumentType> {
        match self {
            ProjectionSource::Aggregate(source) => Some(source.aggregate_type()),
            _ => None,
        }
    }

    /// Whether this source aggregates a document type
    pub fn is_self_aggregating(&self) -> bool {
        matches!(self, ProjectionSource::Aggregate(_))
    }

    /// Options passed through to the async daemon
    pub fn async_options(&self) -> &AsyncOptions {
        match self {
            ProjectionSource::Event(projection) => projection.async_options(),
            ProjectionSource::Aggregate(source) => source.async_options(),
            ProjectionSource::Wrapped(wrapper) => wrapper.async_options(),
        }
    }

    /// Event types this source reacts to; empty means every event
    pub fn event_types(&self) -> Vec<EventType> {
        match self {
            ProjectionSource::Event(projection) => projection.event_types(),
            ProjectionSource::Aggregate(source) => source.event_types(),
            ProjectionSource::Wrapped(_) => Vec::new(),
        }
    }

    /// Teardown actions the daemon runs before rebuilding this source
    ///
    /// Self-aggregating sources always delete their documents first.
    pub fn teardown_actions(&self) -> Vec<TeardownAction> {
        match self {
            ProjectionSource::Aggregate(source) => source.teardown_actions(),
            _ => self.async_options().teardown.clone(),
        }
    }

    /// Every configuration problem of this source; never fails
    pub fn validate(&self, options: &StoreOptions) -> Vec<String> {
        match self {
            ProjectionSource::Event(projection) => projection.validate(options),
            ProjectionSource::Aggregate(source) => source.validate(options),
            ProjectionSource::Wrapped(wrapper) => wrapper.validate(options),
        }
    }

    /// Build the executable projection for inline or async execution
    pub fn build(&self, store: &dyn DocumentStore) -> ProjectionResult<Arc<dyn Projection>> {
        match self {
            ProjectionSource::Event(projection) => Ok(Arc::new(projection.build_runtime())),
            ProjectionSource::Aggregate(source) => source.build(store),
            ProjectionSource::Wrapped(wrapper) => Ok(wrapper.projection()),
        }
    }

    /// Async work descriptors; empty unless the lifecycle is Async
    pub fn async_projection_shards(
        self: &Arc<Self>,
        options: &StoreOptions,
    ) -> Vec<AsyncProjectionShard> {
        if self.lifecycle() != ProjectionLifecycle::Async {
            return Vec::new();
        }

        let name = ShardName::all(self.name(), self.version());
        let mut async_options = self.async_options().resolve(&options.daemon);
        async_options.teardown = self.teardown_actions();
        vec![AsyncProjectionShard::new(
            name,
            Arc::clone(self),
            async_options,
            self.event_types(),
        )]
    }

    /// The concrete aggregate projection for `T`, if this source is one
    pub fn as_aggregate<T: Aggregate>(&self) -> Option<&AggregateProjection<T>> {
        match self {
            ProjectionSource::Aggregate(source) => {
                source.as_any().downcast_ref::<AggregateProjection<T>>()
            }
            _ => None,
        }
    }
}

impl fmt::Debug for ProjectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            ProjectionSource::Event(_) => "Event",
            ProjectionSource::Aggregate(_) => "Aggregate",
            ProjectionSource::Wrapped(_) => "Wrapped",
        };
        f.debug_struct("ProjectionSource")
            .field("kind", &kind)
            .field("name", &self.name())
            .field("lifecycle", &self.lifecycle())
            .field("aggregate_type", &self.aggregate_type())
            .finish()
    }
}

impl From<EventProjection> for ProjectionSource {
    fn from(projection: EventProjection) -> Self {
        ProjectionSource::Event(projection)
    }
}

impl<T: Aggregate> From<AggregateProjection<T>> for ProjectionSource {
    fn from(projection: AggregateProjection<T>) -> Self {
        ProjectionSource::Aggregate(Box::new(projection))
    }
}

impl From<ProjectionWrapper> for ProjectionSource {
    fn from(wrapper: ProjectionWrapper) -> Self {
        ProjectionSource::Wrapped(wrapper)
    }
}
