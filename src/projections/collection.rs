// Copyright 2025 Cowboy AI, LLC.

//! The projection registry
//!
//! A [`ProjectionCollection`] is configured once, single-threaded, through
//! `&mut self`, and then shared read-only by the write path, the query path and
//! the async daemon. Two pieces of state are populated lazily after
//! configuration and are safe to touch from any thread:
//!
//! - the live aggregator cache, a copy-on-write map swapped atomically with
//!   [`ArcSwap::rcu`]; two threads missing the cache for the same type may both
//!   build an aggregator and the last one published wins,
//! - the async shard index, installed by [`ProjectionCollection::assert_validity`]
//!   and materialized once on first access.

use super::aggregate::{Aggregate, AggregateProjection};
use super::event_projection::EventProjection;
use super::live::LiveAggregator;
use super::shard::AsyncProjectionShard;
use super::source::{names_match, AggregateSource, ProjectionSource};
use super::wrapper::ProjectionWrapper;
use super::Projection;
use crate::errors::{ProjectionError, ProjectionResult};
use crate::lifecycle::ProjectionLifecycle;
use crate::options::{AsyncOptions, StoreOptions};
use crate::storage::{DocumentStorage, DocumentType, MappingExpression};
use crate::store::DocumentStore;
use arc_swap::{ArcSwap, ArcSwapOption};
use indexmap::IndexMap;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Callback adjusting the async options of a wrapped projection at registration
pub type AsyncConfiguration = Box<dyn FnOnce(&mut AsyncOptions) + Send>;

type LiveAggregatorCache = HashMap<DocumentType, Arc<dyn Any + Send + Sync>>;

/// Async shards of one validated configuration, computed on first use
struct ShardIndex {
    options: Arc<StoreOptions>,
    sources: Vec<Arc<ProjectionSource>>,
    shards: OnceLock<IndexMap<String, AsyncProjectionShard>>,
}

impl ShardIndex {
    fn new(options: Arc<StoreOptions>, sources: Vec<Arc<ProjectionSource>>) -> Self {
        Self {
            options,
            sources,
            shards: OnceLock::new(),
        }
    }

    fn shards(&self) -> &IndexMap<String, AsyncProjectionShard> {
        self.shards.get_or_init(|| {
            let mut shards = IndexMap::new();
            for source in &self.sources {
                for shard in source.async_projection_shards(&self.options) {
                    shards.entry(shard.identity()).or_insert(shard);
                }
            }
            debug!(shards = shards.len(), "Built async shard index");
            shards
        })
    }
}

/// Registry of every projection known to a document store
pub struct ProjectionCollection {
    options: Arc<StoreOptions>,
    storage: Arc<dyn DocumentStorage>,
    sources: Vec<Arc<ProjectionSource>>,
    live_aggregate_overrides: HashMap<DocumentType, Arc<ProjectionSource>>,
    live_aggregators: ArcSwap<LiveAggregatorCache>,
    shard_index: ArcSwapOption<ShardIndex>,
}

impl ProjectionCollection {
    /// Create an empty collection
    ///
    /// `options` are used by every validation, including
    /// [`assert_validity`](Self::assert_validity), which reports a store whose
    /// options differ. Prefer [`for_store`](Self::for_store).
    pub fn new(options: StoreOptions, storage: Arc<dyn DocumentStorage>) -> Self {
        Self {
            options: Arc::new(options),
            storage,
            sources: Vec::new(),
            live_aggregate_overrides: HashMap::new(),
            live_aggregators: ArcSwap::from_pointee(HashMap::new()),
            shard_index: ArcSwapOption::empty(),
        }
    }

    /// Create an empty collection using a store's options and storage
    pub fn for_store(store: &dyn DocumentStore) -> Self {
        Self::new(store.options().clone(), store.storage())
    }

    /// Register an externally built projection
    ///
    /// `name` overrides [`Projection::projection_name`]. `async_config` runs once,
    /// here, against the projection's async options. Fails immediately when
    /// `lifecycle` is Live; any other problem is reported by
    /// [`assert_validity`](Self::assert_validity).
    pub fn add(
        &mut self,
        projection: Arc<dyn Projection>,
        lifecycle: ProjectionLifecycle,
        name: Option<&str>,
        async_config: Option<AsyncConfiguration>,
    ) -> ProjectionResult<()> {
        let mut wrapper = ProjectionWrapper::new(projection, lifecycle)?;
        if let Some(name) = name {
            wrapper = wrapper.with_name(name);
        }
        if let Some(configure) = async_config {
            wrapper = wrapper.configure_async(configure);
        }
        self.add_wrapper(wrapper)
    }

    /// Register a prepared [`ProjectionWrapper`]
    pub fn add_wrapper(&mut self, wrapper: ProjectionWrapper) -> ProjectionResult<()> {
        self.register(ProjectionSource::Wrapped(wrapper))
    }

    /// Register an event projection, rejecting it if it is invalid
    pub fn add_event_projection(
        &mut self,
        mut projection: EventProjection,
        lifecycle: Option<ProjectionLifecycle>,
    ) -> ProjectionResult<()> {
        if let Some(lifecycle) = lifecycle {
            projection.set_lifecycle(lifecycle);
        }

        let problems = projection.validate(&self.options);
        if !problems.is_empty() {
            return Err(ProjectionError::InvalidProjection {
                name: projection.name().to_string(),
                problems,
            });
        }

        self.register(ProjectionSource::Event(projection))
    }

    /// Register the default self-aggregating projection of `T`
    ///
    /// Storage for `T` is ensured before validation. The returned handle
    /// customizes how `T` is persisted.
    pub fn self_aggregate<T: Aggregate>(
        &mut self,
        lifecycle: Option<ProjectionLifecycle>,
    ) -> ProjectionResult<MappingExpression<T>> {
        self.add_aggregate(AggregateProjection::<T>::default_projection(), lifecycle)
    }

    /// Register a caller-built self-aggregating projection of `T`
    pub fn add_aggregate<T: Aggregate>(
        &mut self,
        mut projection: AggregateProjection<T>,
        lifecycle: Option<ProjectionLifecycle>,
    ) -> ProjectionResult<MappingExpression<T>> {
        let document_type = T::document_type();
        self.storage.ensure_storage_for(document_type);

        if let Some(lifecycle) = lifecycle {
            projection.set_lifecycle(lifecycle);
        }

        let problems = AggregateSource::validate(&projection, &self.options);
        if !problems.is_empty() {
            return Err(ProjectionError::InvalidProjection {
                name: projection.name().to_string(),
                problems,
            });
        }

        self.register(projection.into())?;
        self.forget_aggregator(document_type);
        Ok(MappingExpression::new(Arc::clone(&self.storage), document_type))
    }

    /// Use `projection` for live aggregation of `T` when no `T` projection is registered
    ///
    /// The override never runs inline or async and is not listed among the
    /// registered sources; it is validated by [`assert_validity`](Self::assert_validity).
    pub fn live_stream_aggregation<T: Aggregate>(&mut self, mut projection: AggregateProjection<T>) {
        projection.set_lifecycle(ProjectionLifecycle::Live);
        let document_type = T::document_type();
        debug!(
            projection = %projection.name(),
            document_type = %document_type,
            "Registered live aggregation override"
        );
        self.live_aggregate_overrides
            .insert(document_type, Arc::new(ProjectionSource::from(projection)));
        self.forget_aggregator(document_type);
    }

    fn register(&mut self, source: ProjectionSource) -> ProjectionResult<()> {
        if self.try_find_projection(source.name()).is_some() {
            return Err(ProjectionError::DuplicateProjectionName(
                source.name().to_string(),
            ));
        }

        debug!(
            projection = %source.name(),
            lifecycle = ?source.lifecycle(),
            "Registered projection"
        );
        self.sources.push(Arc::new(source));
        Ok(())
    }

    fn forget_aggregator(&mut self, document_type: DocumentType) {
        if self.live_aggregators.load().contains_key(&document_type) {
            let mut cache = LiveAggregatorCache::clone(&self.live_aggregators.load());
            cache.remove(&document_type);
            self.live_aggregators.store(Arc::new(cache));
        }
    }

    /// Whether any projection is registered
    pub fn any(&self) -> bool {
        !self.sources.is_empty()
    }

    /// Number of registered projections
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no projection is registered
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Registered sources in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ProjectionSource>> {
        self.sources.iter()
    }

    /// Distinct document types that have a cached live aggregator or a registered aggregate projection
    pub fn all_aggregate_types(&self) -> impl Iterator<Item = DocumentType> {
        let cached = self.live_aggregators.load_full();
        let mut seen = HashSet::new();
        let types: Vec<DocumentType> = cached
            .keys()
            .copied()
            .chain(self.sources.iter().filter_map(|s| s.aggregate_type()))
            .filter(|document_type| seen.insert(*document_type))
            .collect();
        types.into_iter()
    }

    /// Build every Inline projection, in registration order
    pub fn build_inline_projections(
        &self,
        store: &dyn DocumentStore,
    ) -> ProjectionResult<Vec<Arc<dyn Projection>>> {
        self.sources
            .iter()
            .filter(|source| source.lifecycle() == ProjectionLifecycle::Inline)
            .map(|source| source.build(store))
            .collect()
    }

    /// Live aggregator for `T`, built on first use and cached for the collection's lifetime
    ///
    /// Resolution order on a cache miss: the first registered projection of
    /// `T`, then the live aggregation override for `T`, then the default
    /// projection declared by [`Aggregate::configure`]. The fallback is never
    /// registered.
    pub fn aggregator_for<T: Aggregate>(&self) -> ProjectionResult<Arc<LiveAggregator<T>>> {
        let document_type = T::document_type();

        if let Some(cached) = self.live_aggregators.load().get(&document_type) {
            if let Ok(aggregator) = Arc::clone(cached).downcast::<LiveAggregator<T>>() {
                return Ok(aggregator);
            }
        }

        let aggregator = Arc::new(self.build_aggregator::<T>()?);
        let published: Arc<dyn Any + Send + Sync> = aggregator.clone();
        self.live_aggregators.rcu(|cache| {
            let mut next = LiveAggregatorCache::clone(cache);
            next.insert(document_type, Arc::clone(&published));
            next
        });

        debug!(
            document_type = %document_type,
            projection = %aggregator.projection_name(),
            "Cached live aggregator"
        );
        Ok(aggregator)
    }

    fn build_aggregator<T: Aggregate>(&self) -> ProjectionResult<LiveAggregator<T>> {
        let registered = self
            .sources
            .iter()
            .find_map(|source| source.as_aggregate::<T>());
        let overridden = || {
            self.live_aggregate_overrides
                .get(&T::document_type())
                .and_then(|source| source.as_aggregate::<T>())
        };

        let fallback;
        let projection = match registered.or_else(overridden) {
            Some(projection) => projection,
            None => {
                fallback = AggregateProjection::<T>::default_projection();
                &fallback
            }
        };

        let problems = AggregateSource::validate(projection, &self.options);
        if !problems.is_empty() {
            return Err(ProjectionError::InvalidProjection {
                name: projection.name().to_string(),
                problems,
            });
        }

        Ok(projection.build_live_aggregator())
    }

    /// Validate every registered source and live override as a whole
    ///
    /// Every problem is collected before failing, and the async shard index is
    /// rebuilt whether or not validation succeeds.
    pub fn assert_validity(&self, store: &dyn DocumentStore) -> ProjectionResult<()> {
        let options = self.options.as_ref();
        let mut checked: Vec<&Arc<ProjectionSource>> = Vec::new();
        let mut problems = Vec::new();

        if store.options() != options {
            let problem = "The projection collection was built with different store options than the store being validated; create it with ProjectionCollection::for_store".to_string();
            warn!(problem = %problem, "Invalid projection configuration");
            problems.push(problem);
        }

        for source in self
            .sources
            .iter()
            .chain(self.live_aggregate_overrides.values())
        {
            if checked.iter().any(|seen| Arc::ptr_eq(seen, source)) {
                continue;
            }
            checked.push(source);

            for problem in source.validate(options) {
                warn!(
                    projection = %source.name(),
                    lifecycle = ?source.lifecycle(),
                    problem = %problem,
                    "Invalid projection configuration"
                );
                problems.push(problem);
            }
        }

        let async_sources: Vec<Arc<ProjectionSource>> = self
            .sources
            .iter()
            .filter(|source| source.lifecycle() == ProjectionLifecycle::Async)
            .cloned()
            .collect();

        let mut claimed: HashMap<String, &str> = HashMap::new();
        for source in &async_sources {
            for shard in source.async_projection_shards(options) {
                let identity = shard.identity();
                match claimed.get(identity.as_str()) {
                    Some(owner) => {
                        let problem = format!(
                            "Async shard identity '{identity}' is claimed by both '{owner}' and '{}'",
                            source.name()
                        );
                        warn!(
                            projection = %source.name(),
                            shard = %identity,
                            "Duplicate async shard identity"
                        );
                        problems.push(problem);
                    }
                    None => {
                        claimed.insert(identity, source.name());
                    }
                }
            }
        }

        let async_count = async_sources.len();
        self.shard_index.store(Some(Arc::new(ShardIndex::new(
            Arc::clone(&self.options),
            async_sources,
        ))));

        if !problems.is_empty() {
            return Err(ProjectionError::InvalidConfiguration(problems));
        }

        info!(
            projections = self.sources.len(),
            async_projections = async_count,
            live_overrides = self.live_aggregate_overrides.len(),
            "Projection configuration is valid"
        );
        Ok(())
    }

    /// Every async shard; fails until [`assert_validity`](Self::assert_validity) has run
    pub fn all_shards(&self) -> ProjectionResult<Vec<AsyncProjectionShard>> {
        let index = self
            .shard_index
            .load_full()
            .ok_or(ProjectionError::ShardIndexNotBuilt)?;
        Ok(index.shards().values().cloned().collect())
    }

    /// Find an async shard by identity or projection name
    ///
    /// Exact identity first, then the projection name, then both again
    /// ignoring case. `None` when validation has not run.
    pub fn try_find_async_shard(&self, name: &str) -> Option<AsyncProjectionShard> {
        let index = self.shard_index.load_full()?;
        let shards = index.shards();

        shards
            .get(name)
            .or_else(|| {
                shards
                    .values()
                    .find(|shard| shard.name().projection_name == name)
            })
            .or_else(|| {
                shards
                    .values()
                    .find(|shard| names_match(&shard.identity(), name))
            })
            .or_else(|| {
                shards
                    .values()
                    .find(|shard| names_match(&shard.name().projection_name, name))
            })
            .cloned()
    }

    /// Registered source with this name, ignoring case
    pub fn try_find_projection(&self, name: &str) -> Option<Arc<ProjectionSource>> {
        self.sources
            .iter()
            .find(|source| names_match(source.name(), name))
            .cloned()
    }

    /// Names of every registered source, in registration order
    pub fn all_projection_names(&self) -> Vec<String> {
        self.sources
            .iter()
            .map(|source| source.name().to_string())
            .collect()
    }
}

impl fmt::Debug for ProjectionCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectionCollection")
            .field("sources", &self.sources)
            .field(
                "live_aggregate_overrides",
                &self.live_aggregate_overrides.keys().collect::<Vec<_>>(),
            )
            .field("cached_aggregators", &self.live_aggregators.load().len())
            .field("shard_index_built", &self.shard_index.load().is_some())
            .finish()
    }
}
