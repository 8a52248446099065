//! # CIM Projections
//!
//! Projection registry and orchestration for event-sourced document stores.
//!
//! A store declares its projections once at startup in a [`ProjectionCollection`]
//! and then serves three executors from it:
//! - **Inline**: projections applied in the same unit of work as the events
//! - **Async**: projections split into [`AsyncProjectionShard`]s for a background daemon
//! - **Live**: [`LiveAggregator`]s that fold a stream into an aggregate on demand
//!
//! Projections come in three flavours, all registered as a [`ProjectionSource`]:
//! - [`EventProjection`]: handlers per event type writing documents
//! - [`AggregateProjection<T>`]: a self-aggregating document built from its own stream
//! - [`ProjectionWrapper`]: any externally built [`Projection`] instance
//!
//! ## Design Principles
//!
//! 1. **Fail Fast**: self-validating sources are rejected at registration
//! 2. **Batched Validation**: whole-collection validation reports every problem at once
//! 3. **Lock-Free Reads**: cached aggregators and the shard index never block readers

#![warn(missing_docs)]

mod errors;
mod events;
mod lifecycle;
mod options;
mod session;
mod storage;
mod store;
pub mod projections;

pub use errors::{ProjectionError, ProjectionResult};
pub use events::{DomainEvent, EventType, StoredEvent};
pub use lifecycle::ProjectionLifecycle;
pub use options::{
    AsyncOptions, DaemonSettings, EventStoreOptions, StoreOptions, StreamIdentity,
    TeardownAction,
};
pub use projections::{
    Aggregate, AggregateProjection, AggregateSource, AsyncConfiguration, AsyncProjectionShard,
    EventProjection, LiveAggregator, Projection, ProjectionCollection, ProjectionSource,
    ProjectionWrapper, ShardName,
};
pub use session::{
    DocumentOperation, DocumentSession, InMemoryDocumentSession, ProjectionOperations,
};
pub use storage::{
    DocumentMapping, DocumentStorage, DocumentType, InMemoryDocumentStorage, MappingExpression,
};
pub use store::{DocumentStore, InMemoryDocumentStore};
