// Copyright 2025 Cowboy AI, LLC.

//! Projection sources and the registry that orchestrates them
//!
//! Projections derive read state from events. A [`ProjectionSource`] declares a
//! projection and its lifecycle; the [`ProjectionCollection`] owns every source
//! and hands each executor the view it needs:
//!
//! - the write path gets the ordered inline pipeline,
//! - the query path gets cached [`LiveAggregator`]s,
//! - the async daemon gets the [`AsyncProjectionShard`] index.

mod aggregate;
mod collection;
mod event_projection;
mod live;
mod shard;
mod source;
mod wrapper;

pub use aggregate::{Aggregate, AggregateProjection};
pub use collection::{AsyncConfiguration, ProjectionCollection};
pub use event_projection::EventProjection;
pub use live::LiveAggregator;
pub use shard::{AsyncProjectionShard, ShardName};
pub use source::{AggregateSource, ProjectionSource};
pub use wrapper::ProjectionWrapper;

use crate::errors::ProjectionResult;
use crate::events::StoredEvent;
use crate::session::DocumentSession;
use async_trait::async_trait;

/// An executable projection
#[async_trait]
pub trait Projection: Send + Sync {
    /// Default name used when the projection is registered without one
    fn projection_name(&self) -> String {
        crate::storage::short_type_name(std::any::type_name::<Self>()).to_string()
    }

    /// Apply a batch of events, writing any resulting documents to the session
    async fn apply(
        &self,
        session: &dyn DocumentSession,
        events: &[StoredEvent],
    ) -> ProjectionResult<()>;
}
