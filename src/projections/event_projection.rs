// Copyright 2025 Cowboy AI, LLC.

//! User-authored event projections

use super::source::common_problems;
use super::Projection;
use crate::errors::{ProjectionError, ProjectionResult};
use crate::events::{DomainEvent, EventType, StoredEvent};
use crate::lifecycle::ProjectionLifecycle;
use crate::options::{AsyncOptions, StoreOptions};
use crate::session::{DocumentSession, ProjectionOperations};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::any::TypeId;
use std::sync::Arc;
use tracing::trace;

type HandlerFn =
    dyn Fn(&StoredEvent, &mut ProjectionOperations) -> ProjectionResult<()> + Send + Sync;

#[derive(Clone)]
struct EventHandler {
    event_type: EventType,
    handle: Arc<HandlerFn>,
}

/// A projection authored as a set of per-event handlers
///
/// Handlers queue document changes into [`ProjectionOperations`]; the runtime
/// flushes them to the session once the whole batch has been handled.
///
/// ```rust
/// use cim_projections::{EventProjection, ProjectionLifecycle};
///
/// let projection = EventProjection::new("Orders").with_lifecycle(ProjectionLifecycle::Async);
/// assert_eq!(projection.name(), "Orders");
/// ```
#[derive(Clone)]
pub struct EventProjection {
    name: String,
    lifecycle: ProjectionLifecycle,
    version: u32,
    async_options: AsyncOptions,
    handlers: IndexMap<TypeId, EventHandler>,
}

impl EventProjection {
    /// Create an Inline projection with no handlers
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lifecycle: ProjectionLifecycle::Inline,
            version: 1,
            async_options: AsyncOptions::default(),
            handlers: IndexMap::new(),
        }
    }

    /// Override the lifecycle
    pub fn with_lifecycle(mut self, lifecycle: ProjectionLifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Set the projection version
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Adjust the options handed to the async daemon
    pub fn configure_async(mut self, configure: impl FnOnce(&mut AsyncOptions)) -> Self {
        configure(&mut self.async_options);
        self
    }

    /// Handle events of type `E`; a later handler for the same type replaces the earlier one
    pub fn project<E, F>(mut self, handler: F) -> Self
    where
        E: DomainEvent,
        F: Fn(&E, &StoredEvent, &mut ProjectionOperations) -> ProjectionResult<()>
            + Send
            + Sync
            + 'static,
    {
        let event_type = EventType::of::<E>();
        let handle: Arc<HandlerFn> = Arc::new(
            move |stored: &StoredEvent, operations: &mut ProjectionOperations| {
                match stored.downcast_ref::<E>() {
                    Some(event) => handler(event, stored, operations),
                    None => Ok(()),
                }
            },
        );
        self.handlers
            .insert(event_type.type_id(), EventHandler { event_type, handle });
        self
    }

    /// Declared name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lifecycle
    pub fn lifecycle(&self) -> ProjectionLifecycle {
        self.lifecycle
    }

    /// Version
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Async daemon options
    pub fn async_options(&self) -> &AsyncOptions {
        &self.async_options
    }

    pub(crate) fn set_lifecycle(&mut self, lifecycle: ProjectionLifecycle) {
        self.lifecycle = lifecycle;
    }

    /// Event types with a handler, in registration order
    pub fn event_types(&self) -> Vec<EventType> {
        self.handlers.values().map(|h| h.event_type).collect()
    }

    /// Configuration problems, empty when valid
    pub fn validate(&self, _options: &StoreOptions) -> Vec<String> {
        let mut problems = common_problems(&self.name, self.lifecycle, &self.async_options);

        if self.handlers.is_empty() {
            problems.push(format!(
                "EventProjection '{}' has no registered event handlers",
                self.name
            ));
        }

        if self.lifecycle == ProjectionLifecycle::Live {
            problems.push(format!(
                "EventProjection '{}' cannot use the Live lifecycle; only self-aggregating projections can be live",
                self.name
            ));
        }

        problems
    }

    pub(crate) fn build_runtime(&self) -> EventProjectionRuntime {
        EventProjectionRuntime {
            name: self.name.clone(),
            handlers: Arc::new(self.handlers.clone()),
        }
    }
}

impl std::fmt::Debug for EventProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventProjection")
            .field("name", &self.name)
            .field("lifecycle", &self.lifecycle)
            .field("version", &self.version)
            .field("event_types", &self.event_types())
            .finish()
    }
}

/// Executable form of an [`EventProjection`]
pub(crate) struct EventProjectionRuntime {
    name: String,
    handlers: Arc<IndexMap<TypeId, EventHandler>>,
}

#[async_trait]
impl Projection for EventProjectionRuntime {
    fn projection_name(&self) -> String {
        self.name.clone()
    }

    async fn apply(
        &self,
        session: &dyn DocumentSession,
        events: &[StoredEvent],
    ) -> ProjectionResult<()> {
        let mut operations = ProjectionOperations::new();

        for event in events {
            let Some(handler) = self.handlers.get(&event.payload_type_id()) else {
                continue;
            };

            (handler.handle)(event, &mut operations).map_err(|e| match e {
                ProjectionError::EventHandler { .. } => e,
                other => ProjectionError::EventHandler {
                    projection: self.name.clone(),
                    event_type: handler.event_type.name().to_string(),
                    reason: other.to_string(),
                },
            })?;
        }

        trace!(
            projection = %self.name,
            events = events.len(),
            operations = operations.len(),
            "Applied event projection"
        );

        operations.flush(session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InMemoryDocumentSession;
    use serde::{Deserialize, Serialize};
    use std::any::Any;
    use uuid::Uuid;

    #[derive(Debug)]
    struct OrderPlaced {
        order_id: Uuid,
        total: u64,
    }

    impl DomainEvent for OrderPlaced {
        fn aggregate_id(&self) -> Uuid {
            self.order_id
        }

        fn event_type(&self) -> &'static str {
            "OrderPlaced"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct OrderCancelled {
        order_id: Uuid,
    }

    impl DomainEvent for OrderCancelled {
        fn aggregate_id(&self) -> Uuid {
            self.order_id
        }

        fn event_type(&self) -> &'static str {
            "OrderCancelled"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct OrderLine {
        total: u64,
    }

    fn orders() -> EventProjection {
        EventProjection::new("Orders")
            .project::<OrderPlaced, _>(|event, _, operations| {
                operations.store(event.order_id.to_string(), &OrderLine { total: event.total })
            })
            .project::<OrderCancelled, _>(|event, _, operations| {
                operations.delete::<OrderLine>(event.order_id.to_string());
                Ok(())
            })
    }

    #[test]
    fn projection_without_handlers_is_invalid() {
        let problems = EventProjection::new("Empty").validate(&StoreOptions::default());
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("no registered event handlers"));
    }

    #[test]
    fn live_event_projection_is_invalid() {
        let problems = orders()
            .with_lifecycle(ProjectionLifecycle::Live)
            .validate(&StoreOptions::default());
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("Live"));
    }

    #[test]
    fn event_types_follow_handler_order() {
        let names: Vec<_> = orders().event_types().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["OrderPlaced", "OrderCancelled"]);
    }

    #[tokio::test]
    async fn runtime_applies_handlers_and_flushes() {
        let session = InMemoryDocumentSession::new();
        let kept = Uuid::new_v4();
        let cancelled = Uuid::new_v4();
        let events = vec![
            StoredEvent::new(OrderPlaced { order_id: kept, total: 30 }, 1),
            StoredEvent::new(OrderPlaced { order_id: cancelled, total: 5 }, 1),
            StoredEvent::new(OrderCancelled { order_id: cancelled }, 2),
        ];

        let runtime = orders().build_runtime();
        assert_eq!(runtime.projection_name(), "Orders");
        runtime.apply(&session, &events).await.unwrap();

        assert_eq!(
            session.load_as::<OrderLine>(&kept.to_string()).await.unwrap(),
            Some(OrderLine { total: 30 })
        );
        assert_eq!(
            session.load_as::<OrderLine>(&cancelled.to_string()).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn handler_failures_name_projection_and_event() {
        let failing = EventProjection::new("Failing").project::<OrderPlaced, _>(|_, _, _| {
            Err(ProjectionError::Storage("unavailable".to_string()))
        });
        let events = vec![StoredEvent::new(
            OrderPlaced {
                order_id: Uuid::new_v4(),
                total: 1,
            },
            1,
        )];

        let err = failing
            .build_runtime()
            .apply(&InMemoryDocumentSession::new(), &events)
            .await
            .unwrap_err();

        match err {
            ProjectionError::EventHandler {
                projection,
                event_type,
                ..
            } => {
                assert_eq!(projection, "Failing");
                assert_eq!(event_type, "OrderPlaced");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
