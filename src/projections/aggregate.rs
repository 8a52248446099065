// Copyright 2025 Cowboy AI, LLC.

//! Self-aggregating projections
//!
//! An [`AggregateProjection<T>`] folds the events of one stream into a single
//! document of type `T`. The same fold backs three execution paths: the inline
//! and async runtimes persist the result, the [`LiveAggregator`] only returns it.

use super::live::LiveAggregator;
use super::source::{common_problems, AggregateSource};
use super::Projection;
use crate::errors::ProjectionResult;
use crate::events::{DomainEvent, EventType, StoredEvent};
use crate::lifecycle::ProjectionLifecycle;
use crate::options::{AsyncOptions, StoreOptions, StreamIdentity, TeardownAction};
use crate::session::DocumentSession;
use crate::storage::DocumentType;
use crate::store::DocumentStore;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// A document type that is built by folding its own event stream
///
/// The default projection is named after the last path segment of the type,
/// without generic arguments, so `billing::Invoice` and `archive::Invoice`, or
/// `Envelope<Invoice>` and `Envelope<Order>`, share a name. Register all but one
/// of them through [`AggregateProjection::with_name`] to avoid a duplicate name.
///
/// # Examples
///
/// ```rust
/// use cim_projections::{Aggregate, AggregateProjection, DomainEvent};
/// use serde::{Deserialize, Serialize};
/// use std::any::Any;
/// use uuid::Uuid;
///
/// #[derive(Debug)]
/// struct Deposited { account: Uuid, amount: i64 }
///
/// impl DomainEvent for Deposited {
///     fn aggregate_id(&self) -> Uuid { self.account }
///     fn event_type(&self) -> &'static str { "Deposited" }
///     fn as_any(&self) -> &dyn Any { self }
/// }
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// struct Account { balance: i64 }
///
/// impl Aggregate for Account {
///     fn configure(projection: &mut AggregateProjection<Self>) {
///         projection
///             .default_state(Account::default)
///             .apply::<Deposited, _>(|account, e| account.balance += e.amount);
///     }
/// }
///
/// let aggregator = AggregateProjection::<Account>::default_projection().build_live_aggregator();
/// let account = Uuid::new_v4();
/// let events = vec![
///     cim_projections::StoredEvent::new(Deposited { account, amount: 5 }, 1),
///     cim_projections::StoredEvent::new(Deposited { account, amount: 7 }, 2),
/// ];
/// assert_eq!(aggregator.build(&events, None).map(|a| a.balance), Some(12));
/// ```
pub trait Aggregate: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stream identity this aggregate's documents are keyed by
    const STREAM_IDENTITY: StreamIdentity = StreamIdentity::AsGuid;

    /// The document type the aggregate is stored as
    fn document_type() -> DocumentType {
        DocumentType::of::<Self>()
    }

    /// Declare the create, apply and delete handlers of the aggregate
    fn configure(projection: &mut AggregateProjection<Self>);
}

type CreateFn<T> = dyn Fn(&StoredEvent) -> Option<T> + Send + Sync;
type ApplyFn<T> = dyn Fn(&mut T, &StoredEvent) + Send + Sync;
type SeedFn<T> = dyn Fn() -> T + Send + Sync;

struct Handler<F: ?Sized> {
    event_type: EventType,
    handle: Arc<F>,
}

impl<F: ?Sized> Clone for Handler<F> {
    fn clone(&self) -> Self {
        Self {
            event_type: self.event_type,
            handle: Arc::clone(&self.handle),
        }
    }
}

/// The fold shared by every execution path of an aggregate projection
pub(crate) struct AggregateHandlers<T> {
    creators: IndexMap<TypeId, Handler<CreateFn<T>>>,
    appliers: IndexMap<TypeId, Handler<ApplyFn<T>>>,
    deleters: IndexMap<TypeId, EventType>,
    default_state: Option<Arc<SeedFn<T>>>,
}

impl<T> Clone for AggregateHandlers<T> {
    fn clone(&self) -> Self {
        Self {
            creators: self.creators.clone(),
            appliers: self.appliers.clone(),
            deleters: self.deleters.clone(),
            default_state: self.default_state.clone(),
        }
    }
}

impl<T> Default for AggregateHandlers<T> {
    fn default() -> Self {
        Self {
            creators: IndexMap::new(),
            appliers: IndexMap::new(),
            deleters: IndexMap::new(),
            default_state: None,
        }
    }
}

impl<T> AggregateHandlers<T> {
    fn is_empty(&self) -> bool {
        self.creators.is_empty() && self.appliers.is_empty() && self.deleters.is_empty()
    }

    fn handles(&self, event: &StoredEvent) -> bool {
        let id = event.payload_type_id();
        self.creators.contains_key(&id)
            || self.appliers.contains_key(&id)
            || self.deleters.contains_key(&id)
    }

    fn event_types(&self) -> Vec<EventType> {
        let mut types: Vec<EventType> = Vec::new();
        let all = self
            .creators
            .values()
            .map(|h| h.event_type)
            .chain(self.appliers.values().map(|h| h.event_type))
            .chain(self.deleters.values().copied());
        for event_type in all {
            if !types.contains(&event_type) {
                types.push(event_type);
            }
        }
        types
    }

    /// Fold events, in order, onto an optional starting state
    pub(crate) fn fold<'a, I>(&self, events: I, snapshot: Option<T>) -> Option<T>
    where
        I: IntoIterator<Item = &'a StoredEvent>,
    {
        events
            .into_iter()
            .fold(snapshot, |state, event| self.apply_event(state, event))
    }

    fn apply_event(&self, state: Option<T>, event: &StoredEvent) -> Option<T> {
        let id = event.payload_type_id();
        if self.deleters.contains_key(&id) {
            return None;
        }

        let applier = self.appliers.get(&id);
        let mut current = match state {
            Some(current) => current,
            None => {
                if let Some(creator) = self.creators.get(&id) {
                    return (creator.handle)(event);
                }
                match (applier, &self.default_state) {
                    (Some(_), Some(seed)) => seed(),
                    _ => return None,
                }
            }
        };

        if let Some(applier) = applier {
            (applier.handle)(&mut current, event);
        }
        Some(current)
    }
}

/// Projection that aggregates a stream into a `T` document
pub struct AggregateProjection<T> {
    name: String,
    lifecycle: ProjectionLifecycle,
    version: u32,
    async_options: AsyncOptions,
    handlers: AggregateHandlers<T>,
}

impl<T: Aggregate> AggregateProjection<T> {
    /// An Inline projection named after `T` with no handlers
    pub fn new() -> Self {
        Self {
            name: T::document_type().name().to_string(),
            lifecycle: ProjectionLifecycle::Inline,
            version: 1,
            async_options: AsyncOptions::default(),
            handlers: AggregateHandlers::default(),
        }
    }

    /// The projection `T` declares through [`Aggregate::configure`]
    pub fn default_projection() -> Self {
        let mut projection = Self::new();
        T::configure(&mut projection);
        projection
    }

    /// Override the name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
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

    /// Start a new aggregate from an event of type `E`
    pub fn create_with<E, F>(&mut self, create: F) -> &mut Self
    where
        E: DomainEvent,
        F: Fn(&E) -> T + Send + Sync + 'static,
    {
        let event_type = EventType::of::<E>();
        let handle: Arc<CreateFn<T>> =
            Arc::new(move |event: &StoredEvent| event.downcast_ref::<E>().map(&create));
        self.handlers
            .creators
            .insert(event_type.type_id(), Handler { event_type, handle });
        self
    }

    /// Mutate an existing aggregate with an event of type `E`
    pub fn apply<E, F>(&mut self, apply: F) -> &mut Self
    where
        E: DomainEvent,
        F: Fn(&mut T, &E) + Send + Sync + 'static,
    {
        let event_type = EventType::of::<E>();
        let handle: Arc<ApplyFn<T>> = Arc::new(move |state: &mut T, event: &StoredEvent| {
            if let Some(event) = event.downcast_ref::<E>() {
                apply(state, event);
            }
        });
        self.handlers
            .appliers
            .insert(event_type.type_id(), Handler { event_type, handle });
        self
    }

    /// End the aggregate when an event of type `E` arrives
    pub fn delete_on<E: DomainEvent>(&mut self) -> &mut Self {
        let event_type = EventType::of::<E>();
        self.handlers
            .deleters
            .insert(event_type.type_id(), event_type);
        self
    }

    /// Seed a new aggregate when an applied event arrives before any create event
    pub fn default_state<F>(&mut self, seed: F) -> &mut Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.handlers.default_state = Some(Arc::new(seed));
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

    pub(crate) fn set_lifecycle(&mut self, lifecycle: ProjectionLifecycle) {
        self.lifecycle = lifecycle;
    }

    /// Build the stateless on-demand fold for `T`
    pub fn build_live_aggregator(&self) -> LiveAggregator<T> {
        LiveAggregator::new(self.name.clone(), Arc::new(self.handlers.clone()))
    }

    fn problems(&self, options: &StoreOptions) -> Vec<String> {
        let aggregate = T::document_type();
        let mut problems = common_problems(&self.name, self.lifecycle, &self.async_options);

        if self.handlers.is_empty() {
            problems.push(format!(
                "AggregateProjection for {aggregate} has no event handlers; declare create, apply or delete handlers in Aggregate::configure"
            ));
        } else if !self.handlers.appliers.is_empty()
            && self.handlers.creators.is_empty()
            && self.handlers.default_state.is_none()
        {
            problems.push(format!(
                "AggregateProjection for {aggregate} applies events but has no way to create a new {aggregate}; add a create handler or a default state"
            ));
        }

        if T::STREAM_IDENTITY != options.events.stream_identity {
            problems.push(format!(
                "AggregateProjection for {aggregate} expects stream identity {:?} but the event store uses {:?}",
                T::STREAM_IDENTITY,
                options.events.stream_identity
            ));
        }

        problems
    }
}

impl<T: Aggregate> Default for AggregateProjection<T> {
    fn default() -> Self {
        Self::default_projection()
    }
}

impl<T> fmt::Debug for AggregateProjection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateProjection")
            .field("name", &self.name)
            .field("lifecycle", &self.lifecycle)
            .field("version", &self.version)
            .field("event_types", &self.handlers.event_types())
            .finish()
    }
}

impl<T: Aggregate> AggregateSource for AggregateProjection<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> ProjectionLifecycle {
        self.lifecycle
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn aggregate_type(&self) -> DocumentType {
        T::document_type()
    }

    fn async_options(&self) -> &AsyncOptions {
        &self.async_options
    }

    fn event_types(&self) -> Vec<EventType> {
        self.handlers.event_types()
    }

    fn teardown_actions(&self) -> Vec<TeardownAction> {
        let mut actions = vec![TeardownAction::DeleteDocuments(T::document_type())];
        for action in &self.async_options.teardown {
            if !actions.contains(action) {
                actions.push(*action);
            }
        }
        actions
    }

    fn validate(&self, options: &StoreOptions) -> Vec<String> {
        self.problems(options)
    }

    fn build(&self, store: &dyn DocumentStore) -> ProjectionResult<Arc<dyn Projection>> {
        Ok(Arc::new(AggregationRuntime {
            name: self.name.clone(),
            document_type: T::document_type(),
            stream_identity: store.options().events.stream_identity,
            handlers: Arc::new(self.handlers.clone()),
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Inline/async executable form of an [`AggregateProjection<T>`]
struct AggregationRuntime<T> {
    name: String,
    document_type: DocumentType,
    stream_identity: StreamIdentity,
    handlers: Arc<AggregateHandlers<T>>,
}

impl<T> AggregationRuntime<T> {
    fn document_id(&self, event: &StoredEvent) -> String {
        match (self.stream_identity, &event.stream_key) {
            (StreamIdentity::AsString, Some(key)) => key.clone(),
            _ => event.stream_id.to_string(),
        }
    }
}

#[async_trait]
impl<T: Aggregate> Projection for AggregationRuntime<T> {
    fn projection_name(&self) -> String {
        self.name.clone()
    }

    async fn apply(
        &self,
        session: &dyn DocumentSession,
        events: &[StoredEvent],
    ) -> ProjectionResult<()> {
        let mut streams: IndexMap<String, Vec<&StoredEvent>> = IndexMap::new();
        for event in events.iter().filter(|e| self.handlers.handles(e)) {
            streams
                .entry(self.document_id(event))
                .or_default()
                .push(event);
        }

        for (id, stream) in streams {
            let snapshot = session
                .load(&self.document_type, &id)
                .await?
                .map(serde_json::from_value::<T>)
                .transpose()?;

            match self.handlers.fold(stream, snapshot) {
                Some(aggregate) => {
                    let document = serde_json::to_value(&aggregate)?;
                    session.store(&self.document_type, &id, document).await?;
                }
                None => session.delete(&self.document_type, &id).await?,
            }
        }

        trace!(
            projection = %self.name,
            document_type = %self.document_type,
            events = events.len(),
            "Applied aggregate projection"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InMemoryDocumentSession;
    use crate::store::InMemoryDocumentStore;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use uuid::Uuid;

    #[derive(Debug)]
    struct Opened {
        id: Uuid,
        owner: String,
    }

    #[derive(Debug)]
    struct Deposited {
        id: Uuid,
        amount: i64,
    }

    #[derive(Debug)]
    struct Closed {
        id: Uuid,
    }

    macro_rules! domain_event {
        ($name:ident) => {
            impl DomainEvent for $name {
                fn aggregate_id(&self) -> Uuid {
                    self.id
                }

                fn event_type(&self) -> &'static str {
                    stringify!($name)
                }

                fn as_any(&self) -> &dyn Any {
                    self
                }
            }
        };
    }

    domain_event!(Opened);
    domain_event!(Deposited);
    domain_event!(Closed);

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Account {
        owner: String,
        balance: i64,
    }

    impl Aggregate for Account {
        fn configure(projection: &mut AggregateProjection<Self>) {
            projection
                .create_with::<Opened, _>(|e| Account {
                    owner: e.owner.clone(),
                    balance: 0,
                })
                .apply::<Deposited, _>(|account, e| account.balance += e.amount)
                .delete_on::<Closed>();
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Tagged;

    impl Aggregate for Tagged {
        const STREAM_IDENTITY: StreamIdentity = StreamIdentity::AsString;

        fn configure(projection: &mut AggregateProjection<Self>) {
            projection.delete_on::<Closed>();
        }
    }

    fn stream(id: Uuid) -> Vec<StoredEvent> {
        vec![
            StoredEvent::new(
                Opened {
                    id,
                    owner: "ada".to_string(),
                },
                1,
            ),
            StoredEvent::new(Deposited { id, amount: 10 }, 2),
            StoredEvent::new(Deposited { id, amount: 5 }, 3),
        ]
    }

    #[test]
    fn default_projection_is_named_after_the_aggregate() {
        let projection = AggregateProjection::<Account>::default_projection();
        assert_eq!(projection.name(), "Account");
        assert_eq!(projection.lifecycle(), ProjectionLifecycle::Inline);
        assert_eq!(
            AggregateSource::event_types(&projection)
                .iter()
                .map(|t| t.name())
                .collect::<Vec<_>>(),
            vec!["Opened", "Deposited", "Closed"]
        );
    }

    #[test]
    fn fold_creates_applies_and_deletes() {
        let id = Uuid::new_v4();
        let handlers = AggregateProjection::<Account>::default_projection().handlers;

        let mut events = stream(id);
        assert_eq!(
            handlers.fold(&events, None),
            Some(Account {
                owner: "ada".to_string(),
                balance: 15
            })
        );

        events.push(StoredEvent::new(Closed { id }, 4));
        assert_eq!(handlers.fold(&events, None), None);
    }

    #[test]
    fn apply_without_state_or_seed_leaves_nothing() {
        let id = Uuid::new_v4();
        let handlers = AggregateProjection::<Account>::default_projection().handlers;
        let events = vec![StoredEvent::new(Deposited { id, amount: 3 }, 1)];
        assert_eq!(handlers.fold(&events, None), None);
    }

    #[test]
    fn default_state_seeds_the_first_applied_event() {
        let id = Uuid::new_v4();
        let mut projection = AggregateProjection::<Account>::new();
        projection
            .default_state(|| Account {
                owner: "seed".to_string(),
                balance: 100,
            })
            .apply::<Deposited, _>(|account, e| account.balance += e.amount);

        let events = vec![StoredEvent::new(Deposited { id, amount: 1 }, 1)];
        assert_eq!(
            projection.handlers.fold(&events, None).map(|a| a.balance),
            Some(101)
        );
    }

    #[test]
    fn applier_without_creator_is_invalid() {
        let mut projection = AggregateProjection::<Account>::new();
        projection.apply::<Deposited, _>(|account, e| account.balance += e.amount);

        let problems = AggregateSource::validate(&projection, &StoreOptions::default());
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("no way to create"));
    }

    #[test]
    fn empty_projection_is_invalid() {
        let problems =
            AggregateSource::validate(&AggregateProjection::<Account>::new(), &StoreOptions::default());
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("no event handlers"));
    }

    #[test]
    fn stream_identity_mismatch_is_reported() {
        let projection = AggregateProjection::<Tagged>::default_projection();
        let problems = AggregateSource::validate(&projection, &StoreOptions::default());
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("stream identity"));
    }

    #[test]
    fn teardown_always_deletes_aggregated_documents_first() {
        let projection = AggregateProjection::<Account>::default_projection()
            .configure_async(|options| {
                options.reset_progress_on_teardown();
            });
        assert_eq!(
            projection.teardown_actions(),
            vec![
                TeardownAction::DeleteDocuments(DocumentType::of::<Account>()),
                TeardownAction::ResetProgress
            ]
        );
    }

    #[tokio::test]
    async fn runtime_persists_one_document_per_stream() {
        let store = InMemoryDocumentStore::default();
        let session = InMemoryDocumentSession::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let mut events = stream(first);
        events.extend(stream(second));
        events.push(StoredEvent::new(Closed { id: second }, 4));

        let runtime = AggregateProjection::<Account>::default_projection()
            .build(&store)
            .unwrap();
        assert_eq!(runtime.projection_name(), "Account");
        runtime.apply(&session, &events).await.unwrap();

        assert_eq!(
            session
                .load_as::<Account>(&first.to_string())
                .await
                .unwrap()
                .map(|a| a.balance),
            Some(15)
        );
        assert_eq!(
            session.load_as::<Account>(&second.to_string()).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn runtime_continues_from_the_stored_document() {
        let store = InMemoryDocumentStore::default();
        let session = InMemoryDocumentSession::new();
        let id = Uuid::new_v4();
        let runtime = AggregateProjection::<Account>::default_projection()
            .build(&store)
            .unwrap();

        runtime.apply(&session, &stream(id)).await.unwrap();
        runtime
            .apply(&session, &[StoredEvent::new(Deposited { id, amount: 20 }, 4)])
            .await
            .unwrap();

        assert_eq!(
            session
                .load_as::<Account>(&id.to_string())
                .await
                .unwrap()
                .map(|a| a.balance),
            Some(35)
        );
    }
}
