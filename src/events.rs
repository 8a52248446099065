// Copyright 2025 Cowboy AI, LLC.

//! Domain events as seen by projections
//!
//! Events are immutable facts. Projections receive them wrapped in a
//! [`StoredEvent`] that carries the stream position assigned by the event store.

use chrono::{DateTime, Utc};
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

/// Base trait for all domain events
///
/// # Examples
///
/// ```rust
/// use cim_projections::DomainEvent;
/// use std::any::Any;
/// use uuid::Uuid;
///
/// #[derive(Debug)]
/// struct InvoiceIssued {
///     invoice_id: Uuid,
///     amount: u64,
/// }
///
/// impl DomainEvent for InvoiceIssued {
///     fn aggregate_id(&self) -> Uuid {
///         self.invoice_id
///     }
///
///     fn event_type(&self) -> &'static str {
///         "InvoiceIssued"
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
///
/// let event = InvoiceIssued { invoice_id: Uuid::new_v4(), amount: 100 };
/// assert_eq!(event.event_type(), "InvoiceIssued");
/// ```
pub trait DomainEvent: Any + Send + Sync + fmt::Debug {
    /// Get the aggregate ID this event relates to
    fn aggregate_id(&self) -> Uuid;

    /// Get the event type name
    fn event_type(&self) -> &'static str;

    /// Get the schema version
    fn version(&self) -> &'static str {
        "v1"
    }

    /// Get the event as Any for downcasting
    fn as_any(&self) -> &dyn Any;
}

/// Type identity of an event, used to key handlers and shard filters
#[derive(Clone, Copy)]
pub struct EventType {
    id: TypeId,
    name: &'static str,
}

impl EventType {
    /// Identity of the event type `E`
    pub fn of<E: DomainEvent>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: crate::storage::short_type_name(std::any::type_name::<E>()),
        }
    }

    /// The underlying type id
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Short type name, e.g. `InvoiceIssued`
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventType {}

impl Hash for EventType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventType({})", self.name)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// An event together with its position in the event store
#[derive(Debug, Clone)]
pub struct StoredEvent {
    /// Unique identifier of this event
    pub event_id: Uuid,
    /// Stream the event belongs to
    pub stream_id: Uuid,
    /// String key of the stream when the store uses string identities
    pub stream_key: Option<String>,
    /// Version of the stream after this event
    pub version: u64,
    /// Global sequence number across all streams
    pub sequence: u64,
    /// When the event was appended
    pub timestamp: DateTime<Utc>,
    /// The event payload
    pub data: Arc<dyn DomainEvent>,
}

impl StoredEvent {
    /// Wrap an event appended to its aggregate's stream at `version`
    pub fn new<E: DomainEvent>(event: E, version: u64) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            stream_id: event.aggregate_id(),
            stream_key: None,
            version,
            sequence: 0,
            timestamp: Utc::now(),
            data: Arc::new(event),
        }
    }

    /// Set the global sequence number
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Set the string stream key
    pub fn with_stream_key(mut self, key: impl Into<String>) -> Self {
        self.stream_key = Some(key.into());
        self
    }

    /// Event type name reported by the payload
    pub fn event_type(&self) -> &'static str {
        self.data.event_type()
    }

    /// Type id of the concrete payload
    pub fn payload_type_id(&self) -> TypeId {
        Any::type_id(self.data.as_any())
    }

    /// Whether the payload is of the given event type
    pub fn is(&self, event_type: &EventType) -> bool {
        self.payload_type_id() == event_type.type_id()
    }

    /// Borrow the payload as a concrete event type
    pub fn downcast_ref<E: DomainEvent>(&self) -> Option<&E> {
        self.data.as_any().downcast_ref::<E>()
    }
}
