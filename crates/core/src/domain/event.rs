// Event Domain Model
//
// Domain events are immutable facts published once through the event bus.
// Integration events additionally carry a serializable payload so they can
// cross the outbox table and be rebuilt by the relay.

use crate::domain::outbox::OutboxRecord;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use uuid::Uuid;

/// Event ID (UUID v4, assigned at construction)
pub type EventId = Uuid;

/// Schema version used when an event type does not declare one
pub const DEFAULT_EVENT_VERSION: &str = "1.0";

/// Metadata shared by every event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: EventId,
    pub event_type: String,
    pub aggregate_id: Option<Uuid>,
    pub aggregate_type: Option<String>,
    pub occurred_at: DateTime<Utc>,
    /// Groups a causally related chain of events
    pub correlation_id: Uuid,
    /// The event that caused this one
    pub causation_id: Option<Uuid>,
    pub version: String,
}

impl EventMetadata {
    /// Fresh metadata: new event id, current time and a new correlation root
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            aggregate_id: None,
            aggregate_type: None,
            occurred_at: Utc::now(),
            correlation_id: Uuid::new_v4(),
            causation_id: None,
            version: DEFAULT_EVENT_VERSION.to_string(),
        }
    }

    pub fn for_aggregate(mut self, aggregate_id: Uuid, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_id = Some(aggregate_id);
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Join the parent's chain: same correlation id, parent as causation
    pub fn caused_by(mut self, parent: &EventMetadata) -> Self {
        self.correlation_id = parent.correlation_id;
        self.causation_id = Some(parent.event_id);
        self
    }
}

/// Upcast helper so `dyn DomainEvent` can be downcast to its concrete type
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A fact about a state change.
///
/// Handlers are routed by the concrete Rust type of the event (exact type
/// match, no hierarchy walking).
pub trait DomainEvent: AsAny + fmt::Debug + Send + Sync {
    fn metadata(&self) -> &EventMetadata;

    fn event_type(&self) -> &str {
        &self.metadata().event_type
    }

    fn event_id(&self) -> EventId {
        self.metadata().event_id
    }
}

/// Downcast a type-erased event to its concrete type
pub fn downcast_event<E: DomainEvent>(event: &dyn DomainEvent) -> Option<&E> {
    AsAny::as_any(event).downcast_ref::<E>()
}

/// Payload of an integration event (the published contract between contexts)
pub trait IntegrationPayload:
    Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static
{
    /// Logical event type name, stored in the outbox `event_type` column
    const EVENT_TYPE: &'static str;

    /// Schema version for backward compatibility
    const VERSION: &'static str = DEFAULT_EVENT_VERSION;
}

/// Integration event: metadata plus a serializable payload
#[derive(Debug, Clone)]
pub struct IntegrationEvent<P> {
    pub metadata: EventMetadata,
    pub payload: P,
}

impl<P: IntegrationPayload> IntegrationEvent<P> {
    pub fn new(aggregate_id: Uuid, aggregate_type: impl Into<String>, payload: P) -> Self {
        let metadata = EventMetadata::new(P::EVENT_TYPE)
            .for_aggregate(aggregate_id, aggregate_type)
            .with_version(P::VERSION);
        Self { metadata, payload }
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.metadata = self.metadata.with_correlation(correlation_id);
        self
    }

    pub fn caused_by(mut self, parent: &dyn DomainEvent) -> Self {
        self.metadata = self.metadata.caused_by(parent.metadata());
        self
    }

    /// Serialize into an outbox row (payload excludes metadata fields)
    pub fn to_record(&self) -> Result<OutboxRecord> {
        let aggregate_id = self.metadata.aggregate_id.ok_or_else(|| {
            AppError::Validation(format!("{} has no aggregate id", P::EVENT_TYPE))
        })?;
        let aggregate_type = self.metadata.aggregate_type.clone().ok_or_else(|| {
            AppError::Validation(format!("{} has no aggregate type", P::EVENT_TYPE))
        })?;
        let payload = serde_json::to_value(&self.payload)?;

        Ok(OutboxRecord::new(
            &self.metadata,
            aggregate_id,
            aggregate_type,
            payload,
        ))
    }

    /// Rebuild the event from an outbox row, restoring its original metadata
    pub fn from_record(record: &OutboxRecord) -> Result<Self> {
        if record.event_type != P::EVENT_TYPE {
            return Err(AppError::Validation(format!(
                "Outbox row {} holds {}, expected {}",
                record.id,
                record.event_type,
                P::EVENT_TYPE
            )));
        }

        let payload: P = serde_json::from_value(record.payload.clone())?;
        let metadata = EventMetadata {
            event_id: record.id,
            event_type: record.event_type.clone(),
            aggregate_id: Some(record.aggregate_id),
            aggregate_type: Some(record.aggregate_type.clone()),
            occurred_at: record.occurred_at,
            correlation_id: record.correlation_id,
            causation_id: record.causation_id,
            version: record.version.clone(),
        };

        Ok(Self { metadata, payload })
    }
}

impl<P: IntegrationPayload> DomainEvent for IntegrationEvent<P> {
    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
