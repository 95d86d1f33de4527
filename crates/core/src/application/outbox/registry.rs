// Event registry: rebuilds typed events from stored outbox rows

use crate::domain::{DomainEvent, IntegrationEvent, IntegrationPayload, OutboxRecord};
use crate::error::{AppError, Result};
use std::collections::HashMap;
use std::sync::Arc;

type Decoder = Arc<dyn Fn(&OutboxRecord) -> Result<Arc<dyn DomainEvent>> + Send + Sync>;

/// Maps an `event_type` name to the decoder for its payload type
#[derive(Clone, Default)]
pub struct EventRegistry {
    decoders: HashMap<String, Decoder>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `IntegrationEvent<P>` under `P::EVENT_TYPE`
    pub fn register<P: IntegrationPayload>(&mut self) -> &mut Self {
        self.register_decoder(P::EVENT_TYPE, |record| {
            let event = IntegrationEvent::<P>::from_record(record)?;
            Ok(Arc::new(event) as Arc<dyn DomainEvent>)
        })
    }

    /// Register a custom decoder (last registration wins)
    pub fn register_decoder<F>(&mut self, event_type: impl Into<String>, decoder: F) -> &mut Self
    where
        F: Fn(&OutboxRecord) -> Result<Arc<dyn DomainEvent>> + Send + Sync + 'static,
    {
        self.decoders.insert(event_type.into(), Arc::new(decoder));
        self
    }

    pub fn is_registered(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.decoders.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn decode(&self, record: &OutboxRecord) -> Result<Arc<dyn DomainEvent>> {
        let decoder = self
            .decoders
            .get(&record.event_type)
            .ok_or_else(|| AppError::UnknownEventType(record.event_type.clone()))?;
        decoder(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::downcast_event;
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct FileUploaded {
        file_id: Uuid,
        size: u64,
    }

    impl IntegrationPayload for FileUploaded {
        const EVENT_TYPE: &'static str = "FileUploaded";
    }

    #[test]
    fn test_decode_registered_type() {
        let mut registry = EventRegistry::new();
        registry.register::<FileUploaded>();

        let event = IntegrationEvent::new(
            Uuid::new_v4(),
            "File",
            FileUploaded {
                file_id: Uuid::new_v4(),
                size: 512,
            },
        );
        let record = event.to_record().unwrap();

        let decoded = registry.decode(&record).unwrap();
        let typed = downcast_event::<IntegrationEvent<FileUploaded>>(decoded.as_ref()).unwrap();
        assert_eq!(typed.payload.size, 512);
        assert_eq!(typed.metadata.event_id, event.metadata.event_id);
        assert_eq!(registry.event_types(), vec!["FileUploaded".to_string()]);
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        let registry = EventRegistry::new();
        let event = IntegrationEvent::new(
            Uuid::new_v4(),
            "File",
            FileUploaded {
                file_id: Uuid::new_v4(),
                size: 1,
            },
        );

        let err = registry.decode(&event.to_record().unwrap()).unwrap_err();
        assert!(matches!(err, AppError::UnknownEventType(t) if t == "FileUploaded"));
    }
}
