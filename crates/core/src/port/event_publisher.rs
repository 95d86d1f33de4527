// Event Publisher Port

use crate::domain::DomainEvent;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Publishing side of the event bus (what the outbox relay depends on)
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Dispatch one event to every handler of its exact type.
    ///
    /// Handler failures are absorbed; `Err` means the event could not be
    /// dispatched at all.
    async fn publish(&self, event: Arc<dyn DomainEvent>) -> Result<()>;

    /// Publish in order, each event fully dispatched before the next
    async fn publish_many(&self, events: Vec<Arc<dyn DomainEvent>>) -> Result<()>;

    fn health_check(&self) -> bool;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Records published events; can be switched to fail every publish
    #[derive(Default)]
    pub struct RecordingPublisher {
        events: Mutex<Vec<Arc<dyn DomainEvent>>>,
        failing: AtomicBool,
    }

    impl RecordingPublisher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn published(&self) -> Vec<Arc<dyn DomainEvent>> {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        }

        pub fn published_types(&self) -> Vec<String> {
            self.published()
                .iter()
                .map(|e| e.event_type().to_string())
                .collect()
        }
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, event: Arc<dyn DomainEvent>) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(AppError::Internal("publisher unavailable".to_string()));
            }
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(event);
            Ok(())
        }

        async fn publish_many(&self, events: Vec<Arc<dyn DomainEvent>>) -> Result<()> {
            for event in events {
                self.publish(event).await?;
            }
            Ok(())
        }

        fn health_check(&self) -> bool {
            !self.failing.load(Ordering::SeqCst)
        }
    }
}
