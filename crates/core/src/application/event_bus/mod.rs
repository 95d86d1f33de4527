// In-memory event bus
//
// Routes each published event to the handlers subscribed to its exact type.
// Handlers of one event run concurrently and are isolated from each other:
// an error or panic is logged and counted, never propagated to the publisher.

mod registry;

use crate::application::panic_guard::catch_panic;
use crate::config::EventBusConfig;
use crate::domain::{AsAny, DomainEvent};
use crate::error::{AppError, Result};
use crate::port::{EventHandler, EventPublisher};
use async_trait::async_trait;
use futures::future::join_all;
use registry::{handler_identity, HandlerRegistry};
use std::any::TypeId;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, info_span, Instrument};

/// In-process implementation of [`EventPublisher`]
pub struct InMemoryEventBus {
    config: EventBusConfig,
    registry: RwLock<HandlerRegistry>,
    published: AtomicU64,
    errors: AtomicU64,
    initialized: AtomicBool,
    closed: AtomicBool,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

impl InMemoryEventBus {
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            config,
            registry: RwLock::new(HandlerRegistry::default()),
            published: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HandlerRegistry> {
        self.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HandlerRegistry> {
        self.registry.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Reset handlers and counters and accept publishes
    pub fn initialize(&self) {
        self.write().clear();
        self.reset_stats();
        self.closed.store(false, Ordering::SeqCst);
        self.initialized.store(true, Ordering::SeqCst);
        info!("Event bus initialized");
    }

    /// Drop every subscription; publishes still count but reach nobody
    pub fn close(&self) {
        self.write().clear();
        self.closed.store(true, Ordering::SeqCst);
        info!(
            published = self.published_count(),
            errors = self.error_count(),
            "Event bus closed"
        );
    }

    /// Subscribe `handler` to events of type `E`. Subscribing the same
    /// handler (same `Arc` allocation) twice keeps a single entry.
    pub fn subscribe<E, H>(&self, handler: Arc<H>)
    where
        E: DomainEvent,
        H: EventHandler<E> + ?Sized,
    {
        let name = handler.name().to_string();
        if self.write().subscribe::<E, H>(handler) {
            debug!(
                handler = %name,
                event = std::any::type_name::<E>(),
                "Handler subscribed"
            );
        }
    }

    /// Remove `handler` from events of type `E`; no-op when absent
    pub fn unsubscribe<E, H>(&self, handler: &Arc<H>)
    where
        E: DomainEvent,
        H: EventHandler<E> + ?Sized,
    {
        if self.write().unsubscribe::<E>(handler_identity(handler)) {
            debug!(
                handler = handler.name(),
                event = std::any::type_name::<E>(),
                "Handler unsubscribed"
            );
        }
    }

    /// Number of handlers for events of type `E`
    pub fn handlers_for<E: DomainEvent>(&self) -> usize {
        self.read().count_for(TypeId::of::<E>())
    }

    /// Total subscriptions across all event types
    pub fn handler_count(&self) -> usize {
        self.read().total()
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::SeqCst)
    }

    pub fn reset_stats(&self) {
        self.published.store(0, Ordering::SeqCst);
        self.errors.store(0, Ordering::SeqCst);
    }

    pub fn clear_handlers(&self) {
        self.write().clear();
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::NotInitialized("Event bus"))
        }
    }

    async fn dispatch(&self, event: Arc<dyn DomainEvent>) {
        self.published.fetch_add(1, Ordering::SeqCst);

        // Exact concrete type, not the Arc wrapping it
        let type_id = AsAny::as_any(event.as_ref()).type_id();
        let handlers = self.read().handlers_for(type_id);
        if handlers.is_empty() {
            debug!(event_type = %event.event_type(), "No handlers for event");
            return;
        }
        if self.config.trace_dispatch {
            debug!(
                event_type = %event.event_type(),
                event_id = %event.event_id(),
                handlers = handlers.len(),
                "Dispatching event"
            );
        }

        let runs = handlers.iter().map(|handler| {
            let span = info_span!("event_handler", handler = %handler.name());
            let event = event.as_ref();
            async move {
                match catch_panic(handler.call(event)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        self.errors.fetch_add(1, Ordering::SeqCst);
                        error!(
                            handler = %handler.name(),
                            event_type = %event.event_type(),
                            event_id = %event.event_id(),
                            error = %e,
                            "Event handler failed"
                        );
                    }
                    Err(panic) => {
                        self.errors.fetch_add(1, Ordering::SeqCst);
                        error!(
                            handler = %handler.name(),
                            event_type = %event.event_type(),
                            event_id = %event.event_id(),
                            panic = %panic,
                            "Event handler panicked"
                        );
                    }
                }
            }
            .instrument(span)
        });
        join_all(runs).await;
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: Arc<dyn DomainEvent>) -> Result<()> {
        self.ensure_initialized()?;
        let metadata = event.metadata();
        let span = info_span!(
            "publish",
            event_type = %metadata.event_type,
            event_id = %metadata.event_id,
            correlation_id = %metadata.correlation_id,
        );
        self.dispatch(event).instrument(span).await;
        Ok(())
    }

    async fn publish_many(&self, events: Vec<Arc<dyn DomainEvent>>) -> Result<()> {
        self.ensure_initialized()?;
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }

    fn health_check(&self) -> bool {
        self.initialized.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }
}
