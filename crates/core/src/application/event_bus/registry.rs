// Subscription registry: event type -> ordered, de-duplicated handlers

use crate::domain::{downcast_event, DomainEvent};
use crate::port::{EventHandler, HandlerError};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Type-erased handler stored in the registry
pub(crate) trait ErasedHandler: Send + Sync {
    /// Identity of the underlying handler allocation
    fn identity(&self) -> usize;

    fn name(&self) -> &str;

    fn call<'a>(&'a self, event: &'a dyn DomainEvent) -> BoxFuture<'a, Result<(), HandlerError>>;
}

struct TypedHandler<E, H: ?Sized> {
    handler: Arc<H>,
    _event: PhantomData<fn(&E)>,
}

impl<E, H> ErasedHandler for TypedHandler<E, H>
where
    E: DomainEvent,
    H: EventHandler<E> + ?Sized,
{
    fn identity(&self) -> usize {
        handler_identity(&self.handler)
    }

    fn name(&self) -> &str {
        self.handler.name()
    }

    fn call<'a>(&'a self, event: &'a dyn DomainEvent) -> BoxFuture<'a, Result<(), HandlerError>> {
        match downcast_event::<E>(event) {
            Some(event) => self.handler.handle(event),
            None => {
                let err = HandlerError::new(format!(
                    "{} received a {} event",
                    self.name(),
                    event.event_type()
                ));
                async move { Err(err) }.boxed()
            }
        }
    }
}

pub(crate) fn handler_identity<H: ?Sized>(handler: &Arc<H>) -> usize {
    Arc::as_ptr(handler) as *const () as usize
}

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    handlers: HashMap<TypeId, Vec<Arc<dyn ErasedHandler>>>,
}

impl HandlerRegistry {
    /// Returns false when the handler was already subscribed
    pub fn subscribe<E, H>(&mut self, handler: Arc<H>) -> bool
    where
        E: DomainEvent,
        H: EventHandler<E> + ?Sized,
    {
        let identity = handler_identity(&handler);
        let entries = self.handlers.entry(TypeId::of::<E>()).or_default();
        if entries.iter().any(|h| h.identity() == identity) {
            return false;
        }
        entries.push(Arc::new(TypedHandler::<E, H> {
            handler,
            _event: PhantomData,
        }));
        true
    }

    /// Returns false when the handler was not subscribed
    pub fn unsubscribe<E: DomainEvent>(&mut self, identity: usize) -> bool {
        let type_id = TypeId::of::<E>();
        let Some(entries) = self.handlers.get_mut(&type_id) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|h| h.identity() != identity);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.handlers.remove(&type_id);
        }
        removed
    }

    /// Snapshot of the handlers for an exact event type
    pub fn handlers_for(&self, type_id: TypeId) -> Vec<Arc<dyn ErasedHandler>> {
        self.handlers.get(&type_id).cloned().unwrap_or_default()
    }

    pub fn count_for(&self, type_id: TypeId) -> usize {
        self.handlers.get(&type_id).map_or(0, Vec::len)
    }

    pub fn total(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}
