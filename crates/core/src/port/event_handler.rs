// Event Handler Port

use crate::domain::DomainEvent;
use crate::error::AppError;
use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by an event handler.
///
/// The bus logs and counts it; it never reaches the publisher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<AppError> for HandlerError {
    fn from(err: AppError) -> Self {
        Self(err.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Reacts to one concrete event type.
///
/// Handlers must be idempotent: outbox delivery is at-least-once.
#[async_trait]
pub trait EventHandler<E: DomainEvent>: Send + Sync + 'static {
    async fn handle(&self, event: &E) -> Result<(), HandlerError>;

    /// Name used in logs and spans
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
