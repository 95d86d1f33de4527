// Port Layer - Interfaces for external dependencies

pub mod event_handler;
pub mod event_publisher;
pub mod id_provider; // For deterministic testing
pub mod job_service;
pub mod outbox_repository;
pub mod time_provider;
pub mod transaction;

// Re-exports
pub use event_handler::{EventHandler, HandlerError};
pub use event_publisher::EventPublisher;
pub use id_provider::{IdProvider, UuidProvider};
pub use job_service::{EnqueueOptions, JobService, TaskOptions};
pub use outbox_repository::OutboxRepository;
pub use time_provider::{SystemTimeProvider, TimeProvider};
pub use transaction::{OutboxTransaction, Transaction, TransactionalOutbox};
