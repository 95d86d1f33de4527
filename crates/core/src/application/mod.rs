// Application Layer - Use Cases and in-process adapters

pub mod event_bus;
pub mod jobs;
pub mod outbox;
pub mod panic_guard;
pub mod retry;
pub mod worker;

// Re-exports
pub use event_bus::InMemoryEventBus;
pub use jobs::InMemoryJobService;
pub use outbox::{
    DeadLetterReport, EventRegistry, InMemoryOutboxRepository, OutboxRelay, RelayStats,
};
pub use retry::{RetryDecision, RetryPolicy};
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken};
