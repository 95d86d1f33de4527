// Outbox - event registry, in-memory store and relay

mod in_memory;
mod registry;
mod relay;

pub use in_memory::{InMemoryOutboxRepository, InMemoryOutboxTransaction};
pub use registry::EventRegistry;
pub use relay::{DeadLetterReport, OutboxRelay, RelayStats};
