// Domain Layer - Pure business logic and entities

pub mod error;
pub mod event;
pub mod job;
pub mod outbox;
pub mod task;

// Re-exports
pub use error::DomainError;
pub use event::{
    downcast_event, AsAny, DomainEvent, EventId, EventMetadata, IntegrationEvent,
    IntegrationPayload,
};
pub use job::{
    JobArgs, JobId, JobInfo, JobResult, JobState, JobStatus, QueueName, QueuedJob, TaskError,
};
pub use outbox::{
    is_transient_error, DeadLetterAction, OutboxMetrics, OutboxRecord, OutboxStats, OutboxStatus,
    DEFAULT_OUTBOX_MAX_RETRIES,
};
pub use task::{RegisteredTask, TaskFn, TaskResult};
