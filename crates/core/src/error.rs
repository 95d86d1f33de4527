// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
///
/// Only programmer-usage errors (unregistered task, use before `initialize`)
/// and infrastructure failures surface here. Handler and job failures are
/// absorbed into counters and job state instead.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("{0} is not initialized")]
    NotInitialized(&'static str),

    #[error("Task not registered: {0}")]
    TaskNotRegistered(String),

    #[error("Queue '{queue}' is full (capacity {capacity})")]
    QueueFull { queue: String, capacity: usize },

    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error conversion is handled in infra-sqlite crate
// by converting to AppError::Database(String)
