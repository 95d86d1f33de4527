// Domain Error Types

use crate::domain::job::{JobId, JobStatus};
use thiserror::Error;

/// Rejected job lifecycle change
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidStateTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}

pub type Result<T> = std::result::Result<T, DomainError>;
