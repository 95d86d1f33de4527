// Job Domain Model

use crate::domain::error::{DomainError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Job ID (UUID v4 string)
pub type JobId = String;

/// Queue name
pub type QueueName = String;

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
    Revoked,
    Retry,
}

impl JobStatus {
    /// Terminal jobs never change status again
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed | JobStatus::Revoked)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Success => write!(f, "success"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Revoked => write!(f, "revoked"),
            JobStatus::Retry => write!(f, "retry"),
        }
    }
}

/// Error raised by a task function
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TaskError(String);

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        Self(format!("Invalid task arguments: {}", err))
    }
}

/// Positional and keyword arguments passed to a task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobArgs {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl JobArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Typed positional argument
    pub fn positional<T: DeserializeOwned>(&self, index: usize) -> std::result::Result<T, TaskError> {
        let value = self
            .args
            .get(index)
            .ok_or_else(|| TaskError::new(format!("Missing positional argument {}", index)))?;
        Ok(T::deserialize(value)?)
    }

    /// Typed keyword argument
    pub fn keyword<T: DeserializeOwned>(&self, name: &str) -> std::result::Result<T, TaskError> {
        let value = self
            .kwargs
            .get(name)
            .ok_or_else(|| TaskError::new(format!("Missing keyword argument '{}'", name)))?;
        Ok(T::deserialize(value)?)
    }
}

/// A job waiting in a queue or in the scheduled holding area
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job_id: JobId,
    pub task_name: String,
    pub args: JobArgs,
    pub queue: QueueName,
    /// Earliest execution time, set only for delayed jobs
    pub eta: Option<DateTime<Utc>>,
    pub retries: u32,
    pub max_retries: u32,
}

impl QueuedJob {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.eta.map_or(true, |eta| eta <= now)
    }
}

/// Observable state of a job
#[derive(Debug, Clone)]
pub struct JobState {
    pub job_id: JobId,
    pub status: JobStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retries: u32,
}

impl JobState {
    pub fn new(job_id: impl Into<JobId>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Pending,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
            retries: 0,
        }
    }

    fn transition_error(&self, to: JobStatus) -> DomainError {
        DomainError::InvalidStateTransition {
            job_id: self.job_id.clone(),
            from: self.status,
            to,
        }
    }

    /// PENDING or RETRY -> RUNNING
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !matches!(self.status, JobStatus::Pending | JobStatus::Retry) {
            return Err(self.transition_error(JobStatus::Running));
        }
        self.status = JobStatus::Running;
        self.started_at = Some(now);
        Ok(())
    }

    /// RUNNING -> SUCCESS
    pub fn succeed(&mut self, result: Value, now: DateTime<Utc>) -> Result<()> {
        if self.status != JobStatus::Running {
            return Err(self.transition_error(JobStatus::Success));
        }
        self.status = JobStatus::Success;
        self.result = Some(result);
        self.completed_at = Some(now);
        Ok(())
    }

    /// RUNNING -> RETRY
    pub fn schedule_retry(&mut self, retries: u32, error: impl Into<String>) -> Result<()> {
        if self.status != JobStatus::Running {
            return Err(self.transition_error(JobStatus::Retry));
        }
        self.status = JobStatus::Retry;
        self.retries = retries;
        self.error = Some(error.into());
        Ok(())
    }

    /// Any non-terminal status -> FAILED
    pub fn fail(&mut self, retries: u32, error: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.transition_error(JobStatus::Failed));
        }
        self.status = JobStatus::Failed;
        self.retries = retries;
        self.error = Some(error.into());
        self.completed_at = Some(now);
        Ok(())
    }

    /// PENDING -> REVOKED
    pub fn revoke(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != JobStatus::Pending {
            return Err(self.transition_error(JobStatus::Revoked));
        }
        self.status = JobStatus::Revoked;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Waiting job (PENDING or RETRY) dropped by a queue purge -> REVOKED
    pub fn purge(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !matches!(self.status, JobStatus::Pending | JobStatus::Retry) {
            return Err(self.transition_error(JobStatus::Revoked));
        }
        self.status = JobStatus::Revoked;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn snapshot(&self) -> JobResult {
        JobResult {
            job_id: self.job_id.clone(),
            status: self.status,
            result: self.result.clone(),
            error: self.error.clone(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            retries: self.retries,
        }
    }
}

/// Snapshot of a job returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub status: JobStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retries: u32,
}

impl JobResult {
    /// Unknown job ids are reported as FAILED
    pub fn not_found(job_id: impl Into<JobId>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Failed,
            result: None,
            error: Some("Job not found".to_string()),
            started_at: None,
            completed_at: None,
            retries: 0,
        }
    }
}

/// Registered task listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub name: String,
    pub queue: QueueName,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Success.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Revoked.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Retry.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Retry).unwrap();
        assert_eq!(json, "\"retry\"");
    }

    #[test]
    fn test_typed_arguments() {
        let args = JobArgs::new().arg(21).kwarg("email", "a@example.com");

        assert_eq!(args.positional::<i64>(0).unwrap(), 21);
        assert_eq!(args.keyword::<String>("email").unwrap(), "a@example.com");
        assert!(args.positional::<i64>(1).is_err());
        assert!(args.keyword::<i64>("email").is_err());
    }

    #[test]
    fn test_retry_cycle_transitions() {
        let now = Utc::now();
        let mut state = JobState::new("job-1");

        state.start(now).unwrap();
        state.schedule_retry(1, "boom").unwrap();
        assert_eq!(state.status, JobStatus::Retry);

        state.start(now).unwrap();
        state.fail(2, "boom", now).unwrap();
        assert_eq!(state.status, JobStatus::Failed);
        assert_eq!(state.retries, 2);
        assert!(state.completed_at.is_some());
    }

    #[test]
    fn test_revoke_only_from_pending() {
        let now = Utc::now();
        let mut running = JobState::new("job-2");
        running.start(now).unwrap();

        let err = running.revoke(now).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidStateTransition {
                job_id: "job-2".to_string(),
                from: JobStatus::Running,
                to: JobStatus::Revoked,
            }
        );
        assert_eq!(err.to_string(), "Job job-2 cannot move from running to revoked");
        assert_eq!(running.status, JobStatus::Running);

        let mut pending = JobState::new("job-3");
        pending.revoke(now).unwrap();
        assert_eq!(pending.status, JobStatus::Revoked);
        assert!(pending.start(now).is_err());
    }

    #[test]
    fn test_not_found_result_is_failed() {
        let result = JobResult::not_found("missing");
        assert_eq!(result.status, JobStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("Job not found"));
    }
}
