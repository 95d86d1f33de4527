// Job Service Port (Interface)

use crate::domain::{JobArgs, JobId, JobInfo, JobResult, JobStatus, TaskFn};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Per-task settings; unset fields fall back to the service defaults
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    pub queue: Option<String>,
    pub max_retries: Option<u32>,
    pub timeout: Option<Duration>,
}

impl TaskOptions {
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Per-call enqueue settings
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Overrides the task's queue
    pub queue: Option<String>,
    /// Hold the job for this long before it becomes runnable
    pub delay: Option<Duration>,
}

impl EnqueueOptions {
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Background job service interface
#[async_trait]
pub trait JobService: Send + Sync {
    /// Register (or replace) a task. The last registration wins.
    fn register_task(&self, name: &str, func: TaskFn, options: TaskOptions);

    async fn enqueue(&self, task_name: &str, args: JobArgs, options: EnqueueOptions)
        -> Result<JobId>;

    async fn enqueue_at(
        &self,
        task_name: &str,
        eta: DateTime<Utc>,
        args: JobArgs,
        queue: Option<&str>,
    ) -> Result<JobId>;

    /// Snapshot of a job. Unknown ids yield a FAILED result with error
    /// "Job not found".
    ///
    /// With a timeout, keeps polling until the job is terminal (SUCCESS,
    /// FAILED or REVOKED) or the timeout elapses. RUNNING and RETRY do not
    /// end the wait, so a job that is retrying is awaited through its next
    /// attempts.
    async fn get_result(&self, job_id: &str, timeout: Option<Duration>) -> JobResult;

    /// Unknown ids report FAILED
    async fn get_status(&self, job_id: &str) -> JobStatus;

    /// Cancel a PENDING job; false for any other status or unknown id
    async fn revoke(&self, job_id: &str, terminate: bool) -> bool;

    async fn get_queue_length(&self, queue: &str) -> usize;

    /// Drop every waiting job of a queue, returning how many were dropped
    async fn purge_queue(&self, queue: &str) -> usize;

    async fn get_registered_tasks(&self) -> Vec<JobInfo>;

    async fn health_check(&self) -> bool;
}
