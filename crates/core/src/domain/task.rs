// Task Domain Model - registered executable functions

use crate::domain::job::{JobArgs, JobInfo, QueueName, TaskError};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one task execution
pub type TaskResult = std::result::Result<Value, TaskError>;

type BlockingFn = dyn Fn(JobArgs) -> TaskResult + Send + Sync;
type AsyncFn = dyn Fn(JobArgs) -> BoxFuture<'static, TaskResult> + Send + Sync;

/// Executable task function
///
/// Blocking functions run on the blocking thread pool, async functions as
/// spawned tokio tasks.
#[derive(Clone)]
pub enum TaskFn {
    Blocking(Arc<BlockingFn>),
    Async(Arc<AsyncFn>),
}

impl TaskFn {
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn(JobArgs) -> TaskResult + Send + Sync + 'static,
    {
        TaskFn::Blocking(Arc::new(f))
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(JobArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        TaskFn::Async(Arc::new(move |args| f(args).boxed()))
    }
}

impl fmt::Debug for TaskFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFn::Blocking(_) => write!(f, "TaskFn::Blocking"),
            TaskFn::Async(_) => write!(f, "TaskFn::Async"),
        }
    }
}

/// Task entry in the registry
#[derive(Debug, Clone)]
pub struct RegisteredTask {
    pub name: String,
    pub func: TaskFn,
    pub queue: QueueName,
    pub max_retries: u32,
    pub timeout: Duration,
}

impl RegisteredTask {
    pub fn info(&self) -> JobInfo {
        JobInfo {
            name: self.name.clone(),
            queue: self.queue.clone(),
            max_retries: self.max_retries,
            timeout_secs: self.timeout.as_secs(),
        }
    }
}
