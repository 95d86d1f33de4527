// In-memory job service
//
// Named FIFO queues worked by a fixed pool of tokio tasks, a holding area
// for delayed jobs released by a scheduler loop, and per-job state that
// callers poll. Suitable for development and single-process deployments.

mod executor;
pub(crate) mod runtime;
mod store;

use crate::application::retry::retry_at;
use crate::application::worker::constants::{DRAIN_POLL_INTERVAL, LOOP_JOIN_TIMEOUT};
use crate::application::worker::{shutdown_channel, DelayedJobScheduler, ShutdownSender, Worker};
use crate::config::JobsConfig;
use crate::domain::{JobArgs, JobId, JobInfo, JobResult, JobStatus, RegisteredTask, TaskFn};
use crate::error::Result;
use crate::port::{
    EnqueueOptions, IdProvider, JobService, SystemTimeProvider, TaskOptions, TimeProvider,
    UuidProvider,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use runtime::JobRuntime;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

struct BackgroundLoops {
    shutdown: ShutdownSender,
    handles: Vec<JoinHandle<()>>,
}

/// In-process implementation of [`JobService`]
pub struct InMemoryJobService {
    runtime: Arc<JobRuntime>,
    loops: Mutex<Option<BackgroundLoops>>,
}

impl InMemoryJobService {
    pub fn new(config: JobsConfig) -> Self {
        Self::with_providers(config, Arc::new(SystemTimeProvider), Arc::new(UuidProvider))
    }

    /// Inject clock and id generation (deterministic tests)
    pub fn with_providers(
        config: JobsConfig,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            runtime: Arc::new(JobRuntime::new(config, time_provider, id_provider)),
            loops: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &JobsConfig {
        &self.runtime.config
    }

    /// Start the worker pool and the delayed-job scheduler.
    ///
    /// Must be called from within a tokio runtime. Calling it again while
    /// running is a no-op.
    pub fn initialize(&self) -> Result<()> {
        let mut loops = self.loops.lock().unwrap_or_else(|e| e.into_inner());
        if loops.is_some() {
            return Ok(());
        }

        let (shutdown, _) = shutdown_channel();
        let mut handles = Vec::with_capacity(self.config().max_workers + 1);
        for id in 0..self.config().max_workers {
            let worker = Worker::new(id, Arc::clone(&self.runtime));
            handles.push(tokio::spawn(worker.run(shutdown.token())));
        }
        let scheduler = DelayedJobScheduler::new(Arc::clone(&self.runtime));
        handles.push(tokio::spawn(scheduler.run(shutdown.token())));

        *loops = Some(BackgroundLoops { shutdown, handles });
        self.runtime.set_running(true);

        info!(
            workers = self.config().max_workers,
            default_queue = %self.config().default_queue,
            "Job service initialized"
        );
        Ok(())
    }

    /// Stop the background loops and wait for them to exit.
    ///
    /// Job states stay readable after close; new enqueues are rejected.
    pub async fn close(&self) {
        self.runtime.set_running(false);
        let loops = self
            .loops
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(loops) = loops else {
            return;
        };

        loops.shutdown.shutdown();
        for handle in loops.handles {
            match tokio::time::timeout(LOOP_JOIN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Job loop ended abnormally"),
                Err(_) => warn!("Job loop did not stop in time"),
            }
        }
        info!("Job service closed");
    }

    /// Close the service; with `wait`, first let queued and running jobs
    /// finish (bounded by `shutdown_timeout`). Delayed jobs are not awaited.
    pub async fn shutdown(&self, wait: bool) {
        if wait {
            let deadline = Instant::now() + self.config().shutdown_timeout;
            while !self.runtime.is_drained() {
                if Instant::now() >= deadline {
                    warn!("Shutdown timeout reached with jobs still queued or running");
                    break;
                }
                sleep(DRAIN_POLL_INTERVAL).await;
            }
        }
        self.close().await;
    }

    /// Release due delayed jobs now instead of waiting for the scheduler tick
    pub fn release_due_jobs(&self) -> usize {
        self.runtime.release_due()
    }

    /// Jobs waiting in the delayed holding area
    pub fn scheduled_count(&self) -> usize {
        self.runtime.store().scheduled_len()
    }
}

impl Drop for InMemoryJobService {
    fn drop(&mut self) {
        let loops = self.loops.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(loops) = loops.take() {
            loops.shutdown.shutdown();
        }
    }
}

#[async_trait]
impl JobService for InMemoryJobService {
    fn register_task(&self, name: &str, func: TaskFn, options: TaskOptions) {
        let config = self.config();
        self.runtime.register(RegisteredTask {
            name: name.to_string(),
            func,
            queue: options.queue.unwrap_or_else(|| config.default_queue.clone()),
            max_retries: options.max_retries.unwrap_or(config.default_max_retries),
            timeout: options.timeout.unwrap_or(config.default_timeout),
        });
    }

    async fn enqueue(
        &self,
        task_name: &str,
        args: JobArgs,
        options: EnqueueOptions,
    ) -> Result<JobId> {
        let eta = options
            .delay
            .filter(|delay| !delay.is_zero())
            .map(|delay| retry_at(self.runtime.now(), delay));
        self.runtime
            .enqueue(task_name, args, options.queue.as_deref(), eta)
    }

    async fn enqueue_at(
        &self,
        task_name: &str,
        eta: DateTime<Utc>,
        args: JobArgs,
        queue: Option<&str>,
    ) -> Result<JobId> {
        self.runtime.enqueue(task_name, args, queue, Some(eta))
    }

    /// Waits through RUNNING and RETRY as well as PENDING; only a terminal
    /// status or the deadline ends the poll.
    async fn get_result(&self, job_id: &str, timeout: Option<Duration>) -> JobResult {
        let Some(mut snapshot) = self.runtime.snapshot(job_id) else {
            return JobResult::not_found(job_id);
        };
        let Some(timeout) = timeout else {
            return snapshot;
        };

        let deadline = Instant::now() + timeout;
        let poll = self.config().result_poll_interval;
        while !snapshot.status.is_terminal() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(poll.min(deadline - now)).await;
            match self.runtime.snapshot(job_id) {
                Some(next) => snapshot = next,
                None => return JobResult::not_found(job_id),
            }
        }
        snapshot
    }

    async fn get_status(&self, job_id: &str) -> JobStatus {
        self.runtime
            .store()
            .state(job_id)
            .map_or(JobStatus::Failed, |state| state.status)
    }

    async fn revoke(&self, job_id: &str, terminate: bool) -> bool {
        let now = self.runtime.now();
        let revoked = self.runtime.store().revoke(job_id, now);
        if revoked {
            info!(job_id = %job_id, "Job revoked");
        } else if terminate {
            warn!(job_id = %job_id, "Running jobs cannot be terminated, revoke ignored");
        }
        revoked
    }

    async fn get_queue_length(&self, queue: &str) -> usize {
        self.runtime.store().queue_len(queue)
    }

    async fn purge_queue(&self, queue: &str) -> usize {
        let now = self.runtime.now();
        let purged = self.runtime.store().purge(queue, now);
        info!(queue = %queue, purged, "Queue purged");
        purged
    }

    async fn get_registered_tasks(&self) -> Vec<JobInfo> {
        self.runtime.task_infos()
    }

    async fn health_check(&self) -> bool {
        self.runtime.is_running() && self.config().max_workers > 0
    }
}
