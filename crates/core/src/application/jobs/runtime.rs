// Shared job state used by the service facade and the background loops

use super::executor;
use super::store::JobStore;
use crate::application::retry::{retry_at, RetryDecision, RetryPolicy};
use crate::config::JobsConfig;
use crate::domain::{
    JobArgs, JobId, JobInfo, JobResult, JobState, QueueName, QueuedJob, RegisteredTask,
};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, TimeProvider};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, error, info, warn};

pub(crate) struct JobRuntime {
    pub(crate) config: JobsConfig,
    retry_policy: RetryPolicy,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
    tasks: RwLock<HashMap<String, RegisteredTask>>,
    store: Mutex<JobStore>,
    running: AtomicBool,
}

impl JobRuntime {
    pub fn new(
        config: JobsConfig,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            retry_policy: RetryPolicy::from_config(&config),
            config,
            time_provider,
            id_provider,
            tasks: RwLock::new(HashMap::new()),
            store: Mutex::new(JobStore::default()),
            running: AtomicBool::new(false),
        }
    }

    // Poisoning only means another thread panicked mid-update; the maps
    // themselves stay consistent, so keep serving.
    pub fn store(&self) -> MutexGuard<'_, JobStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.time_provider.now()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn register(&self, task: RegisteredTask) {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        if tasks.contains_key(&task.name) {
            warn!(task = %task.name, "Task re-registered, replacing previous definition");
        }
        info!(
            task = %task.name,
            queue = %task.queue,
            max_retries = task.max_retries,
            timeout_ms = task.timeout.as_millis() as u64,
            "Task registered"
        );
        tasks.insert(task.name.clone(), task);
    }

    pub fn task(&self, name: &str) -> Option<RegisteredTask> {
        self.tasks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn task_infos(&self) -> Vec<JobInfo> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        let mut infos: Vec<JobInfo> = tasks.values().map(RegisteredTask::info).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Admit a job: live queue when due, holding area when `eta` is ahead
    pub fn enqueue(
        &self,
        task_name: &str,
        args: JobArgs,
        queue: Option<&str>,
        eta: Option<DateTime<Utc>>,
    ) -> Result<JobId> {
        if !self.is_running() {
            return Err(AppError::NotInitialized("Job service"));
        }
        let task = self
            .task(task_name)
            .ok_or_else(|| AppError::TaskNotRegistered(task_name.to_string()))?;

        let now = self.now();
        let eta = eta.filter(|eta| *eta > now);
        let job = QueuedJob {
            job_id: self.id_provider.generate_id(),
            task_name: task.name,
            args,
            queue: queue.map(str::to_string).unwrap_or(task.queue),
            eta,
            retries: 0,
            max_retries: task.max_retries,
        };
        let job_id = job.job_id.clone();
        let queue = job.queue.clone();

        let mut store = self.store();
        if eta.is_some() {
            store.hold(job);
        } else {
            store.push(job, self.config.max_queue_size)?;
        }
        store.track(JobState::new(job_id.clone()));
        drop(store);

        info!(
            job_id = %job_id,
            task = %task_name,
            queue = %queue,
            eta = ?eta,
            "Job enqueued"
        );
        Ok(job_id)
    }

    pub fn snapshot(&self, job_id: &str) -> Option<JobResult> {
        self.store().snapshot(job_id)
    }

    pub fn pop(&self, queue: &QueueName) -> Option<QueuedJob> {
        self.store().pop(queue)
    }

    pub fn is_drained(&self) -> bool {
        self.store().is_drained()
    }

    pub fn release_due(&self) -> usize {
        let now = self.now();
        let released = self.store().release_due(now);
        if released > 0 {
            debug!(released, "Released delayed jobs");
        }
        released
    }

    /// Execute a popped job and settle it
    pub async fn process(&self, job: QueuedJob) {
        self.run_job(job).await;
        self.store().settle();
    }

    async fn run_job(&self, job: QueuedJob) {
        let task = self.task(&job.task_name);
        let now = self.now();

        let task = {
            let mut store = self.store();
            let Some(state) = store.state_mut(&job.job_id) else {
                warn!(job_id = %job.job_id, "Dequeued job has no state, dropping");
                return;
            };
            if state.status.is_terminal() {
                debug!(job_id = %job.job_id, status = %state.status, "Skipping settled job");
                return;
            }
            let Some(task) = task else {
                let message = format!("Task '{}' is not registered", job.task_name);
                error!(job_id = %job.job_id, task = %job.task_name, "Task missing at execution");
                let _ = state.fail(job.retries, message, now);
                return;
            };
            if let Err(e) = state.start(now) {
                warn!(job_id = %job.job_id, error = %e, "Job cannot start");
                return;
            }
            task
        };

        info!(
            job_id = %job.job_id,
            task = %job.task_name,
            attempt = job.retries + 1,
            "Job started"
        );

        match executor::execute(&task, job.args.clone()).await {
            Ok(value) => self.complete(&job, value),
            Err(message) => self.handle_failure(job, message),
        }
    }

    fn complete(&self, job: &QueuedJob, value: Value) {
        let now = self.now();
        let mut store = self.store();
        if let Some(state) = store.state_mut(&job.job_id) {
            match state.succeed(value, now) {
                Ok(()) => info!(job_id = %job.job_id, task = %job.task_name, "Job succeeded"),
                Err(e) => warn!(job_id = %job.job_id, error = %e, "Job result discarded"),
            }
        }
    }

    /// Shared failure path for errors, panics and timeouts
    fn handle_failure(&self, mut job: QueuedJob, message: String) {
        let now = self.now();
        let decision = self.retry_policy.decide(job.retries, job.max_retries);

        let mut store = self.store();
        let Some(state) = store.state_mut(&job.job_id) else {
            return;
        };

        match decision {
            RetryDecision::Retry { retries, delay } => {
                if let Err(e) = state.schedule_retry(retries, message.as_str()) {
                    warn!(job_id = %job.job_id, error = %e, "Retry not scheduled");
                    return;
                }
                warn!(
                    job_id = %job.job_id,
                    task = %job.task_name,
                    retries,
                    max_retries = job.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "Job failed, retrying"
                );

                job.retries = retries;
                if delay.is_zero() {
                    job.eta = None;
                    store.requeue(job);
                } else {
                    job.eta = Some(retry_at(now, delay));
                    store.hold(job);
                }
            }
            RetryDecision::Fail { retries } => {
                if let Err(e) = state.fail(retries, message.as_str(), now) {
                    warn!(job_id = %job.job_id, error = %e, "Failure not recorded");
                    return;
                }
                error!(
                    job_id = %job.job_id,
                    task = %job.task_name,
                    retries,
                    error = %message,
                    "Job failed permanently"
                );
            }
        }
    }
}
