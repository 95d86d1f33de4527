// Worker - Job execution and delayed-job release loops

pub mod constants;
mod shutdown;

pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::jobs::runtime::JobRuntime;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// Worker sweeps every live queue round-robin, one job per queue per sweep
pub(crate) struct Worker {
    id: usize,
    runtime: Arc<JobRuntime>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(id: usize, runtime: Arc<JobRuntime>) -> Self {
        let poll_interval = runtime.config.worker_poll_interval;
        Self {
            id,
            runtime,
            poll_interval,
        }
    }

    /// Run worker loop with graceful shutdown support
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(worker_id = self.id, "Job worker started");
        loop {
            // Check for shutdown signal
            if shutdown.is_shutdown() {
                break;
            }
            if !self.sweep().await {
                // Every queue empty, sleep briefly (or wait for shutdown)
                tokio::select! {
                    _ = sleep(self.poll_interval) => {},
                    _ = shutdown.wait() => {
                        debug!(worker_id = self.id, "Worker interrupted during idle");
                        break;
                    }
                }
            }
        }
        info!(worker_id = self.id, "Job worker stopped");
    }

    /// One pass over all queues (returns true if any job was processed)
    async fn sweep(&self) -> bool {
        let mut processed = false;
        let queues = self.runtime.store().queue_names();
        for queue in queues {
            if let Some(job) = self.runtime.pop(&queue) {
                self.runtime.process(job).await;
                processed = true;
            }
        }
        processed
    }
}

/// Moves delayed jobs whose eta has passed onto their live queues
pub(crate) struct DelayedJobScheduler {
    runtime: Arc<JobRuntime>,
    interval: Duration,
}

impl DelayedJobScheduler {
    pub fn new(runtime: Arc<JobRuntime>) -> Self {
        let interval = runtime.config.scheduler_interval;
        Self { runtime, interval }
    }

    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Job scheduler started");
        loop {
            tokio::select! {
                _ = sleep(self.interval) => {
                    self.runtime.release_due();
                },
                _ = shutdown.wait() => break,
            }
        }
        info!("Job scheduler stopped");
    }
}
