// In-memory job storage: live FIFO queues, delayed holding area, job states

use crate::domain::{JobId, JobResult, JobState, QueueName, QueuedJob};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};

#[derive(Default)]
pub(crate) struct JobStore {
    /// Live queues, created lazily, iterated in name order
    queues: BTreeMap<QueueName, VecDeque<QueuedJob>>,
    /// Delayed jobs waiting for their eta
    scheduled: Vec<QueuedJob>,
    states: HashMap<JobId, JobState>,
    /// Jobs popped by a worker and not yet settled
    in_flight: usize,
}

impl JobStore {
    /// Admit a new job onto its live queue, bounded by `capacity`
    pub fn push(&mut self, job: QueuedJob, capacity: usize) -> Result<()> {
        let queue = self.queues.entry(job.queue.clone()).or_default();
        if queue.len() >= capacity {
            return Err(AppError::QueueFull {
                queue: job.queue,
                capacity,
            });
        }
        queue.push_back(job);
        Ok(())
    }

    /// Put an already admitted job back on its queue (no capacity check)
    pub fn requeue(&mut self, job: QueuedJob) {
        self.queues.entry(job.queue.clone()).or_default().push_back(job);
    }

    pub fn hold(&mut self, job: QueuedJob) {
        self.scheduled.push(job);
    }

    pub fn track(&mut self, state: JobState) {
        self.states.insert(state.job_id.clone(), state);
    }

    pub fn state(&self, job_id: &str) -> Option<&JobState> {
        self.states.get(job_id)
    }

    pub fn state_mut(&mut self, job_id: &str) -> Option<&mut JobState> {
        self.states.get_mut(job_id)
    }

    pub fn snapshot(&self, job_id: &str) -> Option<JobResult> {
        self.states.get(job_id).map(JobState::snapshot)
    }

    pub fn queue_names(&self) -> Vec<QueueName> {
        self.queues.keys().cloned().collect()
    }

    /// Non-blocking pop; the job counts as in flight until `settle`
    pub fn pop(&mut self, queue: &str) -> Option<QueuedJob> {
        let job = self.queues.get_mut(queue)?.pop_front()?;
        self.in_flight += 1;
        Some(job)
    }

    pub fn settle(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Move due delayed jobs onto their queues, returning how many moved
    pub fn release_due(&mut self, now: DateTime<Utc>) -> usize {
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.scheduled.drain(..).partition(|job| job.is_due(now));
        self.scheduled = waiting;

        let released = due.len();
        for mut job in due {
            job.eta = None;
            self.requeue(job);
        }
        released
    }

    pub fn queue_len(&self, queue: &str) -> usize {
        self.queues.get(queue).map_or(0, VecDeque::len)
    }

    pub fn scheduled_len(&self) -> usize {
        self.scheduled.len()
    }

    /// Drain a live queue; every drained job becomes REVOKED
    pub fn purge(&mut self, queue: &str, now: DateTime<Utc>) -> usize {
        let drained: Vec<QueuedJob> = match self.queues.get_mut(queue) {
            Some(jobs) => jobs.drain(..).collect(),
            None => return 0,
        };
        for job in &drained {
            if let Some(state) = self.states.get_mut(&job.job_id) {
                let _ = state.purge(now);
            }
        }
        drained.len()
    }

    /// Revoke a PENDING job, removing it from the holding area and its queue
    pub fn revoke(&mut self, job_id: &str, now: DateTime<Utc>) -> bool {
        let Some(state) = self.states.get_mut(job_id) else {
            return false;
        };
        if state.revoke(now).is_err() {
            return false;
        }

        self.scheduled.retain(|job| job.job_id != job_id);
        for jobs in self.queues.values_mut() {
            jobs.retain(|job| job.job_id != job_id);
        }
        true
    }

    /// No live or in-flight work (delayed jobs are not counted)
    pub fn is_drained(&self) -> bool {
        self.in_flight == 0 && self.queues.values().all(VecDeque::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobArgs, JobStatus};
    use chrono::Duration;

    fn job(id: &str, queue: &str, eta: Option<DateTime<Utc>>) -> QueuedJob {
        QueuedJob {
            job_id: id.to_string(),
            task_name: "noop".to_string(),
            args: JobArgs::new(),
            queue: queue.to_string(),
            eta,
            retries: 0,
            max_retries: 3,
        }
    }

    fn admit(store: &mut JobStore, job: QueuedJob) {
        store.track(JobState::new(job.job_id.clone()));
        store.push(job, 10).unwrap();
    }

    #[test]
    fn test_fifo_per_queue() {
        let mut store = JobStore::default();
        admit(&mut store, job("a", "default", None));
        admit(&mut store, job("b", "default", None));

        assert_eq!(store.pop("default").unwrap().job_id, "a");
        assert_eq!(store.pop("default").unwrap().job_id, "b");
        assert!(store.pop("default").is_none());
        assert!(store.pop("missing").is_none());
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut store = JobStore::default();
        store.push(job("a", "small", None), 1).unwrap();

        let err = store.push(job("b", "small", None), 1).unwrap_err();
        assert!(matches!(err, AppError::QueueFull { capacity: 1, .. }));
    }

    #[test]
    fn test_release_only_due_jobs() {
        let now = Utc::now();
        let mut store = JobStore::default();
        store.hold(job("soon", "default", Some(now - Duration::seconds(1))));
        store.hold(job("later", "default", Some(now + Duration::seconds(60))));

        assert_eq!(store.release_due(now), 1);
        assert_eq!(store.queue_len("default"), 1);
        assert_eq!(store.scheduled_len(), 1);
        assert!(store.pop("default").unwrap().eta.is_none());
    }

    #[test]
    fn test_revoke_removes_pending_job_everywhere() {
        let now = Utc::now();
        let mut store = JobStore::default();
        admit(&mut store, job("live", "default", None));
        store.track(JobState::new("delayed"));
        store.hold(job("delayed", "default", Some(now + Duration::seconds(60))));

        assert!(store.revoke("live", now));
        assert!(store.revoke("delayed", now));
        assert!(!store.revoke("unknown", now));
        assert_eq!(store.queue_len("default"), 0);
        assert_eq!(store.scheduled_len(), 0);
        assert_eq!(store.state("live").unwrap().status, JobStatus::Revoked);
    }

    #[test]
    fn test_purge_revokes_drained_jobs() {
        let now = Utc::now();
        let mut store = JobStore::default();
        admit(&mut store, job("a", "emails", None));
        admit(&mut store, job("b", "emails", None));

        assert_eq!(store.purge("emails", now), 2);
        assert_eq!(store.purge("unknown", now), 0);
        assert_eq!(store.state("b").unwrap().status, JobStatus::Revoked);
    }

    #[test]
    fn test_in_flight_blocks_drained() {
        let mut store = JobStore::default();
        admit(&mut store, job("a", "default", None));
        assert!(!store.is_drained());

        let _job = store.pop("default").unwrap();
        assert!(!store.is_drained());

        store.settle();
        assert!(store.is_drained());
    }
}
