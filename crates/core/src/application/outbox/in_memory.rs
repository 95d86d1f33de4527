// In-memory outbox store (tests and single-process development)

use crate::domain::{OutboxMetrics, OutboxRecord, OutboxStats, OutboxStatus};
use crate::error::{AppError, Result};
use crate::port::{OutboxRepository, OutboxTransaction, Transaction, TransactionalOutbox};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

type Rows = Arc<Mutex<Vec<OutboxRecord>>>;

fn lock(rows: &Rows) -> MutexGuard<'_, Vec<OutboxRecord>> {
    rows.lock().unwrap_or_else(|e| e.into_inner())
}

fn insert_all(rows: &mut Vec<OutboxRecord>, records: &[OutboxRecord]) -> Result<()> {
    for record in records {
        let duplicate = rows.iter().any(|row| row.id == record.id)
            || records.iter().filter(|r| r.id == record.id).count() > 1;
        if duplicate {
            return Err(AppError::InvalidState(format!(
                "Outbox row {} already exists",
                record.id
            )));
        }
    }
    rows.extend_from_slice(records);
    Ok(())
}

/// Outbox rows kept in insertion order
#[derive(Default, Clone)]
pub struct InMemoryOutboxRepository {
    rows: Rows,
}

impl InMemoryOutboxRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update<T>(&self, id: Uuid, f: impl FnOnce(&mut OutboxRecord) -> T) -> Option<T> {
        let mut rows = lock(&self.rows);
        rows.iter_mut().find(|row| row.id == id).map(f)
    }
}

#[async_trait]
impl OutboxRepository for InMemoryOutboxRepository {
    async fn save(&self, record: &OutboxRecord) -> Result<()> {
        insert_all(&mut lock(&self.rows), std::slice::from_ref(record))
    }

    async fn save_many(&self, records: &[OutboxRecord]) -> Result<()> {
        insert_all(&mut lock(&self.rows), records)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OutboxRecord>> {
        Ok(lock(&self.rows).iter().find(|row| row.id == id).cloned())
    }

    async fn fetch_unpublished(
        &self,
        limit: usize,
        before: DateTime<Utc>,
    ) -> Result<Vec<OutboxRecord>> {
        let mut due: Vec<OutboxRecord> = lock(&self.rows)
            .iter()
            .filter(|row| row.is_due(before))
            .cloned()
            .collect();
        due.sort_by_key(|row| row.created_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn mark_published(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        Ok(self.update(id, |row| row.mark_published(at)).unwrap_or(false))
    }

    async fn mark_failed(&self, id: Uuid, error: &str, at: DateTime<Utc>) -> Result<bool> {
        Ok(self.update(id, |row| row.mark_failed(error, at)).is_some())
    }

    async fn increment_retry(
        &self,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self
            .update(id, |row| row.record_failure(error, now, next_attempt_at))
            .is_some())
    }

    async fn cleanup_published(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut rows = lock(&self.rows);
        let before = rows.len();
        rows.retain(|row| {
            !(row.status == OutboxStatus::Published
                && row.published_at.map_or(false, |at| at < older_than))
        });
        Ok((before - rows.len()) as u64)
    }

    async fn failed_events(&self, limit: usize) -> Result<Vec<OutboxRecord>> {
        let mut failed: Vec<OutboxRecord> = lock(&self.rows)
            .iter()
            .filter(|row| row.status == OutboxStatus::Failed && !row.is_archived())
            .cloned()
            .collect();
        failed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        failed.truncate(limit);
        Ok(failed)
    }

    async fn retry_failed(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        Ok(self.update(id, |row| row.reset_for_retry(now)).unwrap_or(false))
    }

    async fn archive(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        Ok(self.update(id, |row| row.archive(at)).unwrap_or(false))
    }

    async fn stats(&self) -> Result<OutboxStats> {
        let rows = lock(&self.rows);
        let mut stats = OutboxStats::default();
        for row in rows.iter() {
            match row.status {
                OutboxStatus::Pending => stats.pending += 1,
                OutboxStatus::Published => stats.published += 1,
                OutboxStatus::Failed if row.is_archived() => stats.archived += 1,
                OutboxStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn metrics(&self, window_start: DateTime<Utc>) -> Result<OutboxMetrics> {
        let rows = lock(&self.rows);
        let pending: Vec<&OutboxRecord> = rows
            .iter()
            .filter(|row| row.status == OutboxStatus::Pending)
            .collect();
        let latencies: Vec<i64> = rows
            .iter()
            .filter(|row| row.status == OutboxStatus::Published)
            .filter_map(|row| row.published_at.map(|at| (at, row.created_at)))
            .filter(|(published_at, _)| *published_at >= window_start)
            .map(|(published_at, created_at)| (published_at - created_at).num_milliseconds())
            .collect();
        let failed_in_window = rows
            .iter()
            .filter(|row| row.status == OutboxStatus::Failed)
            .filter(|row| row.failed_at.map_or(false, |at| at >= window_start))
            .count();

        let average_latency_ms = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<i64>() as f64 / latencies.len() as f64
        };

        Ok(OutboxMetrics {
            window_start,
            pending: pending.len() as u64,
            published_in_window: latencies.len() as u64,
            failed_in_window: failed_in_window as u64,
            average_latency_ms,
            oldest_pending_at: pending.iter().map(|row| row.created_at).min(),
        })
    }
}

/// Buffers appended rows until commit
pub struct InMemoryOutboxTransaction {
    rows: Rows,
    staged: Vec<OutboxRecord>,
}

#[async_trait]
impl Transaction for InMemoryOutboxTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        insert_all(&mut lock(&self.rows), &self.staged)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl OutboxTransaction for InMemoryOutboxTransaction {
    async fn append(&mut self, record: &OutboxRecord) -> Result<()> {
        self.staged.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl TransactionalOutbox for InMemoryOutboxRepository {
    async fn begin(&self) -> Result<Box<dyn OutboxTransaction>> {
        Ok(Box::new(InMemoryOutboxTransaction {
            rows: Arc::clone(&self.rows),
            staged: Vec::new(),
        }))
    }
}
