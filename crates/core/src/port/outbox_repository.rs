// Outbox Repository Port (Interface)

use crate::domain::{OutboxMetrics, OutboxRecord, OutboxStats};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persistence interface for outbox rows
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Insert a new row
    async fn save(&self, record: &OutboxRecord) -> Result<()>;

    /// Insert several rows atomically
    async fn save_many(&self, records: &[OutboxRecord]) -> Result<()>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OutboxRecord>>;

    /// PENDING rows with `scheduled_at <= before`, oldest `created_at` first
    async fn fetch_unpublished(&self, limit: usize, before: DateTime<Utc>)
        -> Result<Vec<OutboxRecord>>;

    /// PENDING -> PUBLISHED; false when the row is missing or not pending
    async fn mark_published(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    /// Move a row to the dead-letter status
    async fn mark_failed(&self, id: Uuid, error: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Count a failed relay attempt made at `now` and reschedule it, or
    /// dead-letter the row once `retry_count + 1 >= max_retries`
    async fn increment_retry(
        &self,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Delete PUBLISHED rows published before `older_than`
    async fn cleanup_published(&self, older_than: DateTime<Utc>) -> Result<u64>;

    /// Unarchived dead letters, newest first
    async fn failed_events(&self, limit: usize) -> Result<Vec<OutboxRecord>>;

    /// Dead letter (archived or not) -> PENDING with `retry_count = 0`
    async fn retry_failed(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool>;

    /// Flag a dead letter as archived; false unless it is an unarchived dead letter
    async fn archive(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    async fn stats(&self) -> Result<OutboxStats>;

    /// Queue depth, oldest pending row, and publish/dead-letter activity since
    /// `window_start`
    async fn metrics(&self, window_start: DateTime<Utc>) -> Result<OutboxMetrics>;
}
