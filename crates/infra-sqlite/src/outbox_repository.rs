// SQLite OutboxRepository Implementation

use crate::error::{corrupt, map_sqlx_error};
use crate::SqliteOutboxTransaction;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use modulith_core::domain::{OutboxMetrics, OutboxRecord, OutboxStats, OutboxStatus};
use modulith_core::error::Result;
use modulith_core::port::{OutboxRepository, OutboxTransaction, TransactionalOutbox};
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

const SELECT_OUTBOX: &str = r#"
    SELECT id, aggregate_id, aggregate_type, event_type, version,
           correlation_id, causation_id, payload, status,
           retry_count, max_retries,
           created_at, occurred_at, published_at, scheduled_at, last_error,
           failed_at, archived_at
    FROM outbox_events
"#;

/// Raw `outbox_events` row; timestamps are epoch milliseconds
#[derive(Debug, sqlx::FromRow)]
struct OutboxRow {
    id: String,
    aggregate_id: String,
    aggregate_type: String,
    event_type: String,
    version: String,
    correlation_id: String,
    causation_id: Option<String>,
    payload: String,
    status: String,
    retry_count: i64,
    max_retries: i64,
    created_at: i64,
    occurred_at: i64,
    published_at: Option<i64>,
    scheduled_at: i64,
    last_error: Option<String>,
    failed_at: Option<i64>,
    archived_at: Option<i64>,
}

impl OutboxRow {
    fn into_record(self) -> Result<OutboxRecord> {
        Ok(OutboxRecord {
            id: parse_uuid("id", &self.id)?,
            aggregate_id: parse_uuid("aggregate_id", &self.aggregate_id)?,
            aggregate_type: self.aggregate_type,
            event_type: self.event_type,
            version: self.version,
            correlation_id: parse_uuid("correlation_id", &self.correlation_id)?,
            causation_id: self
                .causation_id
                .as_deref()
                .map(|raw| parse_uuid("causation_id", raw))
                .transpose()?,
            payload: serde_json::from_str(&self.payload)?,
            status: self
                .status
                .parse::<OutboxStatus>()
                .map_err(|e| corrupt("status", e))?,
            retry_count: to_u32("retry_count", self.retry_count)?,
            max_retries: to_u32("max_retries", self.max_retries)?,
            created_at: from_millis("created_at", self.created_at)?,
            occurred_at: from_millis("occurred_at", self.occurred_at)?,
            published_at: self
                .published_at
                .map(|ms| from_millis("published_at", ms))
                .transpose()?,
            scheduled_at: from_millis("scheduled_at", self.scheduled_at)?,
            last_error: self.last_error,
            failed_at: self
                .failed_at
                .map(|ms| from_millis("failed_at", ms))
                .transpose()?,
            archived_at: self
                .archived_at
                .map(|ms| from_millis("archived_at", ms))
                .transpose()?,
        })
    }
}

fn parse_uuid(column: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| corrupt(column, e))
}

fn to_u32(column: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|e| corrupt(column, e))
}

fn from_millis(column: &str, ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| corrupt(column, ms))
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// INSERT one row on any executor (pool, connection or open transaction)
pub(crate) async fn insert_record<'e, E>(executor: E, record: &OutboxRecord) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO outbox_events (
            id, aggregate_id, aggregate_type, event_type, version,
            correlation_id, causation_id, payload, status,
            retry_count, max_retries,
            created_at, occurred_at, published_at, scheduled_at, last_error,
            failed_at, archived_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id.to_string())
    .bind(record.aggregate_id.to_string())
    .bind(&record.aggregate_type)
    .bind(&record.event_type)
    .bind(&record.version)
    .bind(record.correlation_id.to_string())
    .bind(record.causation_id.map(|id| id.to_string()))
    .bind(record.payload.to_string())
    .bind(record.status.as_str())
    .bind(i64::from(record.retry_count))
    .bind(i64::from(record.max_retries))
    .bind(to_millis(record.created_at))
    .bind(to_millis(record.occurred_at))
    .bind(record.published_at.map(to_millis))
    .bind(to_millis(record.scheduled_at))
    .bind(&record.last_error)
    .bind(record.failed_at.map(to_millis))
    .bind(record.archived_at.map(to_millis))
    .execute(executor)
    .await
    .map_err(map_sqlx_error)?;

    Ok(())
}

async fn fetch_record<'e, E>(executor: E, id: Uuid) -> Result<Option<OutboxRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: Option<OutboxRow> = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_OUTBOX))
        .bind(id.to_string())
        .fetch_optional(executor)
        .await
        .map_err(map_sqlx_error)?;

    row.map(OutboxRow::into_record).transpose()
}

fn into_records(rows: Vec<OutboxRow>) -> Result<Vec<OutboxRecord>> {
    rows.into_iter().map(OutboxRow::into_record).collect()
}

/// Outbox table in a SQLite database
#[derive(Clone)]
pub struct SqliteOutboxRepository {
    pool: SqlitePool,
}

impl SqliteOutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a transaction that domain writes can share with outbox appends
    pub async fn begin_transaction(&self) -> Result<SqliteOutboxTransaction<'static>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(SqliteOutboxTransaction::new(tx))
    }
}

#[async_trait]
impl OutboxRepository for SqliteOutboxRepository {
    async fn save(&self, record: &OutboxRecord) -> Result<()> {
        insert_record(&self.pool, record).await
    }

    async fn save_many(&self, records: &[OutboxRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        for record in records {
            insert_record(&mut *tx, record).await?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OutboxRecord>> {
        fetch_record(&self.pool, id).await
    }

    async fn fetch_unpublished(
        &self,
        limit: usize,
        before: DateTime<Utc>,
    ) -> Result<Vec<OutboxRecord>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(&format!(
            "{} WHERE status = ? AND scheduled_at <= ? ORDER BY created_at ASC, rowid ASC LIMIT ?",
            SELECT_OUTBOX
        ))
        .bind(OutboxStatus::Pending.as_str())
        .bind(to_millis(before))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        into_records(rows)
    }

    async fn mark_published(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE outbox_events SET status = ?, published_at = ? WHERE id = ? AND status = ?",
        )
        .bind(OutboxStatus::Published.as_str())
        .bind(to_millis(at))
        .bind(id.to_string())
        .bind(OutboxStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(&self, id: Uuid, error: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE outbox_events SET status = ?, last_error = ?, failed_at = ? WHERE id = ?",
        )
        .bind(OutboxStatus::Failed.as_str())
        .bind(error)
        .bind(to_millis(at))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    /// Read-modify-write in one transaction so the dead-letter rule stays in
    /// `OutboxRecord::record_failure`.
    async fn increment_retry(
        &self,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let Some(mut record) = fetch_record(&mut *tx, id).await? else {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Ok(false);
        };
        let status = record.record_failure(error, now, next_attempt_at);

        sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = ?, retry_count = ?, scheduled_at = ?, last_error = ?, failed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(i64::from(record.retry_count))
        .bind(to_millis(record.scheduled_at))
        .bind(&record.last_error)
        .bind(record.failed_at.map(to_millis))
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(event_id = %id, status = %status, retry_count = record.retry_count, "Outbox retry recorded");
        Ok(true)
    }

    async fn cleanup_published(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM outbox_events WHERE status = ? AND published_at < ?")
                .bind(OutboxStatus::Published.as_str())
                .bind(to_millis(older_than))
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn failed_events(&self, limit: usize) -> Result<Vec<OutboxRecord>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(&format!(
            "{} WHERE status = ? AND archived_at IS NULL ORDER BY created_at DESC, rowid DESC LIMIT ?",
            SELECT_OUTBOX
        ))
        .bind(OutboxStatus::Failed.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        into_records(rows)
    }

    async fn retry_failed(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = ?, retry_count = 0, scheduled_at = ?, failed_at = NULL, archived_at = NULL
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(OutboxStatus::Pending.as_str())
        .bind(to_millis(now))
        .bind(id.to_string())
        .bind(OutboxStatus::Failed.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn archive(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE outbox_events SET archived_at = ? WHERE id = ? AND status = ? AND archived_at IS NULL",
        )
        .bind(to_millis(at))
        .bind(id.to_string())
        .bind(OutboxStatus::Failed.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn stats(&self) -> Result<OutboxStats> {
        let counts: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT status, archived_at IS NOT NULL, COUNT(*)
            FROM outbox_events
            GROUP BY status, archived_at IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut stats = OutboxStats::default();
        for (status, archived, count) in counts {
            let count = u64::try_from(count).unwrap_or(0);
            match status.parse::<OutboxStatus>().map_err(|e| corrupt("status", e))? {
                OutboxStatus::Pending => stats.pending += count,
                OutboxStatus::Published => stats.published += count,
                OutboxStatus::Failed if archived != 0 => stats.archived += count,
                OutboxStatus::Failed => stats.failed += count,
            }
        }
        Ok(stats)
    }

    async fn metrics(&self, window_start: DateTime<Utc>) -> Result<OutboxMetrics> {
        let since = to_millis(window_start);
        let (pending, oldest_pending): (i64, Option<i64>) = sqlx::query_as(
            "SELECT COUNT(*), MIN(created_at) FROM outbox_events WHERE status = ?",
        )
        .bind(OutboxStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let (published, average_latency_ms): (i64, Option<f64>) = sqlx::query_as(
            r#"
            SELECT COUNT(*), AVG(published_at - created_at)
            FROM outbox_events
            WHERE status = ? AND published_at >= ?
            "#,
        )
        .bind(OutboxStatus::Published.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let failed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM outbox_events WHERE status = ? AND failed_at >= ?",
        )
        .bind(OutboxStatus::Failed.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(OutboxMetrics {
            window_start,
            pending: u64::try_from(pending).unwrap_or(0),
            published_in_window: u64::try_from(published).unwrap_or(0),
            failed_in_window: u64::try_from(failed).unwrap_or(0),
            average_latency_ms: average_latency_ms.unwrap_or(0.0),
            oldest_pending_at: oldest_pending
                .map(|ms| from_millis("created_at", ms))
                .transpose()?,
        })
    }
}

#[async_trait]
impl TransactionalOutbox for SqliteOutboxRepository {
    async fn begin(&self) -> Result<Box<dyn OutboxTransaction>> {
        Ok(Box::new(self.begin_transaction().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_test_db;
    use chrono::Duration;
    use modulith_core::domain::EventMetadata;

    fn record(event_type: &str) -> OutboxRecord {
        let metadata = EventMetadata::new(event_type);
        OutboxRecord::new(
            &metadata,
            Uuid::new_v4(),
            "User",
            serde_json::json!({"email": "a@example.com"}),
        )
    }

    #[tokio::test]
    async fn test_save_and_find_by_id() {
        let (_dir, pool) = setup_test_db().await;
        let repo = SqliteOutboxRepository::new(pool);
        let mut row = record("UserCreated");
        row.causation_id = Some(Uuid::new_v4());

        repo.save(&row).await.unwrap();

        let found = repo.find_by_id(row.id).await.unwrap().unwrap();
        assert_eq!(found.id, row.id);
        assert_eq!(found.aggregate_id, row.aggregate_id);
        assert_eq!(found.correlation_id, row.correlation_id);
        assert_eq!(found.causation_id, row.causation_id);
        assert_eq!(found.payload, row.payload);
        assert_eq!(found.status, OutboxStatus::Pending);
        assert_eq!(found.created_at.timestamp_millis(), row.created_at.timestamp_millis());
        assert!(repo.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let (_dir, pool) = setup_test_db().await;
        let repo = SqliteOutboxRepository::new(pool);
        let row = record("UserCreated");

        repo.save(&row).await.unwrap();
        let err = repo.save(&row).await.unwrap_err();
        assert!(err.to_string().contains("Unique constraint"));
    }

    #[tokio::test]
    async fn test_save_many_is_atomic() {
        let (_dir, pool) = setup_test_db().await;
        let repo = SqliteOutboxRepository::new(pool);
        let first = record("A");
        let second = record("B");

        // Second copy of `first` violates the primary key
        assert!(repo
            .save_many(&[first.clone(), second, first])
            .await
            .is_err());
        assert_eq!(repo.stats().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_fetch_orders_by_created_at_and_respects_schedule() {
        let (_dir, pool) = setup_test_db().await;
        let repo = SqliteOutboxRepository::new(pool);
        let now = Utc::now();

        let mut late = record("Late");
        late.created_at = now - Duration::seconds(10);
        let mut early = record("Early");
        early.created_at = now - Duration::seconds(20);
        let mut backoff = record("Backoff");
        backoff.scheduled_at = now + Duration::seconds(60);
        repo.save_many(&[late, early, backoff]).await.unwrap();

        let due = repo.fetch_unpublished(10, Utc::now()).await.unwrap();
        let types: Vec<&str> = due.iter().map(|r| r.event_type.as_str()).collect();
        assert_eq!(types, vec!["Early", "Late"]);
        assert_eq!(repo.fetch_unpublished(1, Utc::now()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_published_only_once() {
        let (_dir, pool) = setup_test_db().await;
        let repo = SqliteOutboxRepository::new(pool);
        let row = record("UserCreated");
        repo.save(&row).await.unwrap();

        assert!(repo.mark_published(row.id, Utc::now()).await.unwrap());
        assert!(!repo.mark_published(row.id, Utc::now()).await.unwrap());
        assert!(repo.fetch_unpublished(10, Utc::now()).await.unwrap().is_empty());

        let stored = repo.find_by_id(row.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::Published);
        assert!(stored.published_at.is_some());
    }

    #[tokio::test]
    async fn test_increment_retry_reschedules_then_dead_letters() {
        let (_dir, pool) = setup_test_db().await;
        let repo = SqliteOutboxRepository::new(pool);
        let row = record("UserCreated").with_max_retries(2);
        repo.save(&row).await.unwrap();
        let next = Utc::now() + Duration::seconds(60);

        assert!(repo
            .increment_retry(row.id, "broker down", Utc::now(), next)
            .await
            .unwrap());
        let stored = repo.find_by_id(row.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::Pending);
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.last_error.as_deref(), Some("broker down"));
        assert_eq!(stored.scheduled_at.timestamp_millis(), next.timestamp_millis());
        assert!(repo.fetch_unpublished(10, Utc::now()).await.unwrap().is_empty());

        let dead_at = Utc::now();
        repo.increment_retry(row.id, "still down", dead_at, next)
            .await
            .unwrap();
        let stored = repo.find_by_id(row.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::Failed);
        assert_eq!(
            stored.failed_at.map(|at| at.timestamp_millis()),
            Some(dead_at.timestamp_millis())
        );
        assert_eq!(
            stored.last_error.as_deref(),
            Some("Max retries (2) exceeded. Last error: still down")
        );

        assert!(!repo
            .increment_retry(Uuid::new_v4(), "missing", Utc::now(), next)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_dead_letter_listing_and_retry() {
        let (_dir, pool) = setup_test_db().await;
        let repo = SqliteOutboxRepository::new(pool);
        let row = record("UserCreated");
        repo.save(&row).await.unwrap();

        assert!(repo
            .mark_failed(row.id, "poison payload", Utc::now())
            .await
            .unwrap());
        let failed = repo.failed_events(10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].last_error.as_deref(), Some("poison payload"));
        assert!(failed[0].failed_at.is_some());

        assert!(repo.retry_failed(row.id, Utc::now()).await.unwrap());
        assert!(!repo.retry_failed(row.id, Utc::now()).await.unwrap());

        let stored = repo.find_by_id(row.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::Pending);
        assert_eq!(stored.retry_count, 0);
        assert!(stored.failed_at.is_none());
    }

    #[tokio::test]
    async fn test_archive_hides_dead_letter_until_manual_retry() {
        let (_dir, pool) = setup_test_db().await;
        let repo = SqliteOutboxRepository::new(pool);
        let row = record("Legacy");
        repo.save(&row).await.unwrap();

        // Only dead letters can be archived
        assert!(!repo.archive(row.id, Utc::now()).await.unwrap());

        repo.mark_failed(row.id, "Unknown event type: Legacy", Utc::now())
            .await
            .unwrap();
        assert!(repo.archive(row.id, Utc::now()).await.unwrap());
        assert!(!repo.archive(row.id, Utc::now()).await.unwrap());
        assert!(repo.failed_events(10).await.unwrap().is_empty());
        assert_eq!(
            repo.stats().await.unwrap(),
            OutboxStats { pending: 0, published: 0, failed: 0, archived: 1 }
        );

        let stored = repo.find_by_id(row.id).await.unwrap().unwrap();
        assert!(stored.is_archived());

        // An operator can still push an archived row back
        assert!(repo.retry_failed(row.id, Utc::now()).await.unwrap());
        let stored = repo.find_by_id(row.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::Pending);
        assert!(!stored.is_archived());
    }

    #[tokio::test]
    async fn test_metrics_over_window() {
        let (_dir, pool) = setup_test_db().await;
        let repo = SqliteOutboxRepository::new(pool);
        let now = Utc::now();
        let window_start = now - Duration::minutes(5);

        let mut fast = record("Fast");
        fast.created_at = now - Duration::seconds(2);
        let mut slow = record("Slow");
        slow.created_at = now - Duration::seconds(4);
        let mut stale = record("Stale");
        stale.created_at = now - Duration::hours(2);
        let mut waiting = record("Waiting");
        waiting.created_at = now - Duration::seconds(30);
        let mut newer = record("Newer");
        newer.created_at = now - Duration::seconds(10);
        let old_dead = record("OldDead");
        let dead = record("Dead");
        repo.save_many(&[
            fast.clone(),
            slow.clone(),
            stale.clone(),
            waiting.clone(),
            newer,
            old_dead.clone(),
            dead.clone(),
        ])
        .await
        .unwrap();

        repo.mark_published(fast.id, now).await.unwrap();
        repo.mark_published(slow.id, now).await.unwrap();
        repo.mark_published(stale.id, now - Duration::hours(1)).await.unwrap();
        repo.mark_failed(old_dead.id, "timeout", now - Duration::hours(1))
            .await
            .unwrap();
        repo.mark_failed(dead.id, "timeout", now).await.unwrap();

        let metrics = repo.metrics(window_start).await.unwrap();
        assert_eq!(metrics.window_start, window_start);
        assert_eq!(metrics.pending, 2);
        assert_eq!(metrics.published_in_window, 2);
        assert_eq!(metrics.failed_in_window, 1);
        assert_eq!(metrics.average_latency_ms, 3000.0);
        assert_eq!(
            metrics.oldest_pending_at.map(|at| at.timestamp_millis()),
            Some(waiting.created_at.timestamp_millis())
        );

        let empty = repo.metrics(now + Duration::minutes(1)).await.unwrap();
        assert_eq!(empty.published_in_window, 0);
        assert_eq!(empty.average_latency_ms, 0.0);
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_old_published_rows() {
        let (_dir, pool) = setup_test_db().await;
        let repo = SqliteOutboxRepository::new(pool);
        let now = Utc::now();
        let old = record("Old");
        let fresh = record("Fresh");
        let pending = record("Pending");
        repo.save_many(&[old.clone(), fresh.clone(), pending]).await.unwrap();

        repo.mark_published(old.id, now - Duration::days(8)).await.unwrap();
        repo.mark_published(fresh.id, now).await.unwrap();

        assert_eq!(repo.cleanup_published(now - Duration::days(7)).await.unwrap(), 1);
        let stats = repo.stats().await.unwrap();
        assert_eq!(
            stats,
            OutboxStats { pending: 1, published: 1, failed: 0, archived: 0 }
        );
    }
}
