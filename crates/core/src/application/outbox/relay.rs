// Outbox relay: moves committed outbox rows onto the event bus

use super::registry::EventRegistry;
use crate::application::retry::{exponential_backoff, retry_at};
use crate::application::worker::ShutdownToken;
use crate::config::{AlertLevel, OutboxRelayConfig};
use crate::domain::{DeadLetterAction, OutboxMetrics, OutboxRecord};
use crate::error::Result;
use crate::port::{EventPublisher, OutboxRepository, SystemTimeProvider, TimeProvider};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Above this many dead letters in one pass the root cause needs a look
const DEAD_LETTER_ALERT: usize = 10;

/// Relay counters since start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub events_processed: u64,
    pub events_failed: u64,
    pub dead_letters_recovered: u64,
    pub dead_letters_archived: u64,
    pub last_poll_at: Option<DateTime<Utc>>,
}

/// Outcome of one dead-letter pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeadLetterReport {
    pub processed: usize,
    /// Requeued with a fresh retry budget
    pub recovered: usize,
    pub archived: usize,
}

/// Polls the outbox and publishes due rows (at-least-once).
///
/// A row is marked published once the bus accepted it, regardless of how
/// its handlers fared. Decode or publish failures reschedule the row with
/// exponential backoff until it becomes a dead letter.
pub struct OutboxRelay {
    repository: Arc<dyn OutboxRepository>,
    publisher: Arc<dyn EventPublisher>,
    registry: Arc<EventRegistry>,
    time_provider: Arc<dyn TimeProvider>,
    config: OutboxRelayConfig,
    stats: Mutex<RelayStats>,
    latest_metrics: Mutex<Option<OutboxMetrics>>,
}

impl OutboxRelay {
    pub fn new(
        repository: Arc<dyn OutboxRepository>,
        publisher: Arc<dyn EventPublisher>,
        registry: Arc<EventRegistry>,
        config: OutboxRelayConfig,
    ) -> Self {
        Self {
            repository,
            publisher,
            registry,
            time_provider: Arc::new(SystemTimeProvider),
            config,
            stats: Mutex::new(RelayStats::default()),
            latest_metrics: Mutex::new(None),
        }
    }

    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    pub fn config(&self) -> &OutboxRelayConfig {
        &self.config
    }

    fn stats_mut(&self) -> MutexGuard<'_, RelayStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stats(&self) -> RelayStats {
        *self.stats_mut()
    }

    /// Snapshot from the last `collect_metrics` call
    pub fn latest_metrics(&self) -> Option<OutboxMetrics> {
        self.latest_metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Publish one batch of due rows, returning how many were published
    pub async fn process_batch(&self) -> Result<usize> {
        let now = self.time_provider.now();
        self.stats_mut().last_poll_at = Some(now);

        let records = self
            .repository
            .fetch_unpublished(self.config.batch_size, now)
            .await?;
        if records.is_empty() {
            return Ok(0);
        }
        debug!(count = records.len(), "Relaying outbox batch");

        let mut published = 0;
        for record in records {
            match self.relay(&record).await {
                Ok(()) => {
                    if self
                        .repository
                        .mark_published(record.id, self.time_provider.now())
                        .await?
                    {
                        published += 1;
                        self.stats_mut().events_processed += 1;
                    }
                }
                Err(e) => {
                    self.stats_mut().events_failed += 1;
                    let backoff = exponential_backoff(
                        self.config.retry_backoff,
                        2,
                        record.retry_count,
                    );
                    let next_attempt_at = retry_at(self.time_provider.now(), backoff);
                    warn!(
                        event_id = %record.id,
                        event_type = %record.event_type,
                        retry_count = record.retry_count + 1,
                        max_retries = record.max_retries,
                        next_attempt_at = %next_attempt_at,
                        error = %e,
                        "Outbox relay failed"
                    );
                    self.repository
                        .increment_retry(
                            record.id,
                            &e.to_string(),
                            self.time_provider.now(),
                            next_attempt_at,
                        )
                        .await?;
                }
            }
        }

        if published > 0 {
            info!(published, "Outbox events published");
        }
        Ok(published)
    }

    async fn relay(&self, record: &OutboxRecord) -> Result<()> {
        let event = self.registry.decode(record)?;
        self.publisher.publish(event).await
    }

    /// Delete published rows older than `cleanup_older_than`
    pub async fn cleanup(&self) -> Result<u64> {
        let cutoff = age_cutoff(self.time_provider.now(), self.config.cleanup_older_than);
        let deleted = self.repository.cleanup_published(cutoff).await?;
        if deleted > 0 {
            info!(deleted, cutoff = %cutoff, "Published outbox events cleaned up");
        }
        Ok(deleted)
    }

    /// Sort up to `limit` dead letters: transient failures get a fresh retry
    /// budget, permanent ones and rows older than `archive_after` are archived.
    pub async fn process_dead_letters(&self, limit: usize) -> Result<DeadLetterReport> {
        let dead_letters = self.repository.failed_events(limit).await?;
        let mut report = DeadLetterReport::default();
        if dead_letters.is_empty() {
            return Ok(report);
        }
        info!(count = dead_letters.len(), "Processing dead-letter outbox events");

        let now = self.time_provider.now();
        let archive_before = age_cutoff(now, self.config.archive_after);
        for record in &dead_letters {
            let done = match record.dead_letter_action(archive_before) {
                DeadLetterAction::Requeue => {
                    let requeued = self.repository.retry_failed(record.id, now).await?;
                    if requeued {
                        report.recovered += 1;
                        debug!(event_id = %record.id, "Dead letter requeued");
                    }
                    requeued
                }
                DeadLetterAction::Archive => {
                    let archived = self.repository.archive(record.id, now).await?;
                    if archived {
                        report.archived += 1;
                        debug!(
                            event_id = %record.id,
                            error = record.last_error.as_deref().unwrap_or_default(),
                            "Dead letter archived"
                        );
                    }
                    archived
                }
            };
            if done {
                report.processed += 1;
            }
        }

        {
            let mut stats = self.stats_mut();
            stats.dead_letters_recovered += report.recovered as u64;
            stats.dead_letters_archived += report.archived as u64;
        }
        if dead_letters.len() > DEAD_LETTER_ALERT {
            warn!(
                count = dead_letters.len(),
                "High number of dead-letter outbox events, investigate the root cause"
            );
        }
        info!(
            recovered = report.recovered,
            archived = report.archived,
            "Dead-letter outbox events processed"
        );
        Ok(report)
    }

    /// Take a metrics snapshot over `metrics_window` and log threshold breaches
    pub async fn collect_metrics(&self) -> Result<OutboxMetrics> {
        let now = self.time_provider.now();
        let metrics = self
            .repository
            .metrics(age_cutoff(now, self.config.metrics_window))
            .await?;
        let failure_rate = metrics.failure_rate();
        let thresholds = &self.config.thresholds;

        match thresholds.queue_depth_level(metrics.pending) {
            AlertLevel::Critical => error!(
                pending = metrics.pending,
                threshold = thresholds.queue_depth_critical,
                "CRITICAL: outbox queue depth, events may be backing up"
            ),
            AlertLevel::Warning => warn!(
                pending = metrics.pending,
                threshold = thresholds.queue_depth_warning,
                "Outbox queue depth above warning threshold"
            ),
            AlertLevel::Ok => {}
        }
        match thresholds.failure_rate_level(failure_rate) {
            AlertLevel::Critical => error!(
                failure_rate,
                threshold = thresholds.failure_rate_critical,
                "CRITICAL: outbox failure rate, check event handlers"
            ),
            AlertLevel::Warning => warn!(
                failure_rate,
                threshold = thresholds.failure_rate_warning,
                "Outbox failure rate above warning threshold"
            ),
            AlertLevel::Ok => {}
        }

        debug!(
            pending = metrics.pending,
            failure_rate,
            average_latency_ms = metrics.average_latency_ms,
            oldest_pending_age_s = metrics.oldest_pending_age(now).map(|age| age.num_seconds()),
            "Outbox metrics collected"
        );
        *self.latest_metrics.lock().unwrap_or_else(|e| e.into_inner()) = Some(metrics.clone());
        Ok(metrics)
    }

    /// Poll, clean up, sort dead letters and collect metrics on fixed
    /// intervals until shutdown
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        info!(
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Outbox relay started"
        );

        let mut poll = interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cleanup = interval_at(
            Instant::now() + self.config.cleanup_interval,
            self.config.cleanup_interval,
        );
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut dead_letters = interval_at(
            Instant::now() + self.config.dead_letter_interval,
            self.config.dead_letter_interval,
        );
        dead_letters.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut metrics = interval_at(
            Instant::now() + self.config.metrics_interval,
            self.config.metrics_interval,
        );
        metrics.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(e) = self.process_batch().await {
                        error!(error = %e, "Outbox poll failed");
                    }
                }
                _ = cleanup.tick() => {
                    if let Err(e) = self.cleanup().await {
                        error!(error = %e, "Outbox cleanup failed");
                    }
                }
                _ = dead_letters.tick() => {
                    if let Err(e) = self.process_dead_letters(self.config.dead_letter_batch_size).await {
                        error!(error = %e, "Dead-letter processing failed");
                    }
                }
                _ = metrics.tick() => {
                    if let Err(e) = self.collect_metrics().await {
                        error!(error = %e, "Outbox metrics collection failed");
                    }
                }
                _ = shutdown.wait() => break,
            }
        }

        let stats = self.stats();
        info!(
            events_processed = stats.events_processed,
            events_failed = stats.events_failed,
            dead_letters_recovered = stats.dead_letters_recovered,
            dead_letters_archived = stats.dead_letters_archived,
            "Outbox relay stopped"
        );
    }
}

/// `now - age`, clamped to the earliest representable time
fn age_cutoff(now: DateTime<Utc>, age: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
