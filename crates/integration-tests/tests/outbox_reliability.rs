//! Outbox Reliability Tests
//!
//! Retry backoff, dead letters, requeue and cleanup against the SQLite store.

mod common;

use async_trait::async_trait;
use common::*;
use modulith_core::application::{EventRegistry, InMemoryEventBus, OutboxRelay};
use modulith_core::config::{EventBusConfig, OutboxRelayConfig};
use modulith_core::domain::{EventMetadata, OutboxRecord, OutboxStatus};
use modulith_core::port::event_publisher::mocks::RecordingPublisher;
use modulith_core::port::time_provider::mocks::MockTimeProvider;
use modulith_core::port::{EventHandler, HandlerError, OutboxRepository, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn registry() -> Arc<EventRegistry> {
    let mut registry = EventRegistry::new();
    registry.register::<OrderPlaced>();
    Arc::new(registry)
}

/// Slightly ahead of the wall clock so rows written after it are already due
fn clock() -> Arc<MockTimeProvider> {
    Arc::new(MockTimeProvider::new(
        chrono::Utc::now() + chrono::Duration::seconds(1),
    ))
}

fn immediate_retries() -> OutboxRelayConfig {
    OutboxRelayConfig {
        retry_backoff: Duration::ZERO,
        ..OutboxRelayConfig::default()
    }
}

/// Test 1: an unreachable bus exhausts the row's budget, dead-letter processing revives it
#[tokio::test]
async fn test_failing_publisher_dead_letters_then_requeue_recovers() {
    let (_dir, repo) = setup_outbox().await;
    let publisher = Arc::new(RecordingPublisher::new());
    publisher.set_failing(true);
    let relay = OutboxRelay::new(repo.clone(), publisher.clone(), registry(), immediate_retries());

    let record = order_placed("SKU-1", 1).to_record().unwrap().with_max_retries(3);
    repo.save(&record).await.unwrap();

    for attempt in 1..=3 {
        assert_eq!(relay.process_batch().await.unwrap(), 0, "attempt {}", attempt);
    }

    let stored = repo.find_by_id(record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OutboxStatus::Failed);
    assert_eq!(stored.retry_count, 2);
    assert_eq!(
        stored.last_error.as_deref(),
        Some("Max retries (3) exceeded. Last error: Internal error: publisher unavailable")
    );
    assert_eq!(relay.stats().events_failed, 3);

    // Dead letters are never polled again
    assert_eq!(relay.process_batch().await.unwrap(), 0);
    assert_eq!(relay.stats().events_failed, 3);

    publisher.set_failing(false);
    let report = relay.process_dead_letters(10).await.unwrap();
    assert_eq!((report.recovered, report.archived), (1, 0));
    assert_eq!(relay.process_batch().await.unwrap(), 1);
    assert_eq!(publisher.published_types(), vec!["OrderPlaced"]);
    assert_eq!(repo.stats().await.unwrap().published, 1);
}

/// Test 2: rows nobody can decode end up as archived dead letters, not in a
/// requeue loop
#[tokio::test]
async fn test_unknown_event_type_is_dead_lettered_then_archived() {
    let (_dir, repo) = setup_outbox().await;
    let publisher = Arc::new(RecordingPublisher::new());
    let relay = OutboxRelay::new(repo.clone(), publisher.clone(), registry(), immediate_retries());

    let metadata = EventMetadata::new("LegacyEvent");
    let record = OutboxRecord::new(&metadata, Uuid::new_v4(), "Legacy", serde_json::json!({}))
        .with_max_retries(1);
    repo.save(&record).await.unwrap();

    assert_eq!(relay.process_batch().await.unwrap(), 0);

    let failed = repo.failed_events(10).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert!(failed[0]
        .last_error
        .as_deref()
        .unwrap()
        .contains("Unknown event type: LegacyEvent"));

    for _ in 0..3 {
        let report = relay.process_dead_letters(10).await.unwrap();
        assert_eq!(report.recovered, 0);
        relay.process_batch().await.unwrap();
    }

    let stored = repo.find_by_id(record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OutboxStatus::Failed);
    assert!(stored.is_archived());
    assert!(repo.failed_events(10).await.unwrap().is_empty());
    assert_eq!(repo.stats().await.unwrap().archived, 1);
    assert_eq!(relay.stats().events_failed, 1);
    assert_eq!(relay.stats().dead_letters_archived, 1);
    assert!(publisher.published().is_empty());
}

/// Test 3: a payload that no longer matches its type is retried, not dropped
#[tokio::test]
async fn test_malformed_payload_is_retried() {
    let (_dir, repo) = setup_outbox().await;
    let publisher = Arc::new(RecordingPublisher::new());
    let relay = OutboxRelay::new(repo.clone(), publisher.clone(), registry(), immediate_retries());

    let mut record = order_placed("SKU-1", 1).to_record().unwrap();
    record.payload = serde_json::json!({ "order_id": "not-a-uuid" });
    repo.save(&record).await.unwrap();

    assert_eq!(relay.process_batch().await.unwrap(), 0);

    let stored = repo.find_by_id(record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OutboxStatus::Pending);
    assert_eq!(stored.retry_count, 1);
    assert!(stored.last_error.is_some());
}

struct FailingHandler;

#[async_trait]
impl EventHandler<OrderPlacedEvent> for FailingHandler {
    async fn handle(&self, _event: &OrderPlacedEvent) -> Result<(), HandlerError> {
        Err(HandlerError::new("inventory service down"))
    }
}

/// Test 4: handler failures are the bus's concern; the row still counts as published
#[tokio::test]
async fn test_handler_failure_does_not_block_publication() {
    let (_dir, repo) = setup_outbox().await;
    let bus = Arc::new(InMemoryEventBus::new(EventBusConfig::default()));
    bus.initialize();
    bus.subscribe::<OrderPlacedEvent, _>(Arc::new(FailingHandler));
    let collector = Collector::<OrderPlacedEvent>::new();
    bus.subscribe::<OrderPlacedEvent, _>(collector.clone());

    let relay = OutboxRelay::new(repo.clone(), bus.clone(), registry(), OutboxRelayConfig::default());
    repo.save(&order_placed("SKU-1", 1).to_record().unwrap())
        .await
        .unwrap();

    assert_eq!(relay.process_batch().await.unwrap(), 1);
    assert_eq!(collector.seen().len(), 1);
    assert_eq!(bus.error_count(), 1);
    assert_eq!(repo.stats().await.unwrap().published, 1);
}

/// Test 5: backoff keeps a failed row out of polls until it is due
#[tokio::test]
async fn test_backoff_defers_next_attempt() {
    let (_dir, repo) = setup_outbox().await;
    let clock = clock();
    let publisher = Arc::new(RecordingPublisher::new());
    publisher.set_failing(true);
    let relay = OutboxRelay::new(
        repo.clone(),
        publisher.clone(),
        registry(),
        OutboxRelayConfig {
            retry_backoff: Duration::from_secs(60),
            ..OutboxRelayConfig::default()
        },
    )
    .with_time_provider(clock.clone());

    repo.save(&order_placed("SKU-1", 1).to_record().unwrap())
        .await
        .unwrap();
    assert_eq!(relay.process_batch().await.unwrap(), 0);

    publisher.set_failing(false);
    clock.advance(Duration::from_secs(30));
    assert_eq!(relay.process_batch().await.unwrap(), 0);
    assert!(publisher.published().is_empty());

    clock.advance(Duration::from_secs(31));
    assert_eq!(relay.process_batch().await.unwrap(), 1);
    assert_eq!(publisher.published().len(), 1);
}

/// Test 6: metrics reflect queue depth and the window's failure rate
#[tokio::test]
async fn test_metrics_snapshot_from_sqlite() {
    let (_dir, repo) = setup_outbox().await;
    let clock = clock();
    let publisher = Arc::new(RecordingPublisher::new());
    let relay = OutboxRelay::new(repo.clone(), publisher.clone(), registry(), immediate_retries())
        .with_time_provider(clock.clone());

    repo.save(&order_placed("SKU-1", 1).to_record().unwrap())
        .await
        .unwrap();
    assert_eq!(relay.process_batch().await.unwrap(), 1);

    publisher.set_failing(true);
    let doomed = order_placed("SKU-2", 1).to_record().unwrap().with_max_retries(1);
    repo.save(&doomed).await.unwrap();
    assert_eq!(relay.process_batch().await.unwrap(), 0);

    let mut waiting = order_placed("SKU-3", 1).to_record().unwrap();
    waiting.scheduled_at = clock.now() + chrono::Duration::hours(1);
    repo.save(&waiting).await.unwrap();

    let metrics = relay.collect_metrics().await.unwrap();
    assert_eq!(metrics.pending, 1);
    assert_eq!(metrics.published_in_window, 1);
    assert_eq!(metrics.failed_in_window, 1);
    assert_eq!(metrics.failure_rate(), 0.5);
    assert!(metrics.average_latency_ms >= 0.0);
    assert_eq!(
        metrics.oldest_pending_at.map(|at| at.timestamp_millis()),
        Some(waiting.created_at.timestamp_millis())
    );
    assert_eq!(relay.latest_metrics(), Some(metrics));
}

/// Test 7: cleanup deletes published rows past the retention age only
#[tokio::test]
async fn test_cleanup_respects_retention() {
    let (_dir, repo) = setup_outbox().await;
    let clock = clock();
    let publisher = Arc::new(RecordingPublisher::new());
    let relay = OutboxRelay::new(
        repo.clone(),
        publisher,
        registry(),
        OutboxRelayConfig {
            cleanup_older_than: Duration::from_secs(3600),
            ..OutboxRelayConfig::default()
        },
    )
    .with_time_provider(clock.clone());

    let published = order_placed("SKU-1", 1).to_record().unwrap();
    let pending = order_placed("SKU-2", 1).to_record().unwrap();
    repo.save(&published).await.unwrap();
    assert_eq!(relay.process_batch().await.unwrap(), 1);
    repo.save(&pending).await.unwrap();

    assert_eq!(relay.cleanup().await.unwrap(), 0);

    clock.advance(Duration::from_secs(2 * 3600));
    assert_eq!(relay.cleanup().await.unwrap(), 1);

    assert!(repo.find_by_id(published.id).await.unwrap().is_none());
    assert!(repo.find_by_id(pending.id).await.unwrap().is_some());
}
