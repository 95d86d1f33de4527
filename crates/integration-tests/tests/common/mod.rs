//! Shared fixtures: a migrated SQLite outbox, an orders table and event payloads

#![allow(dead_code)]

use async_trait::async_trait;
use modulith_core::domain::{DomainEvent, IntegrationEvent, IntegrationPayload};
use modulith_core::port::{EventHandler, HandlerError};
use modulith_infra_sqlite::{create_pool, database_url, run_migrations, SqliteOutboxRepository};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: Uuid,
    pub sku: String,
    pub quantity: u32,
}

impl IntegrationPayload for OrderPlaced {
    const EVENT_TYPE: &'static str = "OrderPlaced";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRequested {
    pub order_id: Uuid,
}

impl IntegrationPayload for InvoiceRequested {
    const EVENT_TYPE: &'static str = "InvoiceRequested";
}

pub type OrderPlacedEvent = IntegrationEvent<OrderPlaced>;
pub type InvoiceRequestedEvent = IntegrationEvent<InvoiceRequested>;

/// Migrated database in a temp dir plus an `orders` table owned by the test
pub async fn setup_outbox() -> (TempDir, Arc<SqliteOutboxRepository>) {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_pool(&database_url(&dir.path().join("modulith.db")))
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    sqlx::query("CREATE TABLE orders (id TEXT PRIMARY KEY, sku TEXT NOT NULL, quantity INTEGER NOT NULL)")
        .execute(&pool)
        .await
        .unwrap();
    (dir, Arc::new(SqliteOutboxRepository::new(pool)))
}

pub async fn order_count(repo: &SqliteOutboxRepository) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(repo.pool())
        .await
        .unwrap()
}

pub fn order_placed(sku: &str, quantity: u32) -> OrderPlacedEvent {
    let order_id = Uuid::new_v4();
    IntegrationEvent::new(
        order_id,
        "Order",
        OrderPlaced {
            order_id,
            sku: sku.to_string(),
            quantity,
        },
    )
}

/// Collects every event it receives
pub struct Collector<E> {
    seen: Mutex<Vec<E>>,
}

impl<E: Clone> Collector<E> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<E> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl<E> EventHandler<E> for Collector<E>
where
    E: DomainEvent + Clone,
{
    async fn handle(&self, event: &E) -> Result<(), HandlerError> {
        self.seen.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition().await
}
