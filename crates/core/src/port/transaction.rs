// Transaction port for atomic operations

use crate::domain::OutboxRecord;
use crate::error::Result;
use async_trait::async_trait;

/// Transaction trait for atomic multi-step operations
#[async_trait]
pub trait Transaction: Send {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Outbox that can append rows inside a caller-controlled transaction
#[async_trait]
pub trait TransactionalOutbox: Send + Sync {
    /// Begin a new transaction
    async fn begin(&self) -> Result<Box<dyn OutboxTransaction>>;
}

/// Outbox writes within a transaction.
///
/// Rows become visible to the relay only after commit; a rollback (or drop)
/// discards them together with the caller's domain writes.
#[async_trait]
pub trait OutboxTransaction: Transaction {
    async fn append(&mut self, record: &OutboxRecord) -> Result<()>;
}
