// SQLite Transaction Implementation

use crate::error::map_sqlx_error;
use crate::outbox_repository::insert_record;
use async_trait::async_trait;
use modulith_core::domain::OutboxRecord;
use modulith_core::error::Result;
use modulith_core::port::{OutboxTransaction, Transaction};
use sqlx::{Sqlite, SqliteConnection, Transaction as SqlxTransaction};

/// Open SQLite transaction shared by domain writes and outbox appends.
///
/// Dropping it without `commit` rolls everything back.
pub struct SqliteOutboxTransaction<'a> {
    tx: SqlxTransaction<'a, Sqlite>,
}

impl<'a> SqliteOutboxTransaction<'a> {
    pub fn new(tx: SqlxTransaction<'a, Sqlite>) -> Self {
        Self { tx }
    }

    /// Connection for the caller's own statements inside this transaction
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }
}

#[async_trait]
impl Transaction for SqliteOutboxTransaction<'_> {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}

#[async_trait]
impl OutboxTransaction for SqliteOutboxTransaction<'_> {
    async fn append(&mut self, record: &OutboxRecord) -> Result<()> {
        insert_record(&mut *self.tx, record).await
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::setup_test_db;
    use crate::SqliteOutboxRepository;
    use modulith_core::domain::{EventMetadata, OutboxRecord};
    use modulith_core::port::{
        OutboxRepository, OutboxTransaction, Transaction, TransactionalOutbox,
    };
    use uuid::Uuid;

    async fn create_users_table(repo: &SqliteOutboxRepository) {
        sqlx::query("CREATE TABLE users (id TEXT PRIMARY KEY, email TEXT NOT NULL)")
            .execute(repo.pool())
            .await
            .unwrap();
    }

    fn user_created(user_id: Uuid) -> OutboxRecord {
        let metadata = EventMetadata::new("UserCreated").for_aggregate(user_id, "User");
        OutboxRecord::new(&metadata, user_id, "User", serde_json::json!({"user_id": user_id}))
    }

    async fn user_count(repo: &SqliteOutboxRepository) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(repo.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_commit_persists_domain_row_and_outbox_row() {
        let (_dir, pool) = setup_test_db().await;
        let repo = SqliteOutboxRepository::new(pool);
        create_users_table(&repo).await;
        let user_id = Uuid::new_v4();

        let mut tx = repo.begin_transaction().await.unwrap();
        sqlx::query("INSERT INTO users (id, email) VALUES (?, ?)")
            .bind(user_id.to_string())
            .bind("a@example.com")
            .execute(tx.connection())
            .await
            .unwrap();
        let record = user_created(user_id);
        tx.append(&record).await.unwrap();
        Box::new(tx).commit().await.unwrap();

        assert_eq!(user_count(&repo).await, 1);
        assert!(repo.find_by_id(record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rollback_discards_both_writes() {
        let (_dir, pool) = setup_test_db().await;
        let repo = SqliteOutboxRepository::new(pool);
        create_users_table(&repo).await;
        let user_id = Uuid::new_v4();

        let mut tx = repo.begin_transaction().await.unwrap();
        sqlx::query("INSERT INTO users (id, email) VALUES (?, ?)")
            .bind(user_id.to_string())
            .bind("a@example.com")
            .execute(tx.connection())
            .await
            .unwrap();
        tx.append(&user_created(user_id)).await.unwrap();
        Box::new(tx).rollback().await.unwrap();

        assert_eq!(user_count(&repo).await, 0);
        assert_eq!(repo.stats().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_not_visible() {
        let (_dir, pool) = setup_test_db().await;
        let repo = SqliteOutboxRepository::new(pool);

        {
            let mut tx = repo.begin().await.unwrap();
            tx.append(&user_created(Uuid::new_v4())).await.unwrap();
        }

        assert_eq!(repo.stats().await.unwrap().pending, 0);
    }
}
