// Modulith Infrastructure - SQLite Adapter
// Implements: OutboxRepository, TransactionalOutbox

mod connection;
mod error;
mod migration;
mod outbox_repository;
mod transaction;

pub use connection::{create_pool, database_url};
pub use error::map_sqlx_error;
pub use migration::{run_migrations, schema_version, SCHEMA_VERSION};
pub use outbox_repository::SqliteOutboxRepository;
pub use transaction::SqliteOutboxTransaction;
