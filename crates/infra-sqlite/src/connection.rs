// SQLite Connection Pool Setup

use crate::error::map_sqlx_error;
use modulith_core::error::{AppError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

const MAX_CONNECTIONS: u32 = 10;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Create SQLite connection pool with WAL mode
///
/// WAL lets the relay read pending rows while request handlers append new
/// ones in their own transactions.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    // sqlx reads anything without a scheme it knows as a file path
    if !database_url.starts_with("sqlite:") {
        return Err(AppError::Config(format!(
            "Invalid database URL '{}': expected a sqlite: URL",
            database_url
        )));
    }

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| AppError::Config(format!("Invalid database URL '{}': {}", database_url, e)))?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .map_err(map_sqlx_error)?;

    tracing::debug!(url = database_url, "SQLite pool ready");
    Ok(pool)
}

/// `sqlite://` URL for a filesystem path
pub fn database_url(path: &std::path::Path) -> String {
    format!("sqlite://{}", path.display())
}
