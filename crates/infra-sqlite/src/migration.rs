// Migration Runner

use crate::error::map_sqlx_error;
use modulith_core::error::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Latest schema version shipped with this crate
pub const SCHEMA_VERSION: i64 = 3;

/// Run database migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = schema_version(pool).await?;
    info!(current_version, target_version = SCHEMA_VERSION, "Running database migrations");

    // Apply migrations sequentially
    if current_version < 1 {
        info!("Applying migration 001: Outbox events");
        apply_migration(pool, include_str!("../migrations/001_outbox_events.sql")).await?;
    }

    if current_version < 2 {
        info!("Applying migration 002: Lookup indexes");
        apply_migration(
            pool,
            include_str!("../migrations/002_outbox_lookup_indexes.sql"),
        )
        .await?;
    }

    if current_version < 3 {
        info!("Applying migration 003: Dead-letter tracking");
        apply_migration(
            pool,
            include_str!("../migrations/003_dead_letter_tracking.sql"),
        )
        .await?;
    }

    Ok(())
}

/// Applied schema version, 0 for a fresh database
pub async fn schema_version(pool: &SqlitePool) -> Result<i64> {
    let table_exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
    )
    .fetch_one(pool)
    .await
    .map_err(map_sqlx_error)?;

    if table_exists == 0 {
        return Ok(0);
    }

    let version: Option<i64> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await
            .map_err(map_sqlx_error)?;
    Ok(version.unwrap_or(0))
}

/// Apply a single migration SQL file in one transaction
async fn apply_migration(pool: &SqlitePool, sql: &str) -> Result<()> {
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

    for statement in sql.split(';') {
        let clean_statement: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();

        if !clean_statement.is_empty() {
            sqlx::query(&clean_statement)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }
    }

    tx.commit().await.map_err(map_sqlx_error)?;
    Ok(())
}
