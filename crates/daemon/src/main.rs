//! Modulith Daemon - Main Entry Point
//! Event bus + job workers + outbox relay over a SQLite outbox

mod config;
mod users;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{DaemonConfig, LogFormat};
use modulith_core::application::{
    shutdown_channel, EventRegistry, InMemoryEventBus, InMemoryJobService, OutboxRelay,
};
use modulith_core::config::EventBusConfig;
use modulith_core::port::{EventPublisher, JobService};
use modulith_infra_sqlite::{create_pool, database_url, run_migrations, SqliteOutboxRepository};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const RELAY_STOP_TIMEOUT: Duration = Duration::from_secs(5);

fn init_logging(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("modulith=info"))
        .context("Failed to create env filter")?;

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty())
            .init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let config = DaemonConfig::from_env()?;
    init_logging(config.log_format)?;

    info!("Modulith daemon v{} starting...", VERSION);

    // 2. Database
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }
    info!(db_path = %config.db_path.display(), "Initializing database...");

    let pool = create_pool(&database_url(&config.db_path))
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;
    users::ensure_schema(&pool).await?;

    // 3. In-process adapters (DI wiring)
    let bus = Arc::new(InMemoryEventBus::new(EventBusConfig::default()));
    let jobs = Arc::new(InMemoryJobService::new(config.jobs.clone()));
    let mut registry = EventRegistry::new();

    // initialize() resets subscriptions, so it runs before modules subscribe
    bus.initialize();
    users::install(&bus, jobs.clone(), &mut registry);
    jobs.initialize()?;

    info!(
        handlers = bus.handler_count(),
        event_types = ?registry.event_types(),
        "Modules installed"
    );

    // 4. Outbox relay
    let repo = Arc::new(SqliteOutboxRepository::new(pool.clone()));
    let relay = Arc::new(OutboxRelay::new(
        repo.clone(),
        bus.clone(),
        Arc::new(registry),
        config.relay.clone(),
    ));

    let (shutdown_tx, _) = shutdown_channel();
    let relay_handle = {
        let relay = Arc::clone(&relay);
        let token = shutdown_tx.token();
        tokio::spawn(async move { relay.run(token).await })
    };

    if let Some(email) = &config.demo_email {
        match users::register_user(&repo, email, config.relay.max_retries).await {
            Ok(user_id) => info!(%user_id, "Demo user registered"),
            Err(e) => warn!(error = %e, "Demo user registration failed"),
        }
    }

    info!("System ready. Press Ctrl+C to shutdown");

    // 5. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 6. Graceful shutdown: stop relaying, drain jobs, then close the bus
    shutdown_tx.shutdown();
    if tokio::time::timeout(RELAY_STOP_TIMEOUT, relay_handle)
        .await
        .is_err()
    {
        warn!("Outbox relay did not stop in time");
    }

    jobs.shutdown(true).await;
    bus.close();

    info!(
        events_published = bus.published_count(),
        handler_errors = bus.error_count(),
        bus_healthy = bus.health_check(),
        jobs_healthy = jobs.health_check().await,
        "Shutdown complete"
    );
    pool.close().await;

    Ok(())
}
