// Daemon configuration from MODULITH_* environment variables

use anyhow::{Context, Result};
use modulith_core::config::{JobsConfig, OutboxRelayConfig};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "~/.modulith/outbox.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Development: human readable, colored
    Pretty,
    /// Production: one JSON object per line
    Json,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: PathBuf,
    pub log_format: LogFormat,
    pub jobs: JobsConfig,
    pub relay: OutboxRelayConfig,
    /// Register this user on startup to exercise the full event flow
    pub demo_email: Option<String>,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("MODULITH_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let db_path = PathBuf::from(shellexpand::tilde(&db_path).into_owned());

        let log_format = match lookup("MODULITH_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let mut jobs = JobsConfig::default();
        if let Some(workers) = parse(&lookup, "MODULITH_JOB_WORKERS")? {
            jobs.max_workers = workers;
        }
        if let Some(queue) = lookup("MODULITH_DEFAULT_QUEUE").filter(|q| !q.is_empty()) {
            jobs.default_queue = queue;
        }

        let mut relay = OutboxRelayConfig::default();
        if let Some(ms) = parse::<u64, _>(&lookup, "MODULITH_OUTBOX_POLL_MS")? {
            anyhow::ensure!(ms > 0, "MODULITH_OUTBOX_POLL_MS must be positive");
            relay.poll_interval = Duration::from_millis(ms);
        }
        if let Some(batch_size) = parse(&lookup, "MODULITH_OUTBOX_BATCH_SIZE")? {
            relay.batch_size = batch_size;
        }

        Ok(Self {
            db_path,
            log_format,
            jobs,
            relay,
            demo_email: lookup("MODULITH_DEMO_EMAIL").filter(|e| !e.is_empty()),
        })
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| raw.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("Invalid value for {}", key))
}
