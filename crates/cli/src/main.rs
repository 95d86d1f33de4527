//! Modulith CLI - inspect and repair the outbox of a Modulith database

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use modulith_core::config::{AlertLevel, MetricsThresholds};
use modulith_core::domain::{OutboxMetrics, OutboxRecord, OutboxStats};
use modulith_core::port::OutboxRepository;
use modulith_infra_sqlite::{create_pool, database_url, run_migrations, SqliteOutboxRepository};
use std::path::PathBuf;
use tabled::{Table, Tabled};
use uuid::Uuid;

const DEFAULT_DB_PATH: &str = "~/.modulith/outbox.db";
const ERROR_PREVIEW_CHARS: usize = 60;

#[derive(Parser)]
#[command(name = "modulith")]
#[command(about = "Modulith outbox CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path of the daemon's SQLite database
    #[arg(long, env = "MODULITH_DB_PATH", default_value = DEFAULT_DB_PATH)]
    db: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Row counts per status and relay health over a recent window
    Stats {
        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,

        /// Look-back window for publish and failure counts
        #[arg(long, default_value = "5")]
        window_minutes: i64,
    },

    /// List pending events, including those waiting for a retry
    Pending {
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// List dead letters awaiting triage, newest first (archived ones excluded)
    Failed {
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Requeue dead letters (archived ones included) with a fresh retry budget
    Retry {
        /// Event ID
        #[arg(required_unless_present = "all")]
        event_id: Option<Uuid>,

        /// Requeue every unarchived dead letter
        #[arg(long, conflicts_with = "event_id")]
        all: bool,
    },

    /// Delete published events older than the given age
    Cleanup {
        #[arg(long, default_value = "7")]
        older_than_days: i64,
    },
}

#[derive(Tabled)]
struct EventRow {
    id: String,
    event_type: String,
    aggregate: String,
    retries: String,
    scheduled_at: String,
    last_error: String,
}

impl From<&OutboxRecord> for EventRow {
    fn from(record: &OutboxRecord) -> Self {
        Self {
            id: record.id.to_string(),
            event_type: format!("{} v{}", record.event_type, record.version),
            aggregate: format!("{}:{}", record.aggregate_type, record.aggregate_id),
            retries: format!("{}/{}", record.retry_count, record.max_retries),
            scheduled_at: record.scheduled_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            last_error: record
                .last_error
                .as_deref()
                .map(preview)
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= ERROR_PREVIEW_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(ERROR_PREVIEW_CHARS).collect();
    format!("{}...", head)
}

fn print_events(title: &str, records: &[OutboxRecord]) {
    if records.is_empty() {
        println!("{}", format!("No {} events", title).yellow());
        return;
    }
    println!("{}", format!("{} events ({})", title, records.len()).cyan().bold());
    println!();
    let rows: Vec<EventRow> = records.iter().map(EventRow::from).collect();
    println!("{}", Table::new(rows));
}

fn colored_by_level(text: String, level: AlertLevel) -> ColoredString {
    match level {
        AlertLevel::Ok => text.green(),
        AlertLevel::Warning => text.yellow(),
        AlertLevel::Critical => text.red().bold(),
    }
}

/// Compact age such as "45s", "12m 5s" or "3h 20m"
fn format_age(age: Duration) -> String {
    let secs = age.num_seconds().max(0);
    match secs {
        0..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m {}s", secs / 60, secs % 60),
        _ => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    }
}

fn stats_json(stats: &OutboxStats, metrics: &OutboxMetrics, now: DateTime<Utc>) -> serde_json::Value {
    serde_json::json!({
        "counts": stats,
        "metrics": metrics,
        "failure_rate": metrics.failure_rate(),
        "oldest_pending_age_seconds": metrics.oldest_pending_age(now).map(|age| age.num_seconds()),
    })
}

fn print_stats(db: &str, stats: &OutboxStats, metrics: &OutboxMetrics, window_minutes: i64) {
    let thresholds = MetricsThresholds::default();
    let now = Utc::now();

    println!("{}", "Outbox Status".cyan().bold());
    println!();
    println!("  {} {}", "Database:".bold(), db);
    println!("  {} {}", "Total:".bold(), stats.total());
    println!(
        "  {} {}",
        "Pending:".bold(),
        colored_by_level(stats.pending.to_string(), thresholds.queue_depth_level(stats.pending))
    );
    println!("  {} {}", "Published:".bold(), stats.published.to_string().green());
    let failed = stats.failed.to_string();
    let failed = if stats.failed > 0 { failed.red() } else { failed.normal() };
    println!("  {} {}", "Failed:".bold(), failed);
    println!("  {} {}", "Archived:".bold(), stats.archived);

    println!();
    println!("{}", format!("Last {} minutes", window_minutes).cyan().bold());
    println!();
    println!("  {} {}", "Published:".bold(), metrics.published_in_window);
    println!("  {} {}", "Dead-lettered:".bold(), metrics.failed_in_window);
    let rate = metrics.failure_rate();
    println!(
        "  {} {}",
        "Failure rate:".bold(),
        colored_by_level(format!("{:.1}%", rate * 100.0), thresholds.failure_rate_level(rate))
    );
    println!("  {} {:.1} ms", "Avg latency:".bold(), metrics.average_latency_ms);
    let oldest = metrics
        .oldest_pending_age(now)
        .map(format_age)
        .unwrap_or_else(|| "-".to_string());
    println!("  {} {}", "Oldest pending:".bold(), oldest);
}

async fn open_repository(db: &str) -> Result<SqliteOutboxRepository> {
    let path = PathBuf::from(shellexpand::tilde(db).into_owned());
    anyhow::ensure!(path.exists(), "Database not found: {}", path.display());

    let pool = create_pool(&database_url(&path))
        .await
        .context("Failed to open database")?;
    run_migrations(&pool).await.context("Migration failed")?;
    Ok(SqliteOutboxRepository::new(pool))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let repo = open_repository(&cli.db).await?;

    match cli.command {
        Commands::Stats {
            json,
            window_minutes,
        } => {
            anyhow::ensure!(window_minutes > 0, "--window-minutes must be positive");
            let now = Utc::now();
            let stats = repo.stats().await?;
            let metrics = repo
                .metrics(now - Duration::minutes(window_minutes))
                .await?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&stats_json(&stats, &metrics, now))?
                );
            } else {
                print_stats(&cli.db, &stats, &metrics, window_minutes);
            }
        }

        Commands::Pending { limit } => {
            let records = repo.fetch_unpublished(limit, DateTime::<Utc>::MAX_UTC).await?;
            print_events("Pending", &records);
        }

        Commands::Failed { limit } => {
            let records = repo.failed_events(limit).await?;
            print_events("Failed", &records);
        }

        Commands::Retry { event_id, all } => {
            let ids: Vec<Uuid> = if all {
                let failed = repo.failed_events(usize::MAX).await?;
                failed.iter().map(|r| r.id).collect()
            } else {
                event_id.into_iter().collect()
            };

            let mut requeued = 0;
            for id in ids {
                if repo.retry_failed(id, Utc::now()).await? {
                    requeued += 1;
                    println!("{}", format!("✓ Event {} requeued", id).green());
                } else {
                    println!("{}", format!("✗ Event {} is not a dead letter", id).red());
                }
            }
            println!();
            println!("{} {}", "Requeued:".bold(), requeued);
        }

        Commands::Cleanup { older_than_days } => {
            anyhow::ensure!(older_than_days >= 0, "--older-than-days must not be negative");
            let cutoff = Utc::now()
                .checked_sub_signed(Duration::days(older_than_days))
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            let deleted = repo.cleanup_published(cutoff).await?;
            println!(
                "{}",
                format!("✓ {} published events deleted", deleted).green().bold()
            );
        }
    }

    Ok(())
}
