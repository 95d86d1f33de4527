// Runtime configuration for the in-process adapters
//
// Plain structs with defaults. The daemon fills them from environment
// variables; tests construct them directly.

use std::time::Duration;

/// Job service configuration
#[derive(Debug, Clone)]
pub struct JobsConfig {
    pub default_queue: String,
    pub default_max_retries: u32,
    pub default_timeout: Duration,
    /// Number of worker tasks sweeping the queues
    pub max_workers: usize,
    /// Capacity of each live queue
    pub max_queue_size: usize,
    /// Sleep between worker sweeps when every queue is empty
    pub worker_poll_interval: Duration,
    /// Interval of the loop that releases due delayed jobs
    pub scheduler_interval: Duration,
    /// Poll interval of `get_result` with a timeout
    pub result_poll_interval: Duration,
    /// First retry delay; zero requeues failed jobs immediately
    pub retry_base_delay: Duration,
    pub retry_backoff_factor: u32,
    /// Upper bound for draining on `shutdown(wait = true)`
    pub shutdown_timeout: Duration,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            default_queue: "default".to_string(),
            default_max_retries: 3,
            default_timeout: Duration::from_secs(300),
            max_workers: 4,
            max_queue_size: 1000,
            worker_poll_interval: Duration::from_millis(10),
            scheduler_interval: Duration::from_secs(1),
            result_poll_interval: Duration::from_millis(100),
            retry_base_delay: Duration::ZERO,
            retry_backoff_factor: 2,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Event bus configuration
#[derive(Debug, Clone, Default)]
pub struct EventBusConfig {
    /// Log every dispatched event at debug level
    pub trace_dispatch: bool,
}

/// Outbox relay configuration
#[derive(Debug, Clone)]
pub struct OutboxRelayConfig {
    pub batch_size: usize,
    pub poll_interval: Duration,
    /// Base of the exponential relay backoff
    pub retry_backoff: Duration,
    /// Relay attempts granted to newly written outbox rows
    pub max_retries: u32,
    pub cleanup_interval: Duration,
    /// Age after which published rows are deleted
    pub cleanup_older_than: Duration,
    pub dead_letter_interval: Duration,
    pub dead_letter_batch_size: usize,
    /// Dead letters created longer ago than this are archived, never requeued
    pub archive_after: Duration,
    pub metrics_interval: Duration,
    /// Look-back window for publish and failure counts
    pub metrics_window: Duration,
    pub thresholds: MetricsThresholds,
}

impl Default for OutboxRelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(60),
            max_retries: 5,
            cleanup_interval: Duration::from_secs(3600),
            cleanup_older_than: Duration::from_secs(7 * 24 * 3600),
            dead_letter_interval: Duration::from_secs(3600),
            dead_letter_batch_size: 50,
            archive_after: Duration::from_secs(30 * 24 * 3600),
            metrics_interval: Duration::from_secs(60),
            metrics_window: Duration::from_secs(5 * 60),
            thresholds: MetricsThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertLevel {
    Ok,
    Warning,
    Critical,
}

/// Alert thresholds for outbox metrics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsThresholds {
    pub queue_depth_warning: u64,
    pub queue_depth_critical: u64,
    pub failure_rate_warning: f64,
    pub failure_rate_critical: f64,
}

impl Default for MetricsThresholds {
    fn default() -> Self {
        Self {
            queue_depth_warning: 100,
            queue_depth_critical: 500,
            failure_rate_warning: 0.10,
            failure_rate_critical: 0.25,
        }
    }
}

impl MetricsThresholds {
    pub fn queue_depth_level(&self, pending: u64) -> AlertLevel {
        if pending >= self.queue_depth_critical {
            AlertLevel::Critical
        } else if pending >= self.queue_depth_warning {
            AlertLevel::Warning
        } else {
            AlertLevel::Ok
        }
    }

    pub fn failure_rate_level(&self, rate: f64) -> AlertLevel {
        if rate >= self.failure_rate_critical {
            AlertLevel::Critical
        } else if rate >= self.failure_rate_warning {
            AlertLevel::Warning
        } else {
            AlertLevel::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_levels() {
        let thresholds = MetricsThresholds::default();

        assert_eq!(thresholds.queue_depth_level(99), AlertLevel::Ok);
        assert_eq!(thresholds.queue_depth_level(100), AlertLevel::Warning);
        assert_eq!(thresholds.queue_depth_level(500), AlertLevel::Critical);

        assert_eq!(thresholds.failure_rate_level(0.0), AlertLevel::Ok);
        assert_eq!(thresholds.failure_rate_level(0.10), AlertLevel::Warning);
        assert_eq!(thresholds.failure_rate_level(0.30), AlertLevel::Critical);
    }
}
