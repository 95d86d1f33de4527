// Outbox Domain Model
//
// An outbox row is written in the same transaction as the state change it
// describes and later relayed to the event bus (at-least-once).

use crate::domain::event::EventMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Default relay attempts before a row becomes a dead letter
pub const DEFAULT_OUTBOX_MAX_RETRIES: u32 = 5;

/// Outbox row status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Published,
    /// Dead letter: retries exhausted (archived dead letters keep this status)
    Failed,
}

impl OutboxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Published => "published",
            OutboxStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OutboxStatus::Pending),
            "published" => Ok(OutboxStatus::Published),
            "failed" => Ok(OutboxStatus::Failed),
            other => Err(format!("Unknown outbox status: {}", other)),
        }
    }
}

/// Persisted integration event awaiting relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    /// Same as the event id
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub event_type: String,
    pub version: String,
    pub correlation_id: Uuid,
    pub causation_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    /// Not relayed before this time (retry backoff)
    pub scheduled_at: DateTime<Utc>,
    pub last_error: Option<String>,
    /// When the row became a dead letter
    pub failed_at: Option<DateTime<Utc>>,
    /// Set once dead-letter processing gave up on the row
    pub archived_at: Option<DateTime<Utc>>,
}

impl OutboxRecord {
    pub fn new(
        metadata: &EventMetadata,
        aggregate_id: Uuid,
        aggregate_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: metadata.event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: metadata.event_type.clone(),
            version: metadata.version.clone(),
            correlation_id: metadata.correlation_id,
            causation_id: metadata.causation_id,
            payload,
            status: OutboxStatus::Pending,
            retry_count: 0,
            max_retries: DEFAULT_OUTBOX_MAX_RETRIES,
            created_at: now,
            occurred_at: metadata.occurred_at,
            published_at: None,
            scheduled_at: now,
            last_error: None,
            failed_at: None,
            archived_at: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Pending and due at `before`
    pub fn is_due(&self, before: DateTime<Utc>) -> bool {
        self.status == OutboxStatus::Pending && self.scheduled_at <= before
    }

    /// PENDING -> PUBLISHED; false for any other status
    pub fn mark_published(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != OutboxStatus::Pending {
            return false;
        }
        self.status = OutboxStatus::Published;
        self.published_at = Some(now);
        true
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        self.status = OutboxStatus::Failed;
        self.last_error = Some(error.into());
        self.failed_at = Some(at);
    }

    /// Record a failed relay attempt at `now`.
    ///
    /// Becomes a dead letter once `retry_count + 1 >= max_retries`, otherwise
    /// stays pending and is rescheduled to `next_attempt_at`.
    pub fn record_failure(
        &mut self,
        error: &str,
        now: DateTime<Utc>,
        next_attempt_at: DateTime<Utc>,
    ) -> OutboxStatus {
        let attempts = self.retry_count + 1;
        if attempts >= self.max_retries {
            self.mark_failed(exhausted_message(self.max_retries, error), now);
        } else {
            self.retry_count = attempts;
            self.last_error = Some(error.to_string());
            self.scheduled_at = next_attempt_at;
        }
        self.status
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    /// Dead letter (archived or not) -> PENDING with a fresh retry budget;
    /// false otherwise
    pub fn reset_for_retry(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != OutboxStatus::Failed {
            return false;
        }
        self.status = OutboxStatus::Pending;
        self.retry_count = 0;
        self.scheduled_at = now;
        self.failed_at = None;
        self.archived_at = None;
        true
    }

    /// Unarchived dead letter -> archived; false otherwise
    pub fn archive(&mut self, at: DateTime<Utc>) -> bool {
        if self.status != OutboxStatus::Failed || self.is_archived() {
            return false;
        }
        self.archived_at = Some(at);
        true
    }

    /// What dead-letter processing does with this row.
    ///
    /// Rows created before `archive_before` are archived whatever the error;
    /// younger rows are requeued only when their last error looks transient.
    pub fn dead_letter_action(&self, archive_before: DateTime<Utc>) -> DeadLetterAction {
        if self.created_at < archive_before {
            return DeadLetterAction::Archive;
        }
        match self.last_error.as_deref() {
            Some(error) if is_transient_error(error) => DeadLetterAction::Requeue,
            _ => DeadLetterAction::Archive,
        }
    }
}

/// Error text stored on a dead letter
pub fn exhausted_message(max_retries: u32, error: &str) -> String {
    format!("Max retries ({}) exceeded. Last error: {}", max_retries, error)
}

/// Lowercase fragments of errors worth another relay round
const TRANSIENT_ERROR_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "unavailable",
    "rate limit",
    "database locked",
    "502",
    "503",
    "504",
];

/// Whether a stored relay error is likely to clear up on its own
pub fn is_transient_error(error: &str) -> bool {
    let error = error.to_lowercase();
    TRANSIENT_ERROR_PATTERNS
        .iter()
        .any(|pattern| error.contains(pattern))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterAction {
    /// Back to PENDING with a fresh retry budget
    Requeue,
    /// Kept as a dead letter for manual inspection, never requeued automatically
    Archive,
}

/// Row counts per status; `failed` excludes archived dead letters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxStats {
    pub pending: u64,
    pub published: u64,
    pub failed: u64,
    pub archived: u64,
}

impl OutboxStats {
    pub fn total(&self) -> u64 {
        self.pending + self.published + self.failed + self.archived
    }
}

/// Relay health over a recent window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMetrics {
    pub window_start: DateTime<Utc>,
    /// Current queue depth
    pub pending: u64,
    pub published_in_window: u64,
    /// Rows that became dead letters inside the window
    pub failed_in_window: u64,
    /// Mean `published_at - created_at` of rows published inside the window
    pub average_latency_ms: f64,
    pub oldest_pending_at: Option<DateTime<Utc>>,
}

impl OutboxMetrics {
    /// Share of dead letters among rows settled inside the window
    pub fn failure_rate(&self) -> f64 {
        let settled = self.published_in_window + self.failed_in_window;
        if settled == 0 {
            return 0.0;
        }
        self.failed_in_window as f64 / settled as f64
    }

    pub fn oldest_pending_age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.oldest_pending_at.map(|at| now - at)
    }
}
