// Background loop constants (no magic values)
use std::time::Duration;

/// Poll interval while draining queues on graceful shutdown (10ms)
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Maximum wait for a background loop to exit after the shutdown signal (5s)
pub const LOOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);
