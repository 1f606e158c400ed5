//! Process-wide counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters, never reset while the process runs.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Events successfully dispatched to a handler.
    pub processed_events: AtomicU64,
    /// Notifications handed off for delivery.
    pub total_sent: AtomicU64,
}

/// Point-in-time view of the counters, as exposed by the API.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricsSnapshot {
    pub processed_events: u64,
    pub total_sent: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            processed_events: self.processed_events.load(Ordering::Relaxed),
            total_sent: self.total_sent.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_increments() {
        let metrics = Metrics::new();
        metrics.processed_events.fetch_add(3, Ordering::Relaxed);
        metrics.total_sent.fetch_add(2, Ordering::Relaxed);

        let snap = metrics.snapshot();
        assert_eq!(snap.processed_events, 3);
        assert_eq!(snap.total_sent, 2);
    }
}
