//! Session metrics module
//!
//! Counts how sessions end and how long the backend takes to answer.

use std::time::Duration;

use crate::session::{SessionSnapshot, SessionState};

/// Aggregated outcome counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub sessions_started: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub events_processed: u64,
    pub first_event_p50_ms: u64,
    pub first_event_p95_ms: u64,
    pub first_event_p99_ms: u64,
}

/// Collects finished session snapshots
pub struct SessionMetrics {
    stats: SessionStats,
    latency_samples: Vec<u64>,
    max_samples: usize,
}

impl SessionMetrics {
    pub fn new(max_samples: usize) -> Self {
        Self {
            stats: SessionStats::default(),
            latency_samples: Vec::with_capacity(max_samples),
            max_samples,
        }
    }

    pub fn record_started(&mut self) {
        self.stats.sessions_started += 1;
    }

    /// Record a session that reached a terminal state
    pub fn record_finished(&mut self, snapshot: &SessionSnapshot) {
        match snapshot.state {
            SessionState::Completed => self.stats.completed += 1,
            SessionState::Failed => self.stats.failed += 1,
            SessionState::TimedOut => self.stats.timed_out += 1,
            SessionState::Cancelled => self.stats.cancelled += 1,
            _ => return,
        }
        self.stats.events_processed += snapshot.events_received;

        if let Some(first_event_at) = snapshot.first_event_at {
            let latency = (first_event_at - snapshot.started_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            self.record_first_event_latency(latency);
        }
    }

    fn record_first_event_latency(&mut self, latency: Duration) {
        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.remove(0);
        }
        self.latency_samples.push(latency.as_millis() as u64);
    }

    /// Calculate first-event latency percentiles
    pub fn calculate_percentiles(&self) -> (u64, u64, u64) {
        if self.latency_samples.is_empty() {
            return (0, 0, 0);
        }

        let mut sorted = self.latency_samples.clone();
        sorted.sort_unstable();

        let len = sorted.len();
        let p50 = sorted[((len * 50) / 100).min(len - 1)];
        let p95 = sorted[((len * 95) / 100).min(len - 1)];
        let p99 = sorted[((len * 99) / 100).min(len - 1)];

        (p50, p95, p99)
    }

    pub fn stats(&self) -> SessionStats {
        let (p50, p95, p99) = self.calculate_percentiles();
        SessionStats {
            first_event_p50_ms: p50,
            first_event_p95_ms: p95,
            first_event_p99_ms: p99,
            ..self.stats.clone()
        }
    }
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new(1000)
    }
}
