//! Relay metrics for observability

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Process-wide relay counters
#[derive(Debug, Default)]
pub struct RelayMetrics {
    // Connection metrics
    /// Currently open connections
    pub active_connections: AtomicU64,
    /// Connections opened since start
    pub total_connections: AtomicU64,

    // Message metrics
    /// Text messages accepted from peers
    pub messages_received: AtomicU64,
    /// Frames queued for peers (live and replayed)
    pub frames_sent: AtomicU64,
    /// History entries replayed to joining peers
    pub history_replayed: AtomicU64,

    // Error metrics
    /// Writes that failed during broadcast or replay
    pub write_failures: AtomicU64,
    /// Connections dropped for breaking framing rules
    pub protocol_violations: AtomicU64,

    start_time: Option<Instant>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn history_replayed(&self, entries: usize) {
        self.history_replayed
            .fetch_add(entries as u64, Ordering::Relaxed);
        self.frames_sent.fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub fn write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_violation(&self) {
        self.protocol_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                received: self.messages_received.load(Ordering::Relaxed),
                sent: self.frames_sent.load(Ordering::Relaxed),
                replayed: self.history_replayed.load(Ordering::Relaxed),
            },
            errors: ErrorMetrics {
                write_failures: self.write_failures.load(Ordering::Relaxed),
                protocol_violations: self.protocol_violations.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub messages: MessageMetrics,
    pub errors: ErrorMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub sent: u64,
    pub replayed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub write_failures: u64,
    pub protocol_violations: u64,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub connections: u64,
    pub history_len: usize,
    pub uptime_secs: u64,
    pub metrics: MetricsSnapshot,
}
