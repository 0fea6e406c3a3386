//! Process-wide counters for the broker session
//!
//! Atomics only; every recorder is a single relaxed operation so the session
//! actor and the dispatcher can call them on hot paths.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector
#[derive(Debug)]
pub struct MetricsCollector {
    // Connection lifecycle
    connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    connections_lost: AtomicU64,
    reconnects_scheduled: AtomicU64,
    reconnects_exhausted: AtomicU64,
    connection_start_time: AtomicU64,

    // Outbound
    messages_published: AtomicU64,
    publishes_dropped: AtomicU64,
    publish_failures: AtomicU64,
    heartbeats_sent: AtomicU64,
    last_heartbeat: AtomicU64,

    // Inbound
    messages_received: AtomicU64,
    messages_malformed: AtomicU64,
    messages_unmatched: AtomicU64,
    callback_panics: AtomicU64,

    started_at: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            connections_lost: AtomicU64::new(0),
            reconnects_scheduled: AtomicU64::new(0),
            reconnects_exhausted: AtomicU64::new(0),
            connection_start_time: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            publishes_dropped: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            heartbeats_sent: AtomicU64::new(0),
            last_heartbeat: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_malformed: AtomicU64::new(0),
            messages_unmatched: AtomicU64::new(0),
            callback_panics: AtomicU64::new(0),
            started_at: AtomicU64::new(current_timestamp()),
        }
    }

    pub fn connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.connected.store(true, Ordering::Relaxed);
        self.connection_start_time
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
        self.connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn connection_lost(&self) {
        self.connections_lost.fetch_add(1, Ordering::Relaxed);
        self.connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn disconnected(&self) {
        self.connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn reconnect_scheduled(&self) {
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnect_exhausted(&self) {
        self.reconnects_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_published(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publish_dropped(&self) {
        self.publishes_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn heartbeat_sent(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
        self.last_heartbeat
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_malformed(&self) {
        self.messages_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_unmatched(&self) {
        self.messages_unmatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn callback_panicked(&self) {
        self.callback_panics.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_duration(&self, now: u64) -> u64 {
        if !self.connected.load(Ordering::Relaxed) {
            return 0;
        }
        let start = self.connection_start_time.load(Ordering::Relaxed);
        if start > 0 { now.saturating_sub(start) } else { 0 }
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        MetricsSnapshot {
            connection: ConnectionMetrics {
                connected: self.connected.load(Ordering::Relaxed),
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connection_failures: self.connection_failures.load(Ordering::Relaxed),
                connections_lost: self.connections_lost.load(Ordering::Relaxed),
                reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
                reconnects_exhausted: self.reconnects_exhausted.load(Ordering::Relaxed),
                connection_duration_seconds: self.connection_duration(now),
            },
            messages: MessageMetrics {
                messages_published: self.messages_published.load(Ordering::Relaxed),
                publishes_dropped: self.publishes_dropped.load(Ordering::Relaxed),
                publish_failures: self.publish_failures.load(Ordering::Relaxed),
                heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
                last_heartbeat: self.last_heartbeat.load(Ordering::Relaxed),
                messages_received: self.messages_received.load(Ordering::Relaxed),
                messages_malformed: self.messages_malformed.load(Ordering::Relaxed),
                messages_unmatched: self.messages_unmatched.load(Ordering::Relaxed),
                callback_panics: self.callback_panics.load(Ordering::Relaxed),
            },
            uptime_seconds: now.saturating_sub(self.started_at.load(Ordering::Relaxed)),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub connection: ConnectionMetrics,
    pub messages: MessageMetrics,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionMetrics {
    pub connected: bool,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connection_failures: u64,
    pub connections_lost: u64,
    pub reconnects_scheduled: u64,
    pub reconnects_exhausted: u64,
    pub connection_duration_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageMetrics {
    pub messages_published: u64,
    pub publishes_dropped: u64,
    pub publish_failures: u64,
    pub heartbeats_sent: u64,
    /// Epoch seconds of the last heartbeat, 0 if none
    pub last_heartbeat: u64,
    pub messages_received: u64,
    pub messages_malformed: u64,
    pub messages_unmatched: u64,
    pub callback_panics: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
