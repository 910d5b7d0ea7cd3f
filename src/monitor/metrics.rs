//! One monitor sample: socket throughput plus host telemetry.

use serde::Serialize;

use crate::model::stats::{SocketStats, TrafficCounters};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthMetrics {
    /// Global CPU usage percentage (0.0 - 100.0)
    pub cpu_usage_percent: f64,
    /// Available RAM in megabytes
    pub available_ram_mb: u64,
    /// Total RAM in megabytes
    pub total_ram_mb: u64,
    /// Outbound messages waiting in the queue
    pub queue_length: usize,
    pub is_connected: bool,
    pub reconnect_attempts: u32,
    /// Wire frames written per second since the previous sample
    pub frames_sent_per_sec: f64,
    /// Inbound messages dispatched per second since the previous sample
    pub messages_received_per_sec: f64,
}

impl HealthMetrics {
    /// Combine a stats snapshot with host figures. Rates are derived from
    /// `previous` over `elapsed_secs`; they are zero on the first sample.
    pub fn from_sample(
        stats: &SocketStats,
        previous: Option<&TrafficCounters>,
        elapsed_secs: f64,
        cpu_usage_percent: f64,
        available_ram_mb: u64,
        total_ram_mb: u64,
    ) -> Self {
        let rate = |now: u64, before: u64| {
            if elapsed_secs <= 0.0 {
                0.0
            } else {
                now.saturating_sub(before) as f64 / elapsed_secs
            }
        };

        let (frames_sent_per_sec, messages_received_per_sec) = match previous {
            Some(prev) => (
                rate(stats.counters.frames_sent, prev.frames_sent),
                rate(stats.counters.messages_received, prev.messages_received),
            ),
            None => (0.0, 0.0),
        };

        Self {
            cpu_usage_percent,
            available_ram_mb,
            total_ram_mb,
            queue_length: stats.queue_length,
            is_connected: stats.is_connected,
            reconnect_attempts: stats.reconnect_attempts,
            frames_sent_per_sec,
            messages_received_per_sec,
        }
    }

    pub fn ram_usage_percent(&self) -> f64 {
        if self.total_ram_mb == 0 {
            0.0
        } else {
            let used = self.total_ram_mb.saturating_sub(self.available_ram_mb);
            (used as f64 / self.total_ram_mb as f64) * 100.0
        }
    }
}

impl std::fmt::Display for HealthMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "queue: {}, out: {:.1} frames/s, in: {:.1} msgs/s, CPU: {:.1}%, RAM: {:.1}% used",
            self.queue_length,
            self.frames_sent_per_sec,
            self.messages_received_per_sec,
            self.cpu_usage_percent,
            self.ram_usage_percent()
        )
    }
}
