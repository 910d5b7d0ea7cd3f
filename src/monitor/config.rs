//! Monitor configuration with tunable thresholds.

use std::time::Duration;

/// Configuration for the [`PerformanceMonitor`](super::PerformanceMonitor).
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Queue depth to enter Elevated (default: 100)
    pub elevated_queue_depth: usize,
    /// Queue depth to enter Critical (default: 500)
    pub critical_queue_depth: usize,
    /// CPU threshold to enter Elevated (default: 60%)
    pub elevated_cpu_threshold: f64,
    /// CPU threshold to enter Critical (default: 90%)
    pub critical_cpu_threshold: f64,
    /// Free RAM (MB) below which the level is Critical (default: 256 MB)
    pub critical_ram_threshold_mb: u64,
    /// Sampling interval in milliseconds (default: 1000ms)
    pub sample_interval_ms: u64,
    /// Consecutive samples before escalating (default: 2)
    pub hysteresis_threshold: u8,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            elevated_queue_depth: 100,
            critical_queue_depth: 500,
            elevated_cpu_threshold: 60.0,
            critical_cpu_threshold: 90.0,
            critical_ram_threshold_mb: 256,
            sample_interval_ms: 1000,
            hysteresis_threshold: 2,
        }
    }
}

impl MonitorConfig {
    pub fn builder() -> MonitorConfigBuilder {
        MonitorConfigBuilder::default()
    }

    /// Flag pressure early. Suited to latency-sensitive UIs.
    pub fn strict() -> Self {
        Self {
            elevated_queue_depth: 20,
            critical_queue_depth: 100,
            elevated_cpu_threshold: 40.0,
            critical_cpu_threshold: 70.0,
            ..Default::default()
        }
    }

    /// Tolerate deep queues and busy hosts.
    pub fn relaxed() -> Self {
        Self {
            elevated_queue_depth: 400,
            critical_queue_depth: 900,
            elevated_cpu_threshold: 80.0,
            critical_cpu_threshold: 95.0,
            ..Default::default()
        }
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }
}

#[derive(Default)]
pub struct MonitorConfigBuilder {
    config: MonitorConfig,
}

impl MonitorConfigBuilder {
    pub fn elevated_queue_depth(mut self, depth: usize) -> Self {
        self.config.elevated_queue_depth = depth;
        self
    }

    pub fn critical_queue_depth(mut self, depth: usize) -> Self {
        self.config.critical_queue_depth = depth;
        self
    }

    pub fn elevated_cpu(mut self, threshold: f64) -> Self {
        self.config.elevated_cpu_threshold = threshold;
        self
    }

    pub fn critical_cpu(mut self, threshold: f64) -> Self {
        self.config.critical_cpu_threshold = threshold;
        self
    }

    pub fn critical_ram_mb(mut self, threshold: u64) -> Self {
        self.config.critical_ram_threshold_mb = threshold;
        self
    }

    pub fn sample_interval_ms(mut self, interval: u64) -> Self {
        self.config.sample_interval_ms = interval;
        self
    }

    pub fn hysteresis(mut self, threshold: u8) -> Self {
        self.config.hysteresis_threshold = threshold;
        self
    }

    pub fn build(self) -> MonitorConfig {
        self.config
    }
}
