//! Performance monitor: samples socket throughput and host resources.
//!
//! The monitor is an ordinary value. Construct it with a [`StatsSource`]
//! (usually a [`SocketManager`]), `start` it, and `stop` it when done.

mod config;
mod level;
mod metrics;

pub use config::{MonitorConfig, MonitorConfigBuilder};
pub use level::LoadLevel;
pub use metrics::HealthMetrics;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use sysinfo::System;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::client::SocketManager;
use crate::model::stats::{SocketStats, TrafficCounters};
use crate::network::transport::Connector;

/// Anything that can report socket statistics on demand.
pub trait StatsSource: Send + Sync + 'static {
    fn snapshot(&self) -> SocketStats;
}

impl<C: Connector> StatsSource for SocketManager<C> {
    fn snapshot(&self) -> SocketStats {
        self.stats()
    }
}

pub struct PerformanceMonitor {
    /// Atomic level for lock-free reads (0=Nominal, 1=Elevated, 2=Critical)
    level: AtomicU8,
    metrics: RwLock<HealthMetrics>,
    config: MonitorConfig,
    hysteresis: Mutex<HysteresisState>,
    source: Arc<dyn StatsSource>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Consecutive samples pointing away from the current level.
#[derive(Default)]
struct HysteresisState {
    consecutive_higher: u8,
    consecutive_lower: u8,
}

impl PerformanceMonitor {
    /// Create a stopped monitor.
    pub fn new(config: MonitorConfig, source: Arc<dyn StatsSource>) -> Self {
        Self {
            level: AtomicU8::new(LoadLevel::Nominal.as_u8()),
            metrics: RwLock::new(HealthMetrics::default()),
            config,
            hysteresis: Mutex::new(HysteresisState::default()),
            source,
            task: Mutex::new(None),
        }
    }

    /// Create a monitor and spawn its sampling loop.
    ///
    /// The loop holds only a weak reference; dropping the last `Arc` or
    /// calling [`stop`](Self::stop) ends it.
    pub fn start(config: MonitorConfig, source: Arc<dyn StatsSource>) -> Arc<Self> {
        let monitor = Arc::new(Self::new(config, source));
        let weak = Arc::downgrade(&monitor);
        let handle = tokio::spawn(Self::sample_loop(weak, monitor.config.clone()));
        *monitor.task.lock() = Some(handle);

        info!("Performance monitor started with {:?}", monitor.config);
        monitor
    }

    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            info!("Performance monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    #[inline]
    pub fn current_level(&self) -> LoadLevel {
        LoadLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Latest sample.
    pub async fn metrics(&self) -> HealthMetrics {
        self.metrics.read().await.clone()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    async fn sample_loop(weak: Weak<Self>, config: MonitorConfig) {
        let mut sys = System::new();
        let mut ticker = interval(config.sample_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut previous: Option<(TrafficCounters, Instant)> = None;

        loop {
            ticker.tick().await;
            let Some(monitor) = weak.upgrade() else {
                break;
            };

            sys.refresh_cpu_usage();
            sys.refresh_memory();

            let stats = monitor.source.snapshot();
            let now = Instant::now();
            let (prev_counters, elapsed) = match &previous {
                Some((counters, at)) => (Some(counters), now.duration_since(*at).as_secs_f64()),
                None => (None, 0.0),
            };

            let sample = HealthMetrics::from_sample(
                &stats,
                prev_counters,
                elapsed,
                sys.global_cpu_usage() as f64,
                sys.available_memory() / (1024 * 1024),
                sys.total_memory() / (1024 * 1024),
            );
            previous = Some((stats.counters, now));

            monitor.observe(sample).await;
        }
    }

    /// Store a sample and move the level if hysteresis allows.
    pub async fn observe(&self, sample: HealthMetrics) -> LoadLevel {
        {
            let mut metrics = self.metrics.write().await;
            *metrics = sample.clone();
        }

        let old = self.current_level();
        let new = self.level_with_hysteresis(&sample);
        if new != old {
            self.level.store(new.as_u8(), Ordering::Relaxed);
            self.log_transition(old, new, &sample);
        }
        new
    }

    fn classify(&self, metrics: &HealthMetrics) -> LoadLevel {
        if metrics.queue_length >= self.config.critical_queue_depth
            || metrics.cpu_usage_percent > self.config.critical_cpu_threshold
            || (metrics.total_ram_mb > 0
                && metrics.available_ram_mb < self.config.critical_ram_threshold_mb)
        {
            LoadLevel::Critical
        } else if metrics.queue_length >= self.config.elevated_queue_depth
            || metrics.cpu_usage_percent > self.config.elevated_cpu_threshold
        {
            LoadLevel::Elevated
        } else {
            LoadLevel::Nominal
        }
    }

    /// Escalate after `hysteresis_threshold` consecutive samples, relax after
    /// one more than that.
    fn level_with_hysteresis(&self, metrics: &HealthMetrics) -> LoadLevel {
        let mut hysteresis = self.hysteresis.lock();
        let current = self.current_level();
        let raw = self.classify(metrics);

        if raw.as_u8() > current.as_u8() {
            hysteresis.consecutive_higher += 1;
            hysteresis.consecutive_lower = 0;
            if hysteresis.consecutive_higher >= self.config.hysteresis_threshold {
                hysteresis.consecutive_higher = 0;
                return raw;
            }
        } else if raw.as_u8() < current.as_u8() {
            hysteresis.consecutive_lower += 1;
            hysteresis.consecutive_higher = 0;
            if hysteresis.consecutive_lower >= self.config.hysteresis_threshold.saturating_add(1) {
                hysteresis.consecutive_lower = 0;
                return raw;
            }
        } else {
            hysteresis.consecutive_higher = 0;
            hysteresis.consecutive_lower = 0;
        }
        current
    }

    fn log_transition(&self, old: LoadLevel, new: LoadLevel, metrics: &HealthMetrics) {
        match new {
            LoadLevel::Nominal => info!("{} -> {} ({})", old, new, metrics),
            LoadLevel::Elevated => warn!("{} -> {} ({})", old, new, metrics),
            LoadLevel::Critical => warn!("{} -> {} ({}) BACKLOG", old, new, metrics),
        }
    }
}

impl Drop for PerformanceMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}
