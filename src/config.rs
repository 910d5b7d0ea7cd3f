//! Socket manager configuration with tunable batching and retry limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::conflation::policy::{BufferPolicy, TYPING_INDICATOR};

/// Configuration for a [`SocketManager`](crate::SocketManager).
///
/// Deserializes from partial JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Messages per wire frame; reaching it flushes immediately (default: 10)
    pub max_batch_size: usize,
    /// Debounce before a non-urgent flush, in milliseconds (default: 50)
    pub max_wait_time_ms: u64,
    /// Payloads collected per buffered type before coalescing (default: 10)
    pub max_buffer_size: usize,
    /// Message types routed through the coalescing buffers (default: chat:typing)
    pub buffered_types: Vec<String>,
    /// Reconnect after an unexpected close (default: true)
    pub reconnect: bool,
    /// Attempts before giving up (default: 5)
    pub max_reconnect_attempts: u32,
    /// Delay before the first retry, in milliseconds (default: 1000)
    pub base_delay_ms: u64,
    /// Upper bound on any retry delay, in milliseconds (default: 30000)
    pub max_delay_ms: u64,
    /// Queued messages kept before the oldest are trimmed (default: 1000)
    pub max_queue_size: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            max_wait_time_ms: 50,
            max_buffer_size: 10,
            buffered_types: vec![TYPING_INDICATOR.to_string()],
            reconnect: true,
            max_reconnect_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_queue_size: 1000,
        }
    }
}

impl SocketConfig {
    /// Create a new config builder.
    pub fn builder() -> SocketConfigBuilder {
        SocketConfigBuilder::default()
    }

    /// Every message goes out on its own frame as soon as it is sent.
    pub fn low_latency() -> Self {
        Self {
            max_batch_size: 1,
            max_wait_time_ms: 0,
            buffered_types: Vec::new(),
            ..Default::default()
        }
    }

    /// Fewer, larger frames for chatty clients on slow links.
    pub fn high_throughput() -> Self {
        Self {
            max_batch_size: 50,
            max_wait_time_ms: 200,
            max_buffer_size: 25,
            ..Default::default()
        }
    }

    pub fn max_wait_time(&self) -> Duration {
        Duration::from_millis(self.max_wait_time_ms)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn buffer_policy(&self) -> BufferPolicy {
        BufferPolicy::new(self.buffered_types.iter().cloned())
    }
}

/// Builder pattern for SocketConfig.
#[derive(Default)]
pub struct SocketConfigBuilder {
    config: SocketConfig,
}

impl SocketConfigBuilder {
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.max_batch_size = size;
        self
    }

    pub fn max_wait_time_ms(mut self, ms: u64) -> Self {
        self.config.max_wait_time_ms = ms;
        self
    }

    pub fn max_buffer_size(mut self, size: usize) -> Self {
        self.config.max_buffer_size = size;
        self
    }

    /// Replace the set of coalesced message types.
    pub fn buffered_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.buffered_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn reconnect(mut self, enabled: bool) -> Self {
        self.config.reconnect = enabled;
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    pub fn base_delay_ms(mut self, ms: u64) -> Self {
        self.config.base_delay_ms = ms;
        self
    }

    pub fn max_delay_ms(mut self, ms: u64) -> Self {
        self.config.max_delay_ms = ms;
        self
    }

    pub fn max_queue_size(mut self, size: usize) -> Self {
        self.config.max_queue_size = size;
        self
    }

    pub fn build(self) -> SocketConfig {
        self.config
    }
}
