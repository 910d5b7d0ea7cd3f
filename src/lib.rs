pub mod client;
pub mod config;
pub mod conflation;
mod error;
pub mod listener;
pub mod model;
pub mod monitor;
pub mod network;

pub use client::SocketManager;
pub use config::{SocketConfig, SocketConfigBuilder};
pub use error::ForgeError;
pub use listener::{ListenerId, EVENT_CLOSE, EVENT_ERROR, EVENT_MESSAGE, EVENT_OPEN};
pub use model::{Frame, OutboundMessage, Priority, SocketStats, TrafficCounters};
pub use monitor::{HealthMetrics, LoadLevel, MonitorConfig, PerformanceMonitor, StatsSource};
pub use network::{ConnectionPhase, Connector, Transport, WsConnector};
