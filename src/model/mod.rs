pub mod frame;
pub mod message;
pub mod stats;

pub use frame::Frame;
pub use message::{OutboundMessage, Priority};
pub use stats::{SocketStats, TrafficCounters};
