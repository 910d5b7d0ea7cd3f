use serde::Serialize;

use crate::network::state::ConnectionPhase;

/// Running traffic counters for a manager's lifetime.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TrafficCounters {
    /// Messages handed to the transport (after coalescing)
    pub messages_sent: u64,
    /// Wire frames handed to the transport
    pub frames_sent: u64,
    /// Inbound messages dispatched (batch members counted individually)
    pub messages_received: u64,
    /// Payloads folded into coalesced messages
    pub messages_coalesced: u64,
    /// Inbound frames that failed to parse
    pub parse_errors: u64,
    /// Queued messages trimmed by the queue cap
    pub messages_dropped: u64,
}

/// Point-in-time snapshot returned by `SocketManager::stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SocketStats {
    pub queue_length: usize,
    pub buffered_types: Vec<String>,
    pub reconnect_attempts: u32,
    pub is_connected: bool,
    pub registered_events: Vec<String>,
    pub listener_count: usize,
    pub phase: ConnectionPhase,
    pub counters: TrafficCounters,
}
