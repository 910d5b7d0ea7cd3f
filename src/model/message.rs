use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Delivery urgency of an outbound message.
///
/// The derived ordering is the flush order: `High` sorts before `Normal`,
/// which sorts before `Low`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Flushed immediately, bypassing the batch timer.
    High,
    #[default]
    Normal,
    /// Used for coalesced buffer output.
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message waiting in the outbound queue.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// Message type, sent on the wire as `type`
    pub kind: String,
    /// Message body, sent on the wire as `data`
    pub payload: Value,
    pub priority: Priority,
}

impl OutboundMessage {
    pub fn new(kind: impl Into<String>, payload: Value, priority: Priority) -> Self {
        Self {
            kind: kind.into(),
            payload,
            priority,
        }
    }
}
