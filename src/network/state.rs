//! Connection lifecycle phases.

use serde::Serialize;

/// Where the manager is in its connection lifecycle.
///
/// ```text
/// Disconnected -> Connecting -> Connected -> (close|error) -> Reconnecting -> Connecting ...
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    /// No socket and no retry pending. Initial and terminal state.
    #[default]
    Disconnected,
    /// A dial is in flight.
    Connecting,
    /// Socket open, frames flow.
    Connected,
    /// Waiting out a backoff delay before the next dial.
    Reconnecting,
}

impl ConnectionPhase {
    /// True while a dial is in flight or the socket is open.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
