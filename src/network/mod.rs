//! Socket plumbing: the connection task, its transport seam, lifecycle
//! phases and reconnect backoff.

pub mod backoff;
pub(crate) mod connection;
#[cfg(test)]
pub(crate) mod mock;
pub mod state;
pub mod transport;

pub use backoff::Backoff;
pub use state::ConnectionPhase;
pub use transport::{Connector, Transport, WsConnector, WsTransport};
