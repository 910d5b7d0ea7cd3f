use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use url::Url;

use super::transport::{Connector, Transport};
use crate::error::ForgeError;

/// Instructions for the connection task's write side.
#[derive(Debug)]
pub(crate) enum WriterCommand {
    Frame(String),
    Close,
}

/// Lifecycle callbacks driven by one connection task.
///
/// Every call carries the dial generation it belongs to, so the receiver can
/// ignore callbacks from a connection it has already abandoned.
pub(crate) trait ConnectionHandler: Send + Sync + 'static {
    /// Socket is open. Returns false if this dial is stale and should be closed.
    fn on_open(self: &Arc<Self>, generation: u64, writer: mpsc::UnboundedSender<WriterCommand>)
        -> bool;

    fn on_frame(self: &Arc<Self>, generation: u64, text: &str);

    /// A frame arrived that could not be turned into text. The connection
    /// stays up.
    fn on_malformed(self: &Arc<Self>, generation: u64, error: &ForgeError);

    fn on_error(self: &Arc<Self>, generation: u64, error: &ForgeError);

    fn on_close(self: &Arc<Self>, generation: u64, reason: &str);
}

/// Dial once and pump frames until the socket closes or the client asks to stop.
///
/// Reconnection is not handled here; `on_close` decides whether another
/// task gets spawned. The handler is held weakly: once every client handle
/// is gone the writer channel closes and the task shuts the socket.
pub(crate) async fn run<C, H>(connector: Arc<C>, url: Url, handler: Weak<H>, generation: u64)
where
    C: Connector,
    H: ConnectionHandler,
{
    info!("Connecting to {}...", url);

    let dialed = connector.connect(&url).await;
    let Some(owner) = handler.upgrade() else {
        info!("Client dropped, abandoning dial");
        if let Ok(mut transport) = dialed {
            transport.close().await;
        }
        return;
    };

    let mut transport = match dialed {
        Ok(transport) => transport,
        Err(e) => {
            error!("Connection failed: {}", e);
            owner.on_error(generation, &e);
            owner.on_close(generation, "connection failed");
            return;
        }
    };

    let (writer, mut commands) = mpsc::unbounded_channel();
    let opened = owner.on_open(generation, writer);
    drop(owner);
    if !opened {
        transport.close().await;
        return;
    }

    let reason = loop {
        tokio::select! {
            inbound = transport.recv() => {
                let Some(owner) = handler.upgrade() else {
                    break None;
                };
                match inbound {
                    Some(Ok(text)) => owner.on_frame(generation, &text),
                    Some(Err(e @ ForgeError::InvalidFrame(_))) => {
                        warn!("Skipping undecodable frame: {}", e);
                        owner.on_malformed(generation, &e);
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        owner.on_error(generation, &e);
                        break Some("transport error");
                    }
                    None => {
                        warn!("Stream ended by peer");
                        break Some("closed by peer");
                    }
                }
            }
            command = commands.recv() => {
                match command {
                    Some(WriterCommand::Frame(frame)) => {
                        if let Err(e) = transport.send(frame).await {
                            error!("Failed to send frame: {}", e);
                            if let Some(owner) = handler.upgrade() {
                                owner.on_error(generation, &e);
                            }
                            break Some("send failed");
                        }
                    }
                    // disconnect() or the session dropped its writer
                    Some(WriterCommand::Close) | None => break None,
                }
            }
        }
    };

    transport.close().await;
    match reason {
        Some(reason) => {
            if let Some(owner) = handler.upgrade() {
                owner.on_close(generation, reason);
            }
        }
        None => info!("Client closed the connection"),
    }
}
