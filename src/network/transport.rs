//! Pluggable socket transport.
//!
//! The connection task only talks to a [`Transport`], which a [`Connector`]
//! dials. Production code uses [`WsConnector`] over `tokio-tungstenite`.

use std::future::Future;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use url::Url;

use crate::error::ForgeError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An open, bidirectional text-frame connection.
pub trait Transport: Send + 'static {
    /// Write one text frame.
    fn send(&mut self, frame: String) -> impl Future<Output = Result<(), ForgeError>> + Send;

    /// Read the next text frame. `None` means the peer closed the connection.
    ///
    /// Must be cancel-safe: it is polled inside `tokio::select!`.
    fn recv(&mut self) -> impl Future<Output = Option<Result<String, ForgeError>>> + Send;

    /// Close the connection, best effort.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Dials new transports for the manager.
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    fn connect(&self, url: &Url) -> impl Future<Output = Result<Self::Transport, ForgeError>> + Send;
}

/// Connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self, url: &Url) -> Result<WsTransport, ForgeError> {
        let (stream, response) = connect_async(url.as_str()).await?;
        debug!("Handshake completed with status {}", response.status());
        Ok(WsTransport { stream })
    }
}

pub struct WsTransport {
    stream: WsStream,
}

impl Transport for WsTransport {
    async fn send(&mut self, frame: String) -> Result<(), ForgeError> {
        self.stream.send(Message::Text(frame.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ForgeError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Binary(bytes)) => {
                    return Some(
                        String::from_utf8(bytes.to_vec())
                            .map_err(|e| ForgeError::InvalidFrame(e.to_string())),
                    );
                }
                Ok(Message::Close(frame)) => {
                    debug!("Close frame received: {:?}", frame);
                    return None;
                }
                // tungstenite answers pings on its own
                Ok(other) => trace!("Ignoring control frame: {:?}", other),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Close handshake failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_ws_transport_against_loopback_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

            ws.send(Message::Text("hello".to_string().into())).await.unwrap();
            ws.send(Message::Ping(vec![1, 2].into())).await.unwrap();
            ws.send(Message::Binary(br#"{"type":"bin"}"#.to_vec().into()))
                .await
                .unwrap();
            ws.send(Message::Binary(vec![0xff, 0xfe].into())).await.unwrap();

            // the client's pong may arrive ahead of its text frame
            let received = loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => break text.to_string(),
                    Some(Ok(_)) => continue,
                    other => panic!("unexpected server read: {:?}", other),
                }
            };

            ws.send(Message::Close(None)).await.unwrap();
            received
        });

        let url = Url::parse(&format!("ws://{}", addr)).unwrap();
        let mut transport = WsConnector.connect(&url).await.unwrap();

        assert_eq!(transport.recv().await.unwrap().unwrap(), "hello");
        // ping is skipped, binary is decoded as UTF-8
        assert_eq!(transport.recv().await.unwrap().unwrap(), r#"{"type":"bin"}"#);
        assert!(matches!(
            transport.recv().await,
            Some(Err(ForgeError::InvalidFrame(_)))
        ));

        transport.send("outbound".to_string()).await.unwrap();
        assert!(transport.recv().await.is_none());
        transport.close().await;

        assert_eq!(server.await.unwrap(), "outbound");
    }
}
