use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("Network connection failed: {0}")]
    ConnectionError(String),

    #[error("WebSocket error: {0}")]
    SocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Failed to encode or parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal channel closed")]
    ChannelClosed,

    #[error("Invalid URL")]
    UrlParseError(#[from] url::ParseError),

    #[error("No Tokio runtime available: {0}")]
    RuntimeUnavailable(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}
