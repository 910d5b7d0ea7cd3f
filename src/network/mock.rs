//! In-memory connector for tests.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use super::transport::{Connector, Transport};
use crate::error::ForgeError;

#[derive(Default)]
struct MockState {
    sent: Vec<String>,
    connects: usize,
    failures_left: usize,
    inbound: Option<mpsc::UnboundedSender<Option<Result<String, ForgeError>>>>,
    closed_by_client: usize,
}

/// Records every frame written and lets tests play the server side.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` dials fail.
    pub fn fail_next(&self, n: usize) {
        self.state.lock().failures_left = n;
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .map(|s| serde_json::from_str(s).expect("mock frames are JSON"))
            .collect()
    }

    pub fn closed_by_client(&self) -> usize {
        self.state.lock().closed_by_client
    }

    /// Deliver a text frame to the current connection.
    pub fn push_inbound(&self, text: &str) {
        if let Some(tx) = self.state.lock().inbound.as_ref() {
            let _ = tx.send(Some(Ok(text.to_string())));
        }
    }

    /// Deliver a frame the transport could not decode.
    pub fn push_undecodable(&self, reason: &str) {
        if let Some(tx) = self.state.lock().inbound.as_ref() {
            let _ = tx.send(Some(Err(ForgeError::InvalidFrame(reason.to_string()))));
        }
    }

    /// Simulate the server dropping the current connection.
    pub fn drop_connection(&self) {
        if let Some(tx) = self.state.lock().inbound.take() {
            let _ = tx.send(None);
        }
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, _url: &Url) -> Result<MockTransport, ForgeError> {
        let mut state = self.state.lock();
        state.connects += 1;
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(ForgeError::ConnectionError("connection refused".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.inbound = Some(tx);
        Ok(MockTransport {
            inbound: rx,
            state: Arc::clone(&self.state),
        })
    }
}

pub struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Option<Result<String, ForgeError>>>,
    state: Arc<Mutex<MockState>>,
}

impl Transport for MockTransport {
    async fn send(&mut self, frame: String) -> Result<(), ForgeError> {
        self.state.lock().sent.push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ForgeError>> {
        self.inbound.recv().await.flatten()
    }

    async fn close(&mut self) {
        self.state.lock().closed_by_client += 1;
    }
}
