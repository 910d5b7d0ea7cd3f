//! Per-type coalescing buffers.
//!
//! Payloads of buffered types accumulate here until a buffer fills up, at
//! which point the whole buffer becomes one low-priority message whose
//! payload is the ordered array of everything collected.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;
use tracing::trace;

use crate::model::message::{OutboundMessage, Priority};

pub struct CoalescingBuffer {
    /// Pending payloads keyed by message type
    pending: HashMap<String, Vec<Value>>,
    /// Order in which buffers were first created, for deterministic draining
    order: VecDeque<String>,
    max_size: usize,
}

impl CoalescingBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            pending: HashMap::new(),
            order: VecDeque::new(),
            max_size: max_size.max(1),
        }
    }

    /// Types that currently hold buffered payloads, oldest buffer first.
    pub fn buffered_types(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Append a payload. Returns the coalesced message once the buffer for
    /// `kind` reaches capacity; the buffer is cleared at that point.
    pub fn push(&mut self, kind: &str, payload: Value) -> Option<OutboundMessage> {
        if !self.pending.contains_key(kind) {
            self.order.push_back(kind.to_string());
        }
        let entries = self.pending.entry(kind.to_string()).or_default();
        entries.push(payload);
        let len = entries.len();

        if len < self.max_size {
            trace!("Buffered {} ({}/{})", kind, len, self.max_size);
            return None;
        }

        self.take(kind)
    }

    /// Coalesce every non-empty buffer, oldest first.
    pub fn drain(&mut self) -> Vec<OutboundMessage> {
        let kinds: Vec<String> = self.order.iter().cloned().collect();
        kinds.iter().filter_map(|kind| self.take(kind)).collect()
    }

    fn take(&mut self, kind: &str) -> Option<OutboundMessage> {
        let payloads = self.pending.remove(kind)?;
        self.order.retain(|k| k != kind);
        Some(OutboundMessage::new(kind, Value::Array(payloads), Priority::Low))
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fills_then_emits_once() {
        let mut buffer = CoalescingBuffer::new(3);

        assert!(buffer.push("chat:typing", json!({"user": 1})).is_none());
        assert!(buffer.push("chat:typing", json!({"user": 2})).is_none());
        let msg = buffer.push("chat:typing", json!({"user": 3})).unwrap();

        assert_eq!(msg.kind, "chat:typing");
        assert_eq!(msg.priority, Priority::Low);
        assert_eq!(
            msg.payload,
            json!([{"user": 1}, {"user": 2}, {"user": 3}])
        );
        assert!(buffer.is_empty());
        assert!(buffer.buffered_types().is_empty());
    }

    #[test]
    fn test_types_are_independent() {
        let mut buffer = CoalescingBuffer::new(2);

        assert!(buffer.push("a", json!(1)).is_none());
        assert!(buffer.push("b", json!(2)).is_none());
        assert_eq!(buffer.buffered_types(), vec!["a", "b"]);

        let msg = buffer.push("b", json!(3)).unwrap();
        assert_eq!(msg.payload, json!([2, 3]));
        assert_eq!(buffer.buffered_types(), vec!["a"]);
        assert_eq!(buffer.drain()[0].payload, json!([1]));
    }

    #[test]
    fn test_drain_partial_buffers() {
        let mut buffer = CoalescingBuffer::new(10);
        buffer.push("x", json!(1));
        buffer.push("y", json!(2));
        buffer.push("x", json!(3));

        let drained = buffer.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].kind, "x");
        assert_eq!(drained[0].payload, json!([1, 3]));
        assert_eq!(drained[1].kind, "y");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_size_one_emits_immediately() {
        let mut buffer = CoalescingBuffer::new(1);
        let msg = buffer.push("a", json!("x")).unwrap();
        assert_eq!(msg.payload, json!(["x"]));
    }
}
