//! JSON wire frames.
//!
//! A single message travels as `{"type": <kind>, "data": <payload>}`. A group
//! of messages travels as `{"type": "batch", "data": [<frame>, ...]}`. Inbound
//! batch frames are flattened back into their member frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::OutboundMessage;

/// Frame type reserved for batched groups.
pub const BATCH_TYPE: &str = "batch";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    fn is_batch(&self) -> bool {
        self.kind == BATCH_TYPE
    }

    /// Encode a flushed batch. One message is sent as a plain frame, more
    /// than one as a `batch` frame.
    pub fn encode_batch(messages: Vec<OutboundMessage>) -> Result<String, serde_json::Error> {
        let mut frames: Vec<Frame> = messages
            .into_iter()
            .map(|m| Frame::new(m.kind, m.payload))
            .collect();

        if frames.len() == 1 {
            if let Some(frame) = frames.pop() {
                return serde_json::to_string(&frame);
            }
        }

        let data = serde_json::to_value(frames)?;
        serde_json::to_string(&Frame::new(BATCH_TYPE, data))
    }

    /// Parse an inbound text frame into the messages it carries.
    pub fn decode(raw: &str) -> Result<Vec<Frame>, serde_json::Error> {
        let frame: Frame = serde_json::from_str(raw)?;

        if !frame.is_batch() {
            return Ok(vec![frame]);
        }

        match frame.data {
            Value::Array(items) => items
                .into_iter()
                .map(serde_json::from_value::<Frame>)
                .collect(),
            // A "batch" without an array body is delivered as-is
            other => Ok(vec![Frame::new(BATCH_TYPE, other)]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::message::Priority;
    use serde_json::json;

    #[test]
    fn test_single_message_is_plain_frame() {
        let raw = Frame::encode_batch(vec![OutboundMessage::new(
            "chat:message",
            json!({"text": "hi"}),
            Priority::Normal,
        )])
        .unwrap();

        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, json!({"type": "chat:message", "data": {"text": "hi"}}));
    }

    #[test]
    fn test_multiple_messages_are_batched() {
        let raw = Frame::encode_batch(vec![
            OutboundMessage::new("a", json!(1), Priority::High),
            OutboundMessage::new("b", json!(2), Priority::Low),
        ])
        .unwrap();

        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "batch");
        assert_eq!(value["data"][0], json!({"type": "a", "data": 1}));
        assert_eq!(value["data"][1], json!({"type": "b", "data": 2}));
    }

    #[test]
    fn test_decode_flattens_batch() {
        let frames =
            Frame::decode(r#"{"type":"batch","data":[{"type":"x","data":1},{"type":"y"}]}"#)
                .unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], Frame::new("x", json!(1)));
        assert_eq!(frames[1], Frame::new("y", Value::Null));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(Frame::decode("not json").is_err());
        assert!(Frame::decode(r#"{"data": 1}"#).is_err());
    }
}
