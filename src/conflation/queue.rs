//! Bounded outbound queue with priority-ordered batch extraction.

use std::collections::VecDeque;

use crate::model::message::{OutboundMessage, Priority};

/// FIFO of pending messages. Batches are taken in priority order, keeping
/// enqueue order within a tier.
#[derive(Debug)]
pub struct MessageQueue {
    pending: VecDeque<OutboundMessage>,
    max_len: usize,
}

impl MessageQueue {
    pub fn new(max_len: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(max_len.min(1024)),
            max_len: max_len.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Append a message. Returns how many of the oldest entries were trimmed
    /// to stay within the cap.
    pub fn push(&mut self, message: OutboundMessage) -> usize {
        self.pending.push_back(message);

        let mut trimmed = 0;
        while self.pending.len() > self.max_len {
            self.pending.pop_front();
            trimmed += 1;
        }
        trimmed
    }

    /// Whether a `High` message is waiting.
    pub fn has_urgent(&self) -> bool {
        self.pending.iter().any(|m| m.priority == Priority::High)
    }

    /// Remove up to `max` messages, highest priority first.
    ///
    /// The sort is stable, so equal-priority messages keep enqueue order.
    pub fn take_batch(&mut self, max: usize) -> Vec<OutboundMessage> {
        if self.pending.is_empty() || max == 0 {
            return Vec::new();
        }

        self.pending
            .make_contiguous()
            .sort_by_key(|m| m.priority);

        let take = max.min(self.pending.len());
        self.pending.drain(..take).collect()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
