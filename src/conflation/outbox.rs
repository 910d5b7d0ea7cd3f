//! The Outbox decides what happens to every outbound message.
//!
//! It sits between `SocketManager::send` and the wire, providing:
//! - Coalescing for buffered types
//! - Immediate flush for high priority or a full batch
//! - Debounced flush for everything else
//!
//! The Outbox owns no timers and does no I/O; the manager acts on the
//! returned [`PushOutcome`].

use tracing::{debug, warn};

use crate::config::SocketConfig;
use crate::model::message::{OutboundMessage, Priority};

use super::buffer::CoalescingBuffer;
use super::policy::BufferPolicy;
use super::queue::MessageQueue;

/// What the caller must do after a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Flush the queue now.
    FlushNow,
    /// Arm the batch timer, unless one is already pending.
    ScheduleFlush,
    /// Payload went into a coalescing buffer; nothing to do.
    Buffered,
}

/// Counters the Outbox maintains for stats.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OutboxCounters {
    pub coalesced: u64,
    pub dropped: u64,
}

pub struct Outbox {
    queue: MessageQueue,
    buffers: CoalescingBuffer,
    policy: BufferPolicy,
    max_batch_size: usize,
    counters: OutboxCounters,
}

impl Outbox {
    pub fn new(config: &SocketConfig) -> Self {
        Self {
            queue: MessageQueue::new(config.max_queue_size),
            buffers: CoalescingBuffer::new(config.max_buffer_size),
            policy: config.buffer_policy(),
            max_batch_size: config.max_batch_size.max(1),
            counters: OutboxCounters::default(),
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn has_urgent(&self) -> bool {
        self.queue.has_urgent()
    }

    pub fn buffered_types(&self) -> Vec<String> {
        self.buffers.buffered_types()
    }

    pub fn counters(&self) -> OutboxCounters {
        self.counters
    }

    /// Accept a message from `send`.
    pub fn push(&mut self, message: OutboundMessage) -> PushOutcome {
        if self.policy.is_buffered(&message.kind) {
            return match self.buffers.push(&message.kind, message.payload) {
                Some(coalesced) => {
                    self.record_coalesced(&coalesced);
                    self.enqueue(coalesced)
                }
                None => PushOutcome::Buffered,
            };
        }

        self.enqueue(message)
    }

    /// Move every partially filled buffer into the queue.
    pub fn drain_buffers(&mut self) -> Option<PushOutcome> {
        let mut outcome = None;
        for coalesced in self.buffers.drain() {
            self.record_coalesced(&coalesced);
            let next = self.enqueue(coalesced);
            if outcome != Some(PushOutcome::FlushNow) {
                outcome = Some(next);
            }
        }
        outcome
    }

    /// Take the next batch to put on the wire. `None` when the queue is empty.
    pub fn next_batch(&mut self) -> Option<Vec<OutboundMessage>> {
        let batch = self.queue.take_batch(self.max_batch_size);
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }

    /// Drop everything queued or buffered.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.buffers.clear();
    }

    fn enqueue(&mut self, message: OutboundMessage) -> PushOutcome {
        let urgent = message.priority == Priority::High;
        let trimmed = self.queue.push(message);
        if trimmed > 0 {
            self.counters.dropped += trimmed as u64;
            warn!(
                "Outbound queue full, dropped {} oldest message(s). Total drops: {}",
                trimmed, self.counters.dropped
            );
        }

        if urgent || self.queue.len() >= self.max_batch_size {
            PushOutcome::FlushNow
        } else {
            PushOutcome::ScheduleFlush
        }
    }

    fn record_coalesced(&mut self, message: &OutboundMessage) {
        let folded = message.payload.as_array().map_or(0, Vec::len);
        self.counters.coalesced += folded as u64;
        debug!("Coalesced {} {} payload(s)", folded, message.kind);
    }
}
