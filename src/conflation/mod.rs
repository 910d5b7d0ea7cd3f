//! Outbound message shaping.
//!
//! Every message passed to `SocketManager::send` goes through here before it
//! reaches the wire:
//! - **Coalescing**: high-frequency types (typing indicators) collect in
//!   per-type buffers and leave as one low-priority message
//! - **Batching**: queued messages leave in priority order, up to
//!   `max_batch_size` per frame
//! - **Bounding**: the queue trims its oldest entries past `max_queue_size`

pub mod buffer;
pub mod outbox;
pub mod policy;
pub mod queue;

pub use buffer::CoalescingBuffer;
pub use outbox::{Outbox, OutboxCounters, PushOutcome};
pub use policy::{BufferPolicy, TYPING_INDICATOR};
pub use queue::MessageQueue;
