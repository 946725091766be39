//! Bounded outbound message queue.
//!
//! Holds messages issued while no connection is open. When full, the
//! oldest entry is evicted to make room for the new one.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::collections::vec_deque::Iter;

use tokio::time::Instant;

use crate::protocol::Payload;

// ============================================================================
// QueuedMessage
// ============================================================================

/// A message waiting for the connection to open.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    /// The message as handed to `send()`.
    pub payload: Payload,
    /// When the message was queued.
    pub enqueued_at: Instant,
}

impl QueuedMessage {
    /// Wraps a payload, stamping it with the current time.
    #[inline]
    #[must_use]
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            enqueued_at: Instant::now(),
        }
    }
}

// ============================================================================
// MessageQueue
// ============================================================================

/// FIFO buffer with oldest-first eviction.
#[derive(Debug, Clone)]
pub struct MessageQueue {
    /// Entries, oldest at the front.
    entries: VecDeque<QueuedMessage>,
    /// Maximum number of entries.
    capacity: usize,
}

impl MessageQueue {
    /// Creates an empty queue holding at most `capacity` messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Appends a message, evicting the oldest one if the queue is full.
    ///
    /// Returns the evicted message. With a capacity of zero nothing is
    /// stored and the new message itself is returned.
    pub fn enqueue(&mut self, payload: Payload) -> Option<QueuedMessage> {
        let message = QueuedMessage::new(payload);
        if self.capacity == 0 {
            return Some(message);
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(message);
        evicted
    }

    /// Removes and returns the oldest message.
    #[inline]
    pub fn pop_front(&mut self) -> Option<QueuedMessage> {
        self.entries.pop_front()
    }

    /// Puts a message back at the front after a failed send.
    ///
    /// Does not evict; the message was already accounted for.
    #[inline]
    pub fn push_front(&mut self, message: QueuedMessage) {
        self.entries.push_front(message);
    }

    /// Returns the number of queued messages.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if the next enqueue will evict.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Returns the maximum number of messages.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discards all queued messages.
    #[inline]
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterates over queued messages, oldest first.
    #[inline]
    pub fn iter(&self) -> Iter<'_, QueuedMessage> {
        self.entries.iter()
    }

    /// Returns clones of the queued payloads, oldest first.
    #[must_use]
    pub fn payloads(&self) -> Vec<Payload> {
        self.entries.iter().map(|m| m.payload.clone()).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
