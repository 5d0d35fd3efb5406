//! Handshake state and the handshake-gated message queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::protocol::SyncMessage;

/// Default bound of the queue of messages waiting for the handshake.
pub const DEFAULT_PENDING_CAPACITY: usize = 256;

/// Connection state: `unestablished → established`, never back.
#[derive(Debug, Default)]
pub struct Handshake {
    established: AtomicBool,
}

impl Handshake {
    /// A fresh, unestablished handshake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the handshake as established.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn establish(&self) -> bool {
        self.established
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether the handshake has completed.
    #[must_use]
    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::Acquire)
    }
}

/// Bounded FIFO of messages that arrived before the handshake.
///
/// When full, the oldest message is dropped.
#[derive(Debug)]
pub struct PendingQueue {
    messages: VecDeque<SyncMessage>,
    capacity: usize,
    dropped: usize,
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_CAPACITY)
    }
}

impl PendingQueue {
    /// Create a queue holding at most `capacity` messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Queue a message, dropping the oldest if full.
    pub fn push(&mut self, message: SyncMessage) {
        if self.messages.len() == self.capacity {
            if let Some(oldest) = self.messages.pop_front() {
                self.dropped += 1;
                tracing::warn!(kind = ?oldest.kind(), "Pre-handshake queue full, dropping oldest message");
            }
        }
        self.messages.push_back(message);
    }

    /// Take every queued message in arrival order.
    pub fn drain(&mut self) -> Vec<SyncMessage> {
        self.messages.drain(..).collect()
    }

    /// Number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// How many messages were dropped because the queue was full.
    #[must_use]
    pub const fn dropped(&self) -> usize {
        self.dropped
    }
}
