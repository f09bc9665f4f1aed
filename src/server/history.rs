//! Bounded per-room message history
//!
//! Each room keeps the most recent messages in a FIFO log: appending beyond
//! capacity evicts the oldest entry first, and the relative order of the rest
//! is preserved. The log is replayed once, oldest first, to every session
//! that joins the room.

use std::collections::VecDeque;

/// A recorded chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Display name of the sender at the time of sending
    pub sender: String,
    /// Message text, after emoticon substitution
    pub text: String,
}

impl Message {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
        }
    }
}

/// Bounded FIFO log of recent messages
#[derive(Debug)]
pub struct History {
    entries: VecDeque<Message>,
    capacity: usize,
}

impl History {
    /// Create an empty history holding at most `capacity` messages
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a message, evicting the oldest entry when at capacity
    pub fn push(&mut self, message: Message) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(message);
    }

    /// Current entries, oldest first
    pub fn snapshot(&self) -> Vec<Message> {
        self.entries.iter().cloned().collect()
    }

    /// Iterate current entries, oldest first, without cloning
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    /// Number of retained messages
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no messages are retained
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained messages
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
