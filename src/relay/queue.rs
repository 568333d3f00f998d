/*!
 * Relay Queue
 * FIFO of execute commands issued before the context reached ready
 */

use super::{RelayError, RelayResult};
use std::collections::VecDeque;

/// Commands beyond this are rejected rather than queued
pub const MAX_QUEUE_CAPACITY: usize = 1024;

/// Ordered pending EXECUTE commands. Flushed in FIFO order on READY,
/// discarded wholesale on reset. No dedup: identical commands queue
/// twice and run twice.
pub struct RelayQueue {
    commands: VecDeque<String>,
    capacity: usize,
}

impl RelayQueue {
    pub fn new() -> Self {
        Self {
            commands: VecDeque::new(),
            capacity: MAX_QUEUE_CAPACITY,
        }
    }

    pub fn push(&mut self, code: String) -> RelayResult<()> {
        if self.commands.len() >= self.capacity {
            return Err(RelayError::QueueFull {
                len: self.commands.len(),
            });
        }
        self.commands.push_back(code);
        Ok(())
    }

    /// Drain every queued command in arrival order
    pub fn drain(&mut self) -> Vec<String> {
        self.commands.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Default for RelayQueue {
    fn default() -> Self {
        Self::new()
    }
}
