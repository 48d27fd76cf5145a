//! Command queue: serialized frames waiting for the connection to open.

use std::collections::VecDeque;

/// FIFO buffer of pre-encoded outbound frames.
#[derive(Debug, Default)]
pub(crate) struct CommandQueue {
    frames: VecDeque<String>,
}

impl CommandQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, frame: String) {
        self.frames.push_back(frame);
    }

    /// Takes the oldest frame.
    pub(crate) fn pop(&mut self) -> Option<String> {
        self.frames.pop_front()
    }

    /// Puts a frame back at the head, ahead of everything still queued.
    /// Used when a flush stops halfway so nothing is lost or reordered.
    pub(crate) fn push_front(&mut self, frame: String) {
        self.frames.push_front(frame);
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }
}
