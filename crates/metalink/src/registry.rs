//! Request registry: outstanding request ids and what waits on them.
//!
//! The registry hands out request ids and remembers one continuation per
//! outstanding id. A continuation is taken out exactly once, when its reply
//! arrives; after that the id is unknown and any further reply for it is
//! dropped by the caller of [`RequestRegistry::take`].

use std::collections::HashMap;

use metalink_protocol::RequestId;

/// Maps outstanding request ids to their continuations.
///
/// Generic over the continuation type so the correlation rules can be
/// tested without a live connection.
#[derive(Debug)]
pub(crate) struct RequestRegistry<T> {
    pending: HashMap<RequestId, T>,
    /// Last counter value handed out. Ids are never reused.
    last_id: u64,
}

impl<T> RequestRegistry<T> {
    pub(crate) fn new() -> Self {
        Self {
            pending: HashMap::new(),
            last_id: 0,
        }
    }

    /// Allocates the next request id and books `continuation` under it.
    pub(crate) fn register(&mut self, continuation: T) -> RequestId {
        self.last_id += 1;
        let id = RequestId::from_counter(self.last_id);
        self.pending.insert(id.clone(), continuation);
        id
    }

    /// Removes and returns the continuation for `id`.
    ///
    /// Returns `None` for ids that were never issued or were already
    /// resolved.
    pub(crate) fn take(&mut self, id: &RequestId) -> Option<T> {
        self.pending.remove(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// Keeps only the continuations for which `keep` returns true.
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        self.pending.retain(|_, continuation| keep(continuation));
    }

    /// Drops every continuation without resolving it.
    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }
}
