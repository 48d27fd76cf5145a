//! Subscription ledger: the channels this client means to stay subscribed to.

/// Ordered set of channel names.
///
/// Entries are added when a subscribe is acknowledged and removed when an
/// unsubscribe is acknowledged. After every successful (re)authentication
/// the whole ledger is replayed; it is only emptied by an explicit close.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionLedger {
    channels: Vec<String>,
}

impl SubscriptionLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records a channel. Adding a channel twice keeps one entry.
    pub(crate) fn insert(&mut self, channel: &str) {
        if !self.contains(channel) {
            self.channels.push(channel.to_owned());
        }
    }

    /// Forgets a channel. Absent channels are ignored.
    pub(crate) fn remove(&mut self, channel: &str) {
        self.channels.retain(|c| c != channel);
    }

    pub(crate) fn contains(&self, channel: &str) -> bool {
        self.channels.iter().any(|c| c == channel)
    }

    /// Snapshot of the channels in subscription order, for replay.
    pub(crate) fn channels(&self) -> Vec<String> {
        self.channels.clone()
    }

    pub(crate) fn clear(&mut self) {
        self.channels.clear();
    }
}
