//! Lifecycle notifications broadcast by a connection.

use std::fmt;
use std::sync::Arc;

use crate::ClientError;

/// Why the connection is reconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectCause {
    /// An established connection dropped without a closing handshake.
    ConnectionLost,
    /// The broker refused the dial.
    ConnectionRefused,
}

impl fmt::Display for ReconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost => f.write_str("Connection lost."),
            Self::ConnectionRefused => f.write_str("Connection refused."),
        }
    }
}

/// Something that happened to the connection as a whole.
///
/// Subscribe with [`Connection::events`](crate::Connection::events). The
/// channel is a broadcast: every subscriber sees every event emitted after
/// it subscribed.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Authenticated, subscriptions replayed, buffered commands flushed.
    Open,
    /// The connection reached its terminal state.
    Close,
    /// The transport went away; a reconnection attempt is scheduled.
    Reconnect(ReconnectCause),
    /// Something failed without ending the connection: a rejected auth,
    /// a failed resubscribe, a dial or send error.
    ConnectionError(Arc<ClientError>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_cause_display() {
        assert_eq!(ReconnectCause::ConnectionLost.to_string(), "Connection lost.");
        assert_eq!(
            ReconnectCause::ConnectionRefused.to_string(),
            "Connection refused."
        );
    }
}
