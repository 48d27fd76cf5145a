//! Connection configuration and lifecycle state.

use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConnectionConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`Connection`](crate::Connection).
///
/// Start from `ConnectionConfig::default()` and override the fields you
/// care about.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Reconnect after an abnormal closure or a refused dial. When
    /// `false`, any closure is terminal.
    pub reconnect: bool,

    /// Fixed delay before each reconnection attempt.
    ///
    /// Default: 3 seconds.
    pub reconnect_delay: Duration,

    /// Upper bound on how long a caller waits for a reply.
    ///
    /// Default: `None`. Requests whose connection drops before the reply
    /// arrives then stay pending until the connection is closed.
    pub request_timeout: Option<Duration>,

    /// How many lifecycle events a slow event subscriber may fall behind
    /// before it starts missing them.
    pub event_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect: true,
            reconnect_delay: Duration::from_millis(3000),
            request_timeout: None,
            event_capacity: 64,
        }
    }
}

impl ConnectionConfig {
    /// Fixes out-of-range values so the config is safe to use.
    ///
    /// Called automatically when a connection is created.
    /// - `event_capacity` is raised to at least 1.
    /// - A zero `request_timeout` is treated as no timeout.
    pub fn validated(mut self) -> Self {
        if self.event_capacity == 0 {
            tracing::warn!("event_capacity must be at least 1, using 1");
            self.event_capacity = 1;
        }
        if self.request_timeout == Some(Duration::ZERO) {
            tracing::warn!("request_timeout of zero disables the timeout");
            self.request_timeout = None;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Where a connection is in its lifecycle.
///
/// ```text
///  Disconnected ─connect→ Connecting ─open→ Authenticating ─auth ok→ Open
///                              ↑                                      │
///                              └──timer── Reconnecting ←─lost/refused─┘
///
///  any state ─close() / terminal closure→ Closed
/// ```
///
/// Commands issued in any state other than `Open` are buffered and
/// flushed once the connection reaches `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected, or the last dial failed without a reconnect.
    Disconnected,
    /// A dial is in flight.
    Connecting,
    /// The transport is up; waiting for the auth reply, then replaying
    /// subscriptions.
    Authenticating,
    /// Ready. Commands go straight to the transport.
    Open,
    /// Waiting for the reconnection timer.
    Reconnecting,
    /// Terminal. The connection cannot be reused.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ConnectionConfig::default();
        assert!(cfg.reconnect);
        assert_eq!(cfg.reconnect_delay, Duration::from_secs(3));
        assert_eq!(cfg.request_timeout, None);
    }

    #[test]
    fn test_validated_clamps_event_capacity() {
        let cfg = ConnectionConfig {
            event_capacity: 0,
            ..ConnectionConfig::default()
        }
        .validated();
        assert_eq!(cfg.event_capacity, 1);
    }

    #[test]
    fn test_validated_drops_zero_timeout() {
        let cfg = ConnectionConfig {
            request_timeout: Some(Duration::ZERO),
            ..ConnectionConfig::default()
        }
        .validated();
        assert_eq!(cfg.request_timeout, None);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Authenticating.to_string(), "authenticating");
    }
}
