//! Command codes carried in the `c` field of every envelope.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed command enumeration of the broker protocol.
///
/// Codes travel as plain integers. A code outside the table still decodes,
/// as [`Command::Unknown`], so the receiver can answer "undefined command"
/// to the right request instead of failing the whole frame.
///
/// The `cli*` commands are broker → client deliveries; the `srv*` commands
/// are client → broker requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Command {
    /// Handshake greeting from the peer. Ignored.
    Hello,
    /// Success reply.
    Response,
    /// Error reply.
    Error,
    /// Authentication request.
    Auth,
    /// Broker delivers a method call to this service.
    CliCall,
    /// Broker delivers a channel publication to this service.
    CliMessage,
    /// Broker delivers a queue message to this service.
    CliQueueMessage,
    /// Remote method call on another service.
    SrvCall,
    /// Subscribe to a broadcast channel.
    SrvSubscribe,
    /// Unsubscribe from a broadcast channel.
    SrvUnsubscribe,
    /// Publish to a broadcast channel.
    SrvPublish,
    /// Count a channel's subscribers.
    SrvSubscribers,
    /// Start receiving messages from a durable queue.
    SrvSubscribeQueue,
    /// Stop receiving messages from a durable queue.
    SrvUnsubscribeQueue,
    /// Push a message into a durable queue.
    SrvEnqueue,
    /// Any code this client does not know.
    Unknown(i64),
}

impl Command {
    /// Returns the wire code for this command.
    pub fn code(self) -> i64 {
        match self {
            Self::Hello => 1,
            Self::Response => 2,
            Self::Error => 3,
            Self::Auth => 4,
            Self::CliCall => 10,
            Self::CliMessage => 11,
            Self::CliQueueMessage => 12,
            Self::SrvCall => 20,
            Self::SrvSubscribe => 21,
            Self::SrvUnsubscribe => 22,
            Self::SrvPublish => 23,
            Self::SrvSubscribers => 24,
            Self::SrvSubscribeQueue => 25,
            Self::SrvUnsubscribeQueue => 26,
            Self::SrvEnqueue => 27,
            Self::Unknown(code) => code,
        }
    }
}

impl From<i64> for Command {
    fn from(code: i64) -> Self {
        match code {
            1 => Self::Hello,
            2 => Self::Response,
            3 => Self::Error,
            4 => Self::Auth,
            10 => Self::CliCall,
            11 => Self::CliMessage,
            12 => Self::CliQueueMessage,
            20 => Self::SrvCall,
            21 => Self::SrvSubscribe,
            22 => Self::SrvUnsubscribe,
            23 => Self::SrvPublish,
            24 => Self::SrvSubscribers,
            25 => Self::SrvSubscribeQueue,
            26 => Self::SrvUnsubscribeQueue,
            27 => Self::SrvEnqueue,
            other => Self::Unknown(other),
        }
    }
}

impl From<Command> for i64 {
    fn from(command: Command) -> Self {
        command.code()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "unknown({code})"),
            known => write!(f, "{known:?}({})", known.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_map_back_to_themselves() {
        for code in [1i64, 2, 3, 4, 10, 11, 12, 20, 21, 22, 23, 24, 25, 26, 27] {
            let command = Command::from(code);
            assert!(!matches!(command, Command::Unknown(_)), "code {code}");
            assert_eq!(command.code(), code);
        }
    }

    #[test]
    fn test_unknown_code_is_preserved() {
        let command = Command::from(999);
        assert_eq!(command, Command::Unknown(999));
        assert_eq!(command.code(), 999);

        let wide: Command = serde_json::from_str("70000").unwrap();
        assert_eq!(wide, Command::Unknown(70000));
        let negative: Command = serde_json::from_str("-4").unwrap();
        assert_eq!(negative, Command::Unknown(-4));
    }

    #[test]
    fn test_command_serializes_as_integer() {
        let json = serde_json::to_string(&Command::SrvSubscribe).unwrap();
        assert_eq!(json, "21");
        let back: Command = serde_json::from_str("3").unwrap();
        assert_eq!(back, Command::Error);
    }

    #[test]
    fn test_display() {
        assert_eq!(Command::Auth.to_string(), "Auth(4)");
        assert_eq!(Command::Unknown(77).to_string(), "unknown(77)");
    }
}
