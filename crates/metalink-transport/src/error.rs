/// Errors that can occur in the transport layer.
///
/// The variants are split by what the connection layer above has to do
/// about them: a refused dial or a lost connection feed the reconnection
/// logic, everything else is reported and left alone.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The remote end actively refused the connection.
    #[error("connection refused: {0}")]
    Refused(#[source] std::io::Error),

    /// Dialing failed for any reason other than a refusal
    /// (bad address, DNS, failed WebSocket upgrade, TLS).
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// An established connection went away without a closing handshake.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The connection was closed and can no longer carry frames.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),
}

impl TransportError {
    /// Returns `true` if the peer refused the connection attempt.
    pub fn is_refused(&self) -> bool {
        matches!(self, Self::Refused(_))
    }

    /// Returns `true` if an established connection dropped abruptly.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refused_is_classified() {
        let err = TransportError::Refused(std::io::Error::from(
            std::io::ErrorKind::ConnectionRefused,
        ));
        assert!(err.is_refused());
        assert!(!err.is_connection_lost());
    }

    #[test]
    fn test_lost_is_classified() {
        let err = TransportError::ConnectionLost("reset".into());
        assert!(err.is_connection_lost());
        assert!(!err.is_refused());
        assert!(err.to_string().contains("reset"));
    }
}
