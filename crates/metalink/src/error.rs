//! Unified error type for the Metalink client.

use std::sync::Arc;

use metalink_protocol::{ErrorBody, ProtocolError};
use metalink_transport::TransportError;

/// Everything a [`Connection`](crate::Connection) operation can fail with.
///
/// Lower-layer errors convert automatically through `#[from]`, so the `?`
/// operator works across the transport and protocol crates.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The connection was never activated with `connect`, or it has been
    /// closed. Nothing was sent.
    #[error("Not connected.")]
    NotConnected,

    /// `connect` was called while a transport exists or a dial is running.
    #[error("Already connected.")]
    AlreadyConnected,

    /// The connection was closed while this operation was waiting.
    #[error("connection closed before the operation completed")]
    ConnectionClosed,

    /// The peer answered with an error reply.
    #[error("remote error: {0}")]
    Remote(ErrorBody),

    /// No reply arrived within the configured request timeout.
    #[error("request timed out")]
    Timeout,

    /// The broker rejected the authentication request.
    #[error("authentication rejected: {0}")]
    AuthRejected(ErrorBody),

    /// Re-subscribing a ledger channel after (re)connection failed.
    #[error("resubscribe to {channel} failed: {reason}")]
    ResubscribeFailed { channel: String, reason: ErrorBody },

    /// The first connection attempt failed. Carries the same cause that
    /// was broadcast as a connection-error event.
    #[error("connect failed: {0}")]
    Connect(Arc<ClientError>),

    /// A transport-level error (dial, send, lost connection).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Error returned by a hosting-service handler.
///
/// Becomes the `e` body of the error reply sent back to the broker. A
/// handler error without a code is reported with the generic server-error
/// code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    pub code: Option<i64>,
    pub message: String,
}

impl HandlerError {
    /// An error without a code of its own.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// An error with an explicit numeric code.
    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Converts into the wire error body.
    pub fn into_body(self) -> ErrorBody {
        match self.code {
            Some(code) => ErrorBody::new(code, self.message),
            None => ErrorBody::generic(self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let client_err: ClientError = err.into();
        assert!(matches!(client_err, ClientError::Transport(_)));
        assert!(client_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let client_err: ClientError = err.into();
        assert!(matches!(client_err, ClientError::Protocol(_)));
    }

    #[test]
    fn test_not_connected_message() {
        assert_eq!(ClientError::NotConnected.to_string(), "Not connected.");
    }

    #[test]
    fn test_connect_wraps_shared_cause() {
        let cause = Arc::new(ClientError::AuthRejected(ErrorBody::new(401, "bad token")));
        let err = ClientError::Connect(Arc::clone(&cause));
        assert!(err.to_string().contains("bad token"));
    }

    #[test]
    fn test_handler_error_without_code_becomes_generic() {
        let body = HandlerError::new("boom").into_body();
        assert_eq!(body, ErrorBody::new(500, "boom"));
    }

    #[test]
    fn test_handler_error_keeps_code() {
        let body = HandlerError::with_code(404, "no such method").into_body();
        assert_eq!(body.code, 404);
        assert_eq!(body.message, "no such method");
    }
}
