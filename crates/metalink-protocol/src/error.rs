//! Error types for the protocol layer.
//!
//! Each crate in Metalink defines its own error enum. A `ProtocolError`
//! always means the problem is in turning envelopes into text or back,
//! never in the network or the connection state machine.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into a frame).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning a frame into a Rust value).
    ///
    /// Common causes: malformed JSON, wrong field types, truncated frames.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame decoded but violates the envelope rules, e.g. a request
    /// without an id or a peer call without a method.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
