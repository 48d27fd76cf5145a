//! Codec trait and implementations for turning envelopes into frames.
//!
//! A "codec" (coder/decoder) converts between Rust types and the text
//! frames the transport carries. The connection layer doesn't care HOW
//! envelopes are serialized, it only needs something that implements
//! [`Codec`].
//!
//! The broker protocol is JSON, one object per frame, so [`JsonCodec`] is
//! the only implementation today.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that encodes Rust types to text frames and decodes them back.
///
/// `Send + Sync + 'static` because the codec lives inside the connection
/// actor task for as long as the connection exists.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into one text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes one text frame back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the frame is malformed or
    /// doesn't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        frame: &str,
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use metalink_protocol::{Codec, Command, Envelope, JsonCodec, RequestId};
/// use serde_json::json;
///
/// let codec = JsonCodec;
/// let envelope = Envelope::request(
///     RequestId::from_counter(1),
///     Command::SrvSubscribe,
///     json!({ "channel": "alerts" }),
/// );
///
/// let frame = codec.encode(&envelope).unwrap();
/// assert_eq!(frame, r#"{"r":"c1","c":21,"p":{"channel":"alerts"}}"#);
///
/// let decoded: Envelope = codec.decode(&frame).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        frame: &str,
    ) -> Result<T, ProtocolError> {
        serde_json::from_str(frame).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Command, Envelope};

    #[test]
    fn test_decode_rejects_malformed_json() {
        let result: Result<Envelope, _> = JsonCodec.decode("{not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_wrong_field_type() {
        // `c` must be an integer.
        let result: Result<Envelope, _> =
            JsonCodec.decode(r#"{"r":"c1","c":"auth"}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_tolerates_missing_fields() {
        let env: Envelope = JsonCodec.decode("{}").unwrap();
        assert!(env.request_id.is_none());
        assert!(env.command.is_none());
    }

    #[test]
    fn test_encode_omits_absent_fields() {
        let env = Envelope {
            command: Some(Command::Hello),
            ..Envelope::default()
        };
        assert_eq!(JsonCodec.encode(&env).unwrap(), r#"{"r":null,"c":1}"#);
    }
}
