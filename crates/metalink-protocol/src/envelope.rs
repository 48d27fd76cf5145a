//! The wire envelope: one JSON object per frame.
//!
//! Every frame in either direction is an [`Envelope`]. Which fields are
//! present depends on what the frame is:
//!
//! ```text
//! request        { r, c, p }
//! success reply  { r, c, d, t? }
//! error reply    { r, c, e: { code, message } }
//! ```
//!
//! The struct keeps every field optional so that inbound frames decode
//! even when they are structurally wrong. Deciding whether a decoded frame
//! makes sense is the dispatcher's job, not serde's.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Command, TypeTag, TypedValue};

// ---------------------------------------------------------------------------
// RequestId
// ---------------------------------------------------------------------------

/// Correlates a request with its reply.
///
/// Ids this client generates look like `c1`, `c2`, ... and are unique per
/// connection. Ids the broker generates are opaque strings that are only
/// ever echoed back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Builds the id for the `n`th request of a connection.
    pub fn from_counter(n: u64) -> Self {
        Self(format!("c{n}"))
    }

    /// Returns the id as it appears on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// ErrorBody
// ---------------------------------------------------------------------------

/// Code used when an error carries none of its own.
pub const GENERIC_ERROR_CODE: i64 = 500;

/// The `e` object of an error reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default = "generic_error_code")]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

fn generic_error_code() -> i64 {
    GENERIC_ERROR_CODE
}

impl ErrorBody {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// An error with the generic server-error code.
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(GENERIC_ERROR_CODE, message)
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Envelope {
    /// `r`: always written, `null` when a reply can't be correlated.
    #[serde(rename = "r", default)]
    pub request_id: Option<RequestId>,

    /// `c`: the command code.
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,

    /// `p`: request parameters.
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    /// `d`: success payload.
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// `t`: reference type tag for `d`. Kept as a raw string so unknown
    /// tags degrade to plain data instead of failing the frame.
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,

    /// `e`: error body.
    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Envelope {
    /// Builds an outbound request.
    pub fn request(id: RequestId, command: Command, params: Value) -> Self {
        Self {
            request_id: Some(id),
            command: Some(command),
            params: Some(params),
            ..Self::default()
        }
    }

    /// Builds a success reply. `None` produces a reply without `d`.
    pub fn response(id: Option<RequestId>, value: Option<TypedValue>) -> Self {
        let (data, tag) = match value {
            Some(v) => {
                let (data, tag) = v.into_wire();
                (Some(data), tag)
            }
            None => (None, None),
        };
        Self {
            request_id: id,
            command: Some(Command::Response),
            data,
            type_tag: tag.map(|t| TypeTag::as_str(t).to_owned()),
            ..Self::default()
        }
    }

    /// Builds an error reply.
    pub fn error(id: Option<RequestId>, body: ErrorBody) -> Self {
        Self {
            request_id: id,
            command: Some(Command::Error),
            error: Some(body),
            ..Self::default()
        }
    }

    /// Returns a named string parameter if it is present and non-empty.
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params
            .as_ref()?
            .get(name)?
            .as_str()
            .filter(|s| !s.is_empty())
    }

    /// Returns a named parameter if it is present and not `null`.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params
            .as_ref()?
            .get(name)
            .filter(|v| !v.is_null())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChannelReference, Codec, JsonCodec};
    use serde_json::json;

    #[test]
    fn test_request_id_from_counter() {
        assert_eq!(RequestId::from_counter(7).as_str(), "c7");
        assert_eq!(RequestId::from_counter(7).to_string(), "c7");
    }

    #[test]
    fn test_response_with_reference_carries_tag() {
        let env = Envelope::response(
            Some("s9".into()),
            Some(TypedValue::Channel(ChannelReference {
                service: "svc".into(),
                endpoint: "ep".into(),
                id: "1".into(),
            })),
        );
        let frame = JsonCodec.encode(&env).unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["r"], "s9");
        assert_eq!(value["c"], 2);
        assert_eq!(value["t"], "ChannelReference");
        assert_eq!(value["d"]["id"], "1");
    }

    #[test]
    fn test_response_without_value_omits_data() {
        let env = Envelope::response(Some("s1".into()), None);
        assert_eq!(JsonCodec.encode(&env).unwrap(), r#"{"r":"s1","c":2}"#);
    }

    #[test]
    fn test_uncorrelated_error_has_null_id() {
        let env = Envelope::error(None, ErrorBody::generic("Invalid request."));
        assert_eq!(
            JsonCodec.encode(&env).unwrap(),
            r#"{"r":null,"c":3,"e":{"code":500,"message":"Invalid request."}}"#
        );
    }

    #[test]
    fn test_error_body_defaults_code() {
        let body: ErrorBody = serde_json::from_str(r#"{"message":"boom"}"#).unwrap();
        assert_eq!(body.code, GENERIC_ERROR_CODE);
        assert_eq!(body.to_string(), "boom (500)");
    }

    #[test]
    fn test_error_body_accepts_any_integer_code() {
        let env: Envelope =
            JsonCodec.decode(r#"{"r":"c2","c":3,"e":{"code":-1,"message":"odd"}}"#).unwrap();
        assert_eq!(env.error, Some(ErrorBody::new(-1, "odd")));

        let body: ErrorBody = serde_json::from_str(r#"{"code":70000,"message":"big"}"#).unwrap();
        assert_eq!(body.code, 70000);
    }

    #[test]
    fn test_param_helpers_treat_empty_and_null_as_missing() {
        let env = Envelope {
            params: Some(json!({"endpoint": "", "method": "get", "message": null})),
            ..Envelope::default()
        };
        assert_eq!(env.param_str("endpoint"), None);
        assert_eq!(env.param_str("method"), Some("get"));
        assert!(env.param("message").is_none());
        assert!(env.param("absent").is_none());
    }
}
