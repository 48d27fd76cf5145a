//! Reference values: typed pointers that travel as plain JSON plus a tag.
//!
//! On the wire a reference is an ordinary object in the `d` field. The
//! `t` field next to it names which kind of reference the object is; the
//! receiver uses that tag to rebuild the typed value. No tag means plain
//! data.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Points at an endpoint of a remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApiReference {
    pub service: String,
    pub endpoint: String,
}

impl fmt::Display for ApiReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.endpoint)
    }
}

/// Points at a broadcast channel exposed by a remote service endpoint.
///
/// Its string form is a channel name that can be passed to `subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelReference {
    pub service: String,
    pub endpoint: String,
    /// Subscription id assigned by the owning service.
    pub id: String,
}

impl fmt::Display for ChannelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.service, self.endpoint, self.id)
    }
}

/// Points at an object in a storage bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageReference {
    pub bucket: String,
    #[serde(rename = "objectId")]
    pub object_id: String,
}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.object_id)
    }
}

/// The value of the wire `t` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    ApiReference,
    ChannelReference,
    StorageReference,
}

impl TypeTag {
    /// Returns the tag exactly as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApiReference => "ApiReference",
            Self::ChannelReference => "ChannelReference",
            Self::StorageReference => "StorageReference",
        }
    }

    /// Parses a wire tag. Unrecognised tags yield `None` (plain data).
    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            "ApiReference" => Some(Self::ApiReference),
            "ChannelReference" => Some(Self::ChannelReference),
            "StorageReference" => Some(Self::StorageReference),
            _ => None,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reply payload after the tag has been applied.
///
/// This is the explicit form of "plain data, or one of three reference
/// kinds". Replies travel in both directions: the connection rebuilds
/// `TypedValue`s from inbound replies, and hosting-service handlers return
/// them for outbound replies.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    /// Untagged payload, passed through as-is.
    Plain(Value),
    Api(ApiReference),
    Channel(ChannelReference),
    Storage(StorageReference),
}

impl TypedValue {
    /// Rebuilds a value from the `d` and `t` fields of a reply.
    ///
    /// A missing `d` becomes `null`. A tagged payload that doesn't have the
    /// shape its tag promises is kept as plain data rather than rejected.
    pub fn from_wire(data: Option<Value>, tag: Option<&str>) -> Self {
        let data = data.unwrap_or(Value::Null);
        let Some(tag) = tag.and_then(TypeTag::from_wire) else {
            return Self::Plain(data);
        };

        let typed = match tag {
            TypeTag::ApiReference => {
                serde_json::from_value(data.clone()).map(Self::Api)
            }
            TypeTag::ChannelReference => {
                serde_json::from_value(data.clone()).map(Self::Channel)
            }
            TypeTag::StorageReference => {
                serde_json::from_value(data.clone()).map(Self::Storage)
            }
        };
        typed.unwrap_or(Self::Plain(data))
    }

    /// Splits the value into its wire `d` payload and optional `t` tag.
    pub fn into_wire(self) -> (Value, Option<TypeTag>) {
        match self {
            Self::Plain(data) => (data, None),
            Self::Api(r) => (
                serde_json::json!({ "service": r.service, "endpoint": r.endpoint }),
                Some(TypeTag::ApiReference),
            ),
            Self::Channel(r) => (
                serde_json::json!({
                    "service": r.service,
                    "endpoint": r.endpoint,
                    "id": r.id,
                }),
                Some(TypeTag::ChannelReference),
            ),
            Self::Storage(r) => (
                serde_json::json!({ "bucket": r.bucket, "objectId": r.object_id }),
                Some(TypeTag::StorageReference),
            ),
        }
    }

    /// Returns the plain payload, or `None` for a reference.
    pub fn as_plain(&self) -> Option<&Value> {
        match self {
            Self::Plain(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the tag this value carries on the wire, if any.
    pub fn type_tag(&self) -> Option<TypeTag> {
        match self {
            Self::Plain(_) => None,
            Self::Api(_) => Some(TypeTag::ApiReference),
            Self::Channel(_) => Some(TypeTag::ChannelReference),
            Self::Storage(_) => Some(TypeTag::StorageReference),
        }
    }
}

impl From<Value> for TypedValue {
    fn from(value: Value) -> Self {
        Self::Plain(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_untagged_payload_is_plain() {
        let v = TypedValue::from_wire(Some(json!({"a": 1})), None);
        assert_eq!(v, TypedValue::Plain(json!({"a": 1})));
    }

    #[test]
    fn test_missing_data_is_null() {
        assert_eq!(TypedValue::from_wire(None, None), TypedValue::Plain(Value::Null));
    }

    #[test]
    fn test_channel_reference_is_rebuilt() {
        let v = TypedValue::from_wire(
            Some(json!({"service": "svc", "endpoint": "feed", "id": "42"})),
            Some("ChannelReference"),
        );
        let TypedValue::Channel(r) = v else {
            panic!("expected a channel reference, got {v:?}");
        };
        assert_eq!(r.service, "svc");
        assert_eq!(r.id, "42");
        assert_eq!(r.to_string(), "svc:feed:42");
    }

    #[test]
    fn test_storage_reference_uses_camel_case_object_id() {
        let v = TypedValue::from_wire(
            Some(json!({"bucket": "b", "objectId": "o"})),
            Some("StorageReference"),
        );
        assert_eq!(
            v,
            TypedValue::Storage(StorageReference {
                bucket: "b".into(),
                object_id: "o".into(),
            })
        );
    }

    #[test]
    fn test_unknown_tag_is_plain() {
        let v = TypedValue::from_wire(Some(json!(5)), Some("Mystery"));
        assert_eq!(v, TypedValue::Plain(json!(5)));
    }

    #[test]
    fn test_mis_shaped_reference_falls_back_to_plain() {
        let v = TypedValue::from_wire(Some(json!({"service": "x"})), Some("ApiReference"));
        assert_eq!(v, TypedValue::Plain(json!({"service": "x"})));
    }

    #[test]
    fn test_into_wire_carries_tag() {
        let (data, tag) = TypedValue::Api(ApiReference {
            service: "svc".into(),
            endpoint: "ep".into(),
        })
        .into_wire();
        assert_eq!(tag, Some(TypeTag::ApiReference));
        assert_eq!(data, json!({"service": "svc", "endpoint": "ep"}));

        let (data, tag) = TypedValue::Plain(json!([1, 2])).into_wire();
        assert_eq!(tag, None);
        assert_eq!(data, json!([1, 2]));
    }
}
