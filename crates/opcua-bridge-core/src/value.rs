//! Typed values delivered by change notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Built-in data kind of a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    /// No value
    Null,
    /// Boolean
    Boolean,
    /// Signed 8-bit integer
    SByte,
    /// Unsigned 8-bit integer
    Byte,
    /// Signed 16-bit integer
    Int16,
    /// Unsigned 16-bit integer
    UInt16,
    /// Signed 32-bit integer
    Int32,
    /// Unsigned 32-bit integer
    UInt32,
    /// Signed 64-bit integer
    Int64,
    /// Unsigned 64-bit integer
    UInt64,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// UTF-8 string
    String,
    /// Point in time
    DateTime,
    /// GUID
    Guid,
    /// Opaque byte string
    ByteString,
    /// XML fragment
    XmlElement,
    /// Node identifier
    NodeId,
    /// Expanded node identifier
    ExpandedNodeId,
    /// Status code
    StatusCode,
    /// Namespace-qualified name
    QualifiedName,
    /// Localized text
    LocalizedText,
    /// Structured value
    ExtensionObject,
    /// Nested data value
    DataValue,
    /// Nested variant
    Variant,
    /// Diagnostic information
    DiagnosticInfo,
}

/// Dimensionality of a variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArrayKind {
    /// Single value
    #[default]
    Scalar,
    /// One-dimensional array
    Array,
    /// Multi-dimensional array
    Matrix,
}

/// A value tagged with its data kind and array kind.
///
/// The payload is kept in its JSON form so it can flow unchanged into the
/// event's `meta` and `value` fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    /// Data kind
    pub data_type: DataKind,
    /// Array kind
    pub array_type: ArrayKind,
    /// Native value
    pub value: serde_json::Value,
}

impl Variant {
    /// Create a scalar variant.
    #[must_use]
    pub fn scalar(data_type: DataKind, value: impl Into<serde_json::Value>) -> Self {
        Self {
            data_type,
            array_type: ArrayKind::Scalar,
            value: value.into(),
        }
    }

    /// Create a one-dimensional array variant.
    #[must_use]
    pub fn array(data_type: DataKind, values: Vec<serde_json::Value>) -> Self {
        Self {
            data_type,
            array_type: ArrayKind::Array,
            value: serde_json::Value::Array(values),
        }
    }

    /// Whether the variant holds a single value.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.array_type == ArrayKind::Scalar
    }
}

/// A variant together with the timestamps reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataValue {
    /// The value
    pub value: Variant,
    /// When the source produced the value
    pub source_timestamp: Option<DateTime<Utc>>,
    /// When the server observed the value
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// Wrap a variant without timestamps.
    #[must_use]
    pub fn new(value: Variant) -> Self {
        Self {
            value,
            source_timestamp: None,
            server_timestamp: None,
        }
    }

    /// Set the server timestamp.
    #[must_use]
    pub fn with_server_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.server_timestamp = Some(timestamp);
        self
    }

    /// Server timestamp in milliseconds since the epoch, `0` when absent.
    #[must_use]
    pub fn server_timestamp_ms(&self) -> i64 {
        self.server_timestamp
            .map_or(0, |timestamp| timestamp.timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn server_timestamp_in_millis() {
        let timestamp = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let value =
            DataValue::new(Variant::scalar(DataKind::Double, 21.5)).with_server_timestamp(timestamp);
        assert_eq!(value.server_timestamp_ms(), 1_700_000_000_000);
    }

    #[test]
    fn missing_server_timestamp_is_zero() {
        let value = DataValue::new(Variant::scalar(DataKind::Int32, 7));
        assert_eq!(value.server_timestamp_ms(), 0);
    }

    #[test]
    fn variant_envelope_shape() {
        let variant = Variant::scalar(DataKind::String, "on");
        let json = serde_json::to_value(&variant).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"dataType": "String", "arrayType": "Scalar", "value": "on"})
        );
    }
}
