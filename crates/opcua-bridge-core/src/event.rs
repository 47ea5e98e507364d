//! Normalized event schema.
//!
//! One [`NormalizedEvent`] is produced per change notification and published
//! as one JSON document:
//!
//! ```json
//! {
//!   "id": "opcua~ns=2;s=Temp",
//!   "name": "OPC UA: Temp",
//!   "user": "opcua",
//!   "meta": { "opcuaDataValue": { "dataType": "Double", "arrayType": "Scalar", "value": 21.5 } },
//!   "valueTypes": [{ "name": "Wert", "unit": "", "type": "Number" }],
//!   "values": [{ "date": 1700000000000, "value": [21.5] }]
//! }
//! ```

use crate::mapping::{map_value, map_value_type, ValueKind, VALUE_LABEL};
use crate::node::NodeId;
use crate::value::DataValue;
use serde::{Deserialize, Serialize};

/// Descriptor of one value column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueType {
    /// Column label
    pub name: String,
    /// Unit hint (`"Date"` for timestamps, otherwise empty)
    pub unit: String,
    /// Normalized type
    #[serde(rename = "type")]
    pub kind: ValueKind,
}

impl ValueType {
    /// Create a descriptor with the fixed value label.
    #[must_use]
    pub fn new(kind: ValueKind, unit: &str) -> Self {
        Self {
            name: VALUE_LABEL.to_string(),
            unit: unit.to_string(),
            kind,
        }
    }
}

/// One timestamped sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSample {
    /// Milliseconds since the epoch, `0` when unknown
    pub date: i64,
    /// One entry per value type
    pub value: Vec<serde_json::Value>,
}

/// The unit handed to the publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    /// Prefixed node identifier
    pub id: String,
    /// Prefixed display name
    pub name: String,
    /// Logical source tag
    #[serde(rename = "user")]
    pub source: String,
    /// Raw value envelope for diagnostics
    pub meta: serde_json::Value,
    /// Value descriptors
    pub value_types: Vec<ValueType>,
    /// Samples
    pub values: Vec<ValueSample>,
}

impl NormalizedEvent {
    /// Encode as a JSON document.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a valid event.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Builds events for a configured source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFactory {
    /// Prefix applied to event ids
    pub id_prefix: String,
    /// Prefix applied to event names
    pub name_prefix: String,
    /// Source tag stamped on every event
    pub source: String,
}

impl Default for EventFactory {
    fn default() -> Self {
        Self {
            id_prefix: "opcua~".to_string(),
            name_prefix: "OPC UA: ".to_string(),
            source: "opcua".to_string(),
        }
    }
}

impl EventFactory {
    /// Build the event for one change notification.
    ///
    /// A missing or empty display name is logged and replaced by an empty
    /// name.
    #[must_use]
    pub fn build(
        &self,
        node_id: &NodeId,
        display_name: Option<&str>,
        data_value: &DataValue,
    ) -> NormalizedEvent {
        let name = display_name.filter(|name| !name.is_empty()).unwrap_or_else(|| {
            tracing::warn!(node_id = %node_id, "Name not found for node");
            ""
        });

        NormalizedEvent {
            id: format!("{}{}", self.id_prefix, node_id),
            name: format!("{}{}", self.name_prefix, name),
            source: self.source.clone(),
            meta: serde_json::json!({ "opcuaDataValue": data_value.value }),
            value_types: vec![map_value_type(&data_value.value)],
            values: vec![ValueSample {
                date: data_value.server_timestamp_ms(),
                value: vec![map_value(&data_value.value)],
            }],
        }
    }
}
