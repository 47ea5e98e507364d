//! Translation of typed values into the normalized value schema.

use crate::event::ValueType;
use crate::value::{DataKind, Variant};
use serde::{Deserialize, Serialize};

/// Label carried by every value-type descriptor.
pub const VALUE_LABEL: &str = "Wert";

/// Normalized value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Text
    String,
    /// Any numeric value, including points in time
    Number,
    /// Flag
    Boolean,
    /// Anything else, passed through opaquely
    Object,
}

/// Map a variant to its value-type descriptor.
///
/// Arrays and unlisted data kinds resolve to [`ValueKind::Object`].
#[must_use]
pub fn map_value_type(variant: &Variant) -> ValueType {
    if !variant.is_scalar() {
        return ValueType::new(ValueKind::Object, "");
    }

    match variant.data_type {
        DataKind::String => ValueType::new(ValueKind::String, ""),
        DataKind::Int16
        | DataKind::UInt16
        | DataKind::Int32
        | DataKind::UInt32
        | DataKind::Int64
        | DataKind::UInt64
        | DataKind::Float
        | DataKind::Double => ValueType::new(ValueKind::Number, ""),
        DataKind::DateTime => ValueType::new(ValueKind::Number, "Date"),
        DataKind::Boolean | DataKind::Byte => ValueType::new(ValueKind::Boolean, ""),
        _ => ValueType::new(ValueKind::Object, ""),
    }
}

/// The scalar carried into the event, untransformed.
#[must_use]
pub fn map_value(variant: &Variant) -> serde_json::Value {
    variant.value.clone()
}
