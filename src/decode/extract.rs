//! Collapses the kvGPB tagged-union leaf into a plain value.
//!
//! Every decoder crosses the boundary where the protocol oneof must become
//! one of {f64, string, bytes, bool}; this is the single place that
//! narrows it. Decoders never match on the oneof themselves.

use log::trace;

use crate::proto::telemetry::telemetry_field::ValueByType;
use crate::proto::telemetry::TelemetryField;

#[derive(Debug, Clone, PartialEq)]
pub enum LeafValue {
    Bytes(Vec<u8>),
    Str(String),
    Bool(bool),
    Num(f64),
}

/// Narrows a leaf. With `want_numeric` the integer and floating variants
/// are widened to `f64`; without it the string, bytes and bool variants
/// come back with their native type. Anything else (including an empty
/// container field) yields `None`.
pub fn extract_leaf(field: &TelemetryField, want_numeric: bool) -> Option<LeafValue> {
    let value = match (&field.value_by_type, want_numeric) {
        (Some(ValueByType::Uint32Value(v)), true) => LeafValue::Num(f64::from(*v)),
        (Some(ValueByType::Uint64Value(v)), true) => LeafValue::Num(*v as f64),
        (Some(ValueByType::Sint32Value(v)), true) => LeafValue::Num(f64::from(*v)),
        (Some(ValueByType::Sint64Value(v)), true) => LeafValue::Num(*v as f64),
        (Some(ValueByType::DoubleValue(v)), true) => LeafValue::Num(*v),
        (Some(ValueByType::FloatValue(v)), true) => LeafValue::Num(f64::from(*v)),
        (Some(ValueByType::StringValue(v)), false) => LeafValue::Str(v.clone()),
        (Some(ValueByType::BytesValue(v)), false) => LeafValue::Bytes(v.clone()),
        (Some(ValueByType::BoolValue(v)), false) => LeafValue::Bool(*v),
        _ => {
            trace!(
                "field {:?} has no usable value for want_numeric={want_numeric}",
                field.name
            );
            return None;
        }
    };

    Some(value)
}

/// Numeric leaf widened to f64, or `None` for any non-numeric variant.
pub fn leaf_f64(field: &TelemetryField) -> Option<f64> {
    match extract_leaf(field, true) {
        Some(LeafValue::Num(v)) => Some(v),
        _ => None,
    }
}

/// String leaf, or `None` for any other variant.
pub fn leaf_string(field: &TelemetryField) -> Option<String> {
    match extract_leaf(field, false) {
        Some(LeafValue::Str(v)) => Some(v),
        _ => None,
    }
}

/// Bool leaf, or `None` for any other variant.
pub fn leaf_bool(field: &TelemetryField) -> Option<bool> {
    match extract_leaf(field, false) {
        Some(LeafValue::Bool(v)) => Some(v),
        _ => None,
    }
}
