use crate::path::{LabelPolicy, TimestampUnit};
use crate::value::{Document, Number, Opaque, Value};

/// Arrays of scalars longer than this are not flattened by index.
pub const MAX_INDEXED_ARRAY_LEN: usize = 16;

/// What the flattening engine does with a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch<'a> {
    Numeric(f64),
    /// Epoch in the unit of the field's policy.
    Timestamp(f64),
    Map(&'a Document),
    LabeledMap {
        document: &'a Document,
        label: &'a str,
    },
    IndexedArray(&'a [Value]),
    LabeledArray {
        values: &'a [Value],
        label: &'a str,
        field: &'a str,
    },
    /// Expected noise, never logged.
    Drop,
    NonFinite,
    Unsupported(&'static str),
}

fn is_scalar(value: &Value) -> bool {
    matches!(
        value,
        Value::Number(_) | Value::Bool(_) | Value::Timestamp(_)
    )
}

pub fn dispatch<'a>(
    value: &'a Value,
    label: Option<&'a LabelPolicy>,
    unit: TimestampUnit,
) -> Dispatch<'a> {
    match value {
        Value::Number(Number::Int(value)) => Dispatch::Numeric(*value as f64),
        Value::Number(Number::Float(value)) if value.is_finite() => Dispatch::Numeric(*value),
        Value::Number(Number::Float(_)) => Dispatch::NonFinite,
        Value::Bool(value) => Dispatch::Numeric(if *value { 1.0 } else { 0.0 }),
        Value::Timestamp(timestamp) => Dispatch::Timestamp(match unit {
            TimestampUnit::Seconds => timestamp.as_secs(),
            TimestampUnit::Nanoseconds => timestamp.as_nanos(),
        }),
        Value::String(_) => Dispatch::Drop,
        Value::Map(document) => match label {
            Some(LabelPolicy::Keys { label }) => Dispatch::LabeledMap { document, label },
            _ => Dispatch::Map(document),
        },
        Value::Array(values) => match label {
            Some(LabelPolicy::Field { label, field }) => Dispatch::LabeledArray {
                values,
                label,
                field,
            },
            _ if values.len() <= MAX_INDEXED_ARRAY_LEN && values.iter().all(is_scalar) => {
                Dispatch::IndexedArray(values)
            }
            _ => Dispatch::Drop,
        },
        Value::Binary(Opaque::Unsupported(type_name)) => Dispatch::Unsupported(type_name),
        Value::Binary(Opaque::Binary | Opaque::ObjectId | Opaque::Null) => Dispatch::Drop,
    }
}
