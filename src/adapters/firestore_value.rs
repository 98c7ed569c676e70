//! Conversion between plain JSON and Firestore's typed value encoding.
//!
//! Firestore wraps every value in a single-key object naming its type (`stringValue`,
//! `integerValue`, `mapValue`, ...). Integers travel as strings. Timestamps are decoded to epoch
//! milliseconds because that is how the device record stores time.

use chrono::DateTime;
use serde_json::{Map, Number, Value, json};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("field {0} is not a typed firestore value")]
    Untyped(String),
    #[error("field {field} has unsupported value type {kind}")]
    UnsupportedType { field: String, kind: String },
    #[error("field {field} carries an invalid {kind}: {raw}")]
    InvalidScalar {
        field: String,
        kind: &'static str,
        raw: String,
    },
}

pub fn encode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(flag) => json!({ "booleanValue": flag }),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => json!({ "integerValue": integer.to_string() }),
            None => json!({ "doubleValue": number.as_f64().unwrap_or_default() }),
        },
        Value::String(text) => json!({ "stringValue": text }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

pub fn decode_fields(fields: &Map<String, Value>) -> Result<Map<String, Value>, CodecError> {
    fields
        .iter()
        .map(|(key, value)| decode_value(key, value).map(|decoded| (key.clone(), decoded)))
        .collect()
}

pub fn decode_value(field: &str, value: &Value) -> Result<Value, CodecError> {
    let typed = value
        .as_object()
        .filter(|object| object.len() == 1)
        .ok_or_else(|| CodecError::Untyped(field.to_string()))?;
    let Some((kind, inner)) = typed.iter().next() else {
        return Err(CodecError::Untyped(field.to_string()));
    };

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => Ok(Value::Bool(inner.as_bool().unwrap_or_default())),
        "stringValue" | "referenceValue" | "bytesValue" => {
            Ok(Value::String(inner.as_str().unwrap_or_default().to_string()))
        }
        "integerValue" => decode_integer(field, inner),
        "doubleValue" => decode_double(field, inner),
        "timestampValue" => decode_timestamp(field, inner),
        "geoPointValue" => Ok(json!({
            "latitude": inner.get("latitude").cloned().unwrap_or(json!(0.0)),
            "longitude": inner.get("longitude").cloned().unwrap_or(json!(0.0)),
        })),
        "arrayValue" => {
            let items = inner
                .get("values")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            items
                .iter()
                .map(|item| decode_value(field, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        "mapValue" => match inner.get("fields").and_then(Value::as_object) {
            Some(nested) => decode_fields(nested).map(Value::Object),
            None => Ok(Value::Object(Map::new())),
        },
        other => Err(CodecError::UnsupportedType {
            field: field.to_string(),
            kind: other.to_string(),
        }),
    }
}

fn decode_integer(field: &str, inner: &Value) -> Result<Value, CodecError> {
    let parsed = match inner {
        Value::String(raw) => raw.parse::<i64>().ok(),
        Value::Number(number) => number.as_i64(),
        _ => None,
    };
    parsed
        .map(|integer| Value::Number(integer.into()))
        .ok_or_else(|| CodecError::InvalidScalar {
            field: field.to_string(),
            kind: "integer",
            raw: inner.to_string(),
        })
}

// Integral doubles come back as JSON integers so they still fit integer-typed record fields.
fn decode_double(field: &str, inner: &Value) -> Result<Value, CodecError> {
    let Some(double) = inner.as_f64() else {
        return Err(CodecError::InvalidScalar {
            field: field.to_string(),
            kind: "double",
            raw: inner.to_string(),
        });
    };

    if double.fract() == 0.0 && double.abs() < 9.0e15 {
        return Ok(Value::Number((double as i64).into()));
    }
    Number::from_f64(double)
        .map(Value::Number)
        .ok_or_else(|| CodecError::InvalidScalar {
            field: field.to_string(),
            kind: "double",
            raw: inner.to_string(),
        })
}

fn decode_timestamp(field: &str, inner: &Value) -> Result<Value, CodecError> {
    inner
        .as_str()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|timestamp| Value::Number(timestamp.timestamp_millis().into()))
        .ok_or_else(|| CodecError::InvalidScalar {
            field: field.to_string(),
            kind: "timestamp",
            raw: inner.to_string(),
        })
}
