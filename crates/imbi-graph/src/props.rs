//! Conversion between JSON property bags and Bolt values.

use neo4rs::{BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString, BoltType};
use serde_json::{Map, Number, Value};

use crate::client::GraphError;

/// Convert a JSON value into a Bolt parameter value.
pub fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::Integer(BoltInteger::new(i)),
            None => BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or(f64::NAN))),
        },
        Value::String(s) => BoltType::String(BoltString::new(s)),
        Value::Array(items) => BoltType::List(BoltList {
            value: items.iter().map(to_bolt).collect(),
        }),
        Value::Object(map) => map_to_bolt(map),
    }
}

/// Convert a property map into a Bolt map parameter.
pub fn map_to_bolt(map: &Map<String, Value>) -> BoltType {
    BoltType::Map(BoltMap {
        value: map
            .iter()
            .map(|(k, v)| (BoltString::new(k), to_bolt(v)))
            .collect(),
    })
}

/// Convert a Bolt value returned by the store into JSON.
///
/// Only the value types this layer writes are supported; graph structure
/// and temporal values are rejected.
pub fn from_bolt(value: BoltType) -> Result<Value, GraphError> {
    Ok(match value {
        BoltType::Null(_) => Value::Null,
        BoltType::Boolean(b) => Value::Bool(b.value),
        BoltType::Integer(i) => Value::from(i.value),
        BoltType::Float(f) => Number::from_f64(f.value)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        BoltType::String(s) => Value::String(s.value),
        BoltType::List(list) => Value::Array(
            list.value
                .into_iter()
                .map(from_bolt)
                .collect::<Result<_, _>>()?,
        ),
        BoltType::Map(map) => Value::Object(bolt_to_map(map)?),
        other => {
            return Err(GraphError::Serialization(format!(
                "unsupported property value: {other:?}"
            )))
        }
    })
}

/// Convert a Bolt map into a property map.
pub fn bolt_to_map(map: BoltMap) -> Result<Map<String, Value>, GraphError> {
    map.value
        .into_iter()
        .map(|(k, v)| Ok((k.value, from_bolt(v)?)))
        .collect()
}

/// Read a map-valued column (e.g. `properties(n)`) from a row.
pub fn row_map(row: &neo4rs::Row, column: &str) -> Result<Map<String, Value>, GraphError> {
    let value: BoltType = row
        .get(column)
        .map_err(|e| GraphError::Serialization(format!("Failed to read column {column}: {e}")))?;
    match from_bolt(value)? {
        Value::Object(map) => Ok(map),
        other => Err(GraphError::Serialization(format!(
            "column {column} is not a map: {other}"
        ))),
    }
}

/// Read a scalar column (e.g. a count or flag) from a row.
pub fn row_value<T: serde::de::DeserializeOwned>(row: &neo4rs::Row, column: &str) -> Result<T, GraphError> {
    row.get(column)
        .map_err(|e| GraphError::Serialization(format!("Failed to read column {column}: {e}")))
}
