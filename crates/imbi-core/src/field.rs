//! Uniform field descriptors and the validator built over them.
//!
//! Both compile-time entities and runtime-synthesized models describe
//! their fields with [`FieldDescriptor`], so one validator serves both.

use std::fmt;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ValidationError, Violation};

/// Primitive kind of a field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    /// Any JSON number, integers included.
    Number,
    Boolean,
    /// RFC 3339 timestamp stored as a string.
    Timestamp,
    List(Box<FieldKind>),
}

impl FieldKind {
    /// Whether `value` is an acceptable instance of this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::String, Value::String(_)) => true,
            (Self::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (Self::Number, Value::Number(_)) => true,
            (Self::Boolean, Value::Bool(_)) => true,
            (Self::Timestamp, Value::String(s)) => DateTime::parse_from_rfc3339(s).is_ok(),
            (Self::List(inner), Value::Array(items)) => items.iter().all(|v| inner.accepts(v)),
            _ => false,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
            Self::Timestamp => write!(f, "timestamp"),
            Self::List(inner) => write!(f, "list<{inner}>"),
        }
    }
}

/// Describes one field of an entity or synthesized model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    /// Allowed values, when the field is an enumeration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldDescriptor {
    pub fn required(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: true,
            enum_values: None,
            default: None,
            description: None,
        }
    }

    pub fn optional(name: &str, kind: FieldKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    pub fn with_enum<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Check a present value against the kind and enumeration constraints.
    pub fn check(&self, model: &str, value: &Value) -> Result<(), ValidationError> {
        if !self.kind.accepts(value) {
            return Err(ValidationError::new(
                model,
                &self.name,
                Violation::TypeMismatch {
                    expected: self.kind.to_string(),
                    found: json_type_name(value).to_string(),
                },
            ));
        }
        if let Some(allowed) = &self.enum_values {
            if !allowed.contains(value) {
                return Err(ValidationError::new(
                    model,
                    &self.name,
                    Violation::NotInEnum {
                        allowed: allowed.clone(),
                    },
                ));
            }
        }
        Ok(())
    }
}

/// Validate a property map against a field list.
///
/// Null values count as absent. With `strict`, names not in `fields` are
/// rejected; otherwise they are left for the caller to drop.
pub fn validate_fields(
    model: &str,
    fields: &[FieldDescriptor],
    values: &Map<String, Value>,
    strict: bool,
) -> Result<(), ValidationError> {
    for field in fields {
        match values.get(&field.name) {
            None | Some(Value::Null) => {
                if field.required && field.default.is_none() {
                    return Err(ValidationError::new(model, &field.name, Violation::Missing));
                }
            }
            Some(value) => field.check(model, value)?,
        }
    }

    if strict {
        if let Some(unknown) = values
            .keys()
            .find(|key| !fields.iter().any(|f| &f.name == *key))
        {
            return Err(ValidationError::new(model, unknown, Violation::Unknown));
        }
    }

    Ok(())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
