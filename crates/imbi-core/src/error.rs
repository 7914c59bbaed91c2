use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Top-level error type shared by the Imbi crates.
#[derive(Error, Debug)]
pub enum ImbiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for ImbiError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// A field value failed a type, required, or enumeration check.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Validation failed for {model}.{field}: {violation}")]
pub struct ValidationError {
    /// Entity label or synthesized model name.
    pub model: String,
    pub field: String,
    pub violation: Violation,
}

impl ValidationError {
    pub fn new(model: impl Into<String>, field: impl Into<String>, violation: Violation) -> Self {
        Self {
            model: model.into(),
            field: field.into(),
            violation,
        }
    }
}

/// The constraint a value violated.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    Missing,
    TypeMismatch { expected: String, found: String },
    NotInEnum { allowed: Vec<Value> },
    Unknown,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "required field is missing"),
            Self::TypeMismatch { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            Self::NotInEnum { allowed } => {
                let allowed: Vec<String> = allowed.iter().map(Value::to_string).collect();
                write!(f, "value must be one of [{}]", allowed.join(", "))
            }
            Self::Unknown => write!(f, "field is not part of the model"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_field_and_constraint() {
        let err = ValidationError::new(
            "Project",
            "cloud_provider",
            Violation::NotInEnum {
                allowed: vec![Value::from("AWS"), Value::from("GCP")],
            },
        );
        let msg = err.to_string();
        assert!(msg.contains("Project.cloud_provider"));
        assert!(msg.contains(r#"["AWS", "GCP"]"#));
    }

    #[test]
    fn config_errors_convert() {
        let err: ImbiError = config::ConfigError::Message("bad".into()).into();
        assert!(matches!(err, ImbiError::Config(ref m) if m == "bad"));
    }
}
