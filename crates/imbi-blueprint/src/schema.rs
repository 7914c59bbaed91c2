//! JSON-Schema fragments to field descriptors.
//!
//! Only the subset blueprints use is understood: an object root with
//! `properties` and `required`, and per property `type`, `format`
//! (`date-time`), `items`, `enum`, `default` and `description`. Other
//! keywords are ignored.

use serde_json::{Map, Value};

use imbi_core::{FieldDescriptor, FieldKind};

use crate::error::SynthesisError;

/// Parse a blueprint's schema into field descriptors, ordered by name.
pub fn parse_schema(blueprint: &str, schema: &Value) -> Result<Vec<FieldDescriptor>, SynthesisError> {
    let root = schema
        .as_object()
        .ok_or_else(|| SynthesisError::invalid(blueprint, "schema root must be an object"))?;

    match root.get("type") {
        None => {}
        Some(Value::String(t)) if t == "object" => {}
        Some(other) => {
            return Err(SynthesisError::invalid(
                blueprint,
                format!("schema root type must be \"object\", got {other}"),
            ))
        }
    }

    let properties = match root.get("properties") {
        None => Map::new(),
        Some(Value::Object(props)) => props.clone(),
        Some(_) => return Err(SynthesisError::invalid(blueprint, "properties must be an object")),
    };
    let required = required_names(blueprint, root, &properties)?;

    properties
        .iter()
        .map(|(name, property)| {
            parse_property(blueprint, name, property, required.contains(&name.as_str()))
        })
        .collect()
}

/// BLAKE3 digest of a schema's canonical JSON encoding (hex).
///
/// Object keys serialize in sorted order, so equal documents hash equally
/// regardless of how they were written.
pub fn schema_hash(schema: &Value) -> String {
    blake3::hash(schema.to_string().as_bytes()).to_hex().to_string()
}

fn required_names<'a>(
    blueprint: &str,
    root: &'a Map<String, Value>,
    properties: &Map<String, Value>,
) -> Result<Vec<&'a str>, SynthesisError> {
    let Some(required) = root.get("required") else {
        return Ok(Vec::new());
    };
    let names = required
        .as_array()
        .ok_or_else(|| SynthesisError::invalid(blueprint, "required must be an array"))?;

    names
        .iter()
        .map(|name| {
            let name = name
                .as_str()
                .ok_or_else(|| SynthesisError::invalid(blueprint, "required entries must be strings"))?;
            if properties.contains_key(name) {
                Ok(name)
            } else {
                Err(SynthesisError::invalid(
                    blueprint,
                    format!("required field {name} is not a declared property"),
                ))
            }
        })
        .collect()
}

fn parse_property(
    blueprint: &str,
    name: &str,
    property: &Value,
    required: bool,
) -> Result<FieldDescriptor, SynthesisError> {
    if !is_identifier(name) {
        return Err(SynthesisError::invalid(
            blueprint,
            format!("property name {name:?} is not an identifier"),
        ));
    }
    let property = property
        .as_object()
        .ok_or_else(|| SynthesisError::invalid(blueprint, format!("property {name} must be an object")))?;

    let kind = parse_kind(blueprint, name, property)?;
    let mut field = if required {
        FieldDescriptor::required(name, kind)
    } else {
        FieldDescriptor::optional(name, kind)
    };

    if let Some(values) = property.get("enum") {
        let values = values
            .as_array()
            .filter(|values| !values.is_empty())
            .ok_or_else(|| {
                SynthesisError::invalid(blueprint, format!("enum of {name} must be a non-empty array"))
            })?;
        if let Some(bad) = values.iter().find(|v| !field.kind.accepts(v)) {
            return Err(SynthesisError::invalid(
                blueprint,
                format!("enum value {bad} of {name} is not a {}", field.kind),
            ));
        }
        field = field.with_enum(values.iter().cloned());
    }

    if let Some(default) = property.get("default") {
        field
            .check(blueprint, default)
            .map_err(|e| SynthesisError::invalid(blueprint, format!("default of {name}: {}", e.violation)))?;
        field = field.with_default(default.clone());
    }

    if let Some(description) = property.get("description").and_then(Value::as_str) {
        field = field.with_description(description);
    }

    Ok(field)
}

fn parse_kind(
    blueprint: &str,
    name: &str,
    property: &Map<String, Value>,
) -> Result<FieldKind, SynthesisError> {
    let kind = match property.get("type").and_then(Value::as_str) {
        Some("string") if property.get("format").and_then(Value::as_str) == Some("date-time") => {
            FieldKind::Timestamp
        }
        Some("string") => FieldKind::String,
        Some("integer") => FieldKind::Integer,
        Some("number") => FieldKind::Number,
        Some("boolean") => FieldKind::Boolean,
        Some("array") => {
            let items = property
                .get("items")
                .and_then(Value::as_object)
                .ok_or_else(|| {
                    SynthesisError::invalid(blueprint, format!("array property {name} needs an items schema"))
                })?;
            let inner = parse_kind(blueprint, name, items)?;
            if matches!(inner, FieldKind::List(_)) {
                return Err(SynthesisError::invalid(
                    blueprint,
                    format!("nested arrays are not supported ({name})"),
                ));
            }
            FieldKind::List(Box::new(inner))
        }
        Some(other) => {
            return Err(SynthesisError::invalid(
                blueprint,
                format!("unsupported type {other:?} for {name}"),
            ))
        }
        None => {
            return Err(SynthesisError::invalid(
                blueprint,
                format!("property {name} needs a string type"),
            ))
        }
    };
    Ok(kind)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
