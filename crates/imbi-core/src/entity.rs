//! The contract between typed domain records and graph nodes.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ImbiError, ValidationError};
use crate::field::{validate_fields, FieldDescriptor};

/// Declarative definition of an entity type: its graph label, fields,
/// and the natural key that is unique within the label.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub label: &'static str,
    pub natural_key: &'static str,
    pub fields: Vec<FieldDescriptor>,
    /// Non-key fields that get a lookup index.
    pub indexed: Vec<&'static str>,
}

impl EntityDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}

/// A typed record mapped to one graph node.
///
/// The descriptor table drives encoding in both directions: fields the
/// descriptor does not name are never written, and stored properties it
/// does not name are ignored on read.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn descriptor() -> &'static EntityDescriptor;

    fn label() -> &'static str {
        Self::descriptor().label
    }

    /// Encode the entity as a node property map. Null values are omitted.
    fn to_properties(&self) -> Result<Map<String, Value>, ImbiError> {
        let descriptor = Self::descriptor();
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map
                .into_iter()
                .filter(|(key, value)| !value.is_null() && descriptor.has_field(key))
                .collect()),
            other => Err(ImbiError::Internal(format!(
                "{} serialized to a non-object value: {other}",
                descriptor.label
            ))),
        }
    }

    /// Decode an entity from stored node properties.
    fn from_properties(mut props: Map<String, Value>) -> Result<Self, ImbiError> {
        let descriptor = Self::descriptor();
        props.retain(|key, _| descriptor.has_field(key));
        Ok(serde_json::from_value(Value::Object(props))?)
    }

    /// The value of the natural key field.
    fn natural_key(&self) -> Result<Value, ImbiError> {
        let descriptor = Self::descriptor();
        self.to_properties()?
            .remove(descriptor.natural_key)
            .ok_or_else(|| {
                ValidationError::new(
                    descriptor.label,
                    descriptor.natural_key,
                    crate::error::Violation::Missing,
                )
                .into()
            })
    }

    fn validate(&self) -> Result<(), ImbiError> {
        let descriptor = Self::descriptor();
        validate_fields(
            descriptor.label,
            &descriptor.fields,
            &self.to_properties()?,
            false,
        )?;
        Ok(())
    }
}

/// An entity whose instances belong to a category entity. Blueprints are
/// assigned to categories and extend every instance in them.
pub trait Categorized: Entity {
    type Category: Entity;

    /// Relationship type from an instance to its category.
    const CATEGORY_RELATIONSHIP: &'static str;
}
