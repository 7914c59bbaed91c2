//! Synthesized models: an entity's base fields merged with the fields of
//! its assigned blueprints, validated generically over the descriptors.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{json, Map, Value};

use imbi_core::field::validate_fields;
use imbi_core::{Blueprint, BlueprintAssignment, Entity, EntityDescriptor, FieldDescriptor, FieldKind, ValidationError};

use crate::error::{BlueprintError, SynthesisError};
use crate::schema::{parse_schema, schema_hash};

/// One blueprint as it takes part in a merge.
#[derive(Debug, Clone, PartialEq)]
pub struct BlueprintSource {
    pub slug: String,
    pub schema: Value,
    pub schema_hash: String,
    /// When false the blueprint's fields are all optional.
    pub is_required: bool,
}

impl BlueprintSource {
    pub fn from_schema(slug: &str, schema: Value, is_required: bool) -> Self {
        Self {
            slug: slug.to_string(),
            schema_hash: schema_hash(&schema),
            schema,
            is_required,
        }
    }

    /// A stored blueprint under the given assignment.
    pub fn new(blueprint: &Blueprint, assignment: BlueprintAssignment) -> Result<Self, SynthesisError> {
        let schema = blueprint
            .schema()
            .map_err(|e| SynthesisError::invalid(&blueprint.slug, format!("schema is not valid JSON: {e}")))?;
        Ok(Self::from_schema(&blueprint.slug, schema, assignment.is_required))
    }

    fn to_ref(&self) -> BlueprintRef {
        BlueprintRef {
            slug: self.slug.clone(),
            schema_hash: self.schema_hash.clone(),
            is_required: self.is_required,
        }
    }
}

/// Identity of a blueprint merged into a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlueprintRef {
    pub slug: String,
    pub schema_hash: String,
    pub is_required: bool,
}

/// A runtime model built from an entity descriptor plus blueprints.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedModel {
    pub name: String,
    pub base_label: String,
    /// Base fields first, then each blueprint's fields in merge order.
    pub fields: Vec<FieldDescriptor>,
    pub blueprints: Vec<BlueprintRef>,
    /// Cache key: base label plus the ordered blueprint identities.
    pub fingerprint: String,
}

impl SynthesizedModel {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate a property map strictly and return it with defaults
    /// filled in and null values removed.
    pub fn validate(&self, values: &Map<String, Value>) -> Result<Map<String, Value>, ValidationError> {
        // Unknown keys are rejected even when their value is null.
        validate_fields(&self.name, &self.fields, values, true)?;

        let mut accepted: Map<String, Value> = values
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for field in &self.fields {
            if let Some(default) = &field.default {
                accepted
                    .entry(field.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        Ok(accepted)
    }

    /// Validate an entity of the base type together with values for the
    /// blueprint-declared fields.
    pub fn validate_entity<E: Entity>(
        &self,
        entity: &E,
        extensions: &Map<String, Value>,
    ) -> Result<Map<String, Value>, BlueprintError> {
        let mut values = entity.to_properties()?;
        values.extend(extensions.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(self.validate(&values)?)
    }

    /// Render the model as a JSON-Schema object.
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|field| (field.name.clone(), property_schema(field)))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        json!({
            "title": self.name,
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

/// Merge blueprint fields into the base descriptor, in order.
///
/// A name declared twice (by the base or by an earlier blueprint) fails
/// the whole merge.
pub fn merge(base: &EntityDescriptor, sources: &[BlueprintSource]) -> Result<SynthesizedModel, SynthesisError> {
    let mut fields = base.fields.clone();
    let mut origin: HashMap<String, String> = fields
        .iter()
        .map(|f| (f.name.clone(), base.label.to_string()))
        .collect();

    for source in sources {
        for mut field in parse_schema(&source.slug, &source.schema)? {
            if let Some(existing) = origin.get(&field.name) {
                return Err(SynthesisError::SchemaCollision {
                    field: field.name,
                    existing: existing.clone(),
                    incoming: source.slug.clone(),
                });
            }
            if !source.is_required {
                field.required = false;
            }
            origin.insert(field.name.clone(), source.slug.clone());
            fields.push(field);
        }
    }

    let name = if sources.is_empty() {
        base.label.to_string()
    } else {
        let slugs: Vec<&str> = sources.iter().map(|s| s.slug.as_str()).collect();
        format!("{}[{}]", base.label, slugs.join(","))
    };

    tracing::debug!(model = %name, fields = fields.len(), "Synthesized model");
    Ok(SynthesizedModel {
        name,
        base_label: base.label.to_string(),
        fields,
        blueprints: sources.iter().map(BlueprintSource::to_ref).collect(),
        fingerprint: fingerprint(base.label, sources),
    })
}

/// Stable key for a base label and an ordered blueprint list.
pub fn fingerprint(base_label: &str, sources: &[BlueprintSource]) -> String {
    let refs: Vec<BlueprintRef> = sources.iter().map(BlueprintSource::to_ref).collect();
    let doc = json!({ "base": base_label, "blueprints": refs });
    blake3::hash(doc.to_string().as_bytes()).to_hex().to_string()
}

fn property_schema(field: &FieldDescriptor) -> Value {
    let mut schema = kind_schema(&field.kind);
    if let Value::Object(map) = &mut schema {
        if let Some(values) = &field.enum_values {
            map.insert("enum".into(), Value::Array(values.clone()));
        }
        if let Some(default) = &field.default {
            map.insert("default".into(), default.clone());
        }
        if let Some(description) = &field.description {
            map.insert("description".into(), Value::String(description.clone()));
        }
    }
    schema
}

fn kind_schema(kind: &FieldKind) -> Value {
    match kind {
        FieldKind::String => json!({"type": "string"}),
        FieldKind::Integer => json!({"type": "integer"}),
        FieldKind::Number => json!({"type": "number"}),
        FieldKind::Boolean => json!({"type": "boolean"}),
        FieldKind::Timestamp => json!({"type": "string", "format": "date-time"}),
        FieldKind::List(inner) => json!({"type": "array", "items": kind_schema(inner)}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use imbi_core::{Project, Violation};

    fn cloud_provider() -> BlueprintSource {
        BlueprintSource::from_schema(
            "cloud-provider",
            json!({
                "type": "object",
                "properties": {
                    "cloud_provider": {"type": "string", "enum": ["AWS", "GCP", "Azure"]}
                },
                "required": ["cloud_provider"]
            }),
            true,
        )
    }

    fn ops(is_required: bool) -> BlueprintSource {
        BlueprintSource::from_schema(
            "ops",
            json!({
                "properties": {
                    "pager_rotation": {"type": "string"},
                    "tier": {"type": "integer", "default": 3}
                },
                "required": ["pager_rotation"]
            }),
            is_required,
        )
    }

    fn project() -> Project {
        Project {
            slug: "billing-api".into(),
            name: "Billing API".into(),
            description: None,
            environments: vec!["production".into()],
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn ext(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_cloud_provider_enum_is_enforced() {
        let model = merge(Project::descriptor(), &[cloud_provider()]).unwrap();
        assert!(model.field("cloud_provider").unwrap().required);

        let accepted = model
            .validate_entity(&project(), &ext(json!({"cloud_provider": "GCP"})))
            .unwrap();
        assert_eq!(accepted["cloud_provider"], "GCP");

        let err = model
            .validate_entity(&project(), &ext(json!({"cloud_provider": "IBM"})))
            .unwrap_err();
        match err {
            BlueprintError::Validation(e) => {
                assert_eq!(e.field, "cloud_provider");
                assert!(matches!(e.violation, Violation::NotInEnum { .. }));
            }
            other => panic!("expected validation error, got {other}"),
        }

        let err = model.validate_entity(&project(), &Map::new()).unwrap_err();
        assert!(matches!(
            err,
            BlueprintError::Validation(ref e) if e.field == "cloud_provider" && e.violation == Violation::Missing
        ));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let model = merge(Project::descriptor(), &[cloud_provider()]).unwrap();
        let err = model
            .validate_entity(&project(), &ext(json!({"cloud_provider": "AWS", "color": "red"})))
            .unwrap_err();
        assert!(matches!(
            err,
            BlueprintError::Validation(ref e) if e.field == "color" && e.violation == Violation::Unknown
        ));
    }

    #[test]
    fn test_unknown_null_fields_are_rejected() {
        let model = merge(Project::descriptor(), &[cloud_provider()]).unwrap();
        let err = model
            .validate_entity(&project(), &ext(json!({"cloud_provider": "AWS", "colour": null})))
            .unwrap_err();
        assert!(matches!(
            err,
            BlueprintError::Validation(ref e) if e.field == "colour" && e.violation == Violation::Unknown
        ));
    }

    #[test]
    fn test_defaults_are_applied() {
        let model = merge(Project::descriptor(), &[ops(true)]).unwrap();
        let accepted = model
            .validate_entity(&project(), &ext(json!({"pager_rotation": "platform"})))
            .unwrap();
        assert_eq!(accepted["tier"], 3);
    }

    #[test]
    fn test_optional_assignment_relaxes_required_fields() {
        let model = merge(Project::descriptor(), &[ops(false)]).unwrap();
        assert!(!model.field("pager_rotation").unwrap().required);
        assert!(model.validate_entity(&project(), &Map::new()).is_ok());
        assert_ne!(
            model.fingerprint,
            merge(Project::descriptor(), &[ops(true)]).unwrap().fingerprint
        );
    }

    #[test]
    fn test_collision_with_base_field() {
        let shadow = BlueprintSource::from_schema(
            "shadow",
            json!({"properties": {"name": {"type": "string"}}}),
            true,
        );
        let err = merge(Project::descriptor(), &[shadow]).unwrap_err();
        assert_eq!(
            err,
            SynthesisError::SchemaCollision {
                field: "name".into(),
                existing: "Project".into(),
                incoming: "shadow".into(),
            }
        );
    }

    #[test]
    fn test_collision_between_blueprints() {
        let second = BlueprintSource::from_schema(
            "multi-cloud",
            json!({"properties": {"cloud_provider": {"type": "string"}}}),
            true,
        );
        let err = merge(Project::descriptor(), &[cloud_provider(), second]).unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::SchemaCollision { ref existing, ref incoming, .. }
                if existing == "cloud-provider" && incoming == "multi-cloud"
        ));
    }

    #[test]
    fn test_merge_is_deterministic() {
        let sources = [cloud_provider(), ops(true)];
        let a = merge(Project::descriptor(), &sources).unwrap();
        let b = merge(Project::descriptor(), &sources).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.name, "Project[cloud-provider,ops]");

        let reversed = merge(Project::descriptor(), &[ops(true), cloud_provider()]).unwrap();
        assert_ne!(a.fingerprint, reversed.fingerprint);
    }

    #[test]
    fn test_base_only_model() {
        let model = merge(Project::descriptor(), &[]).unwrap();
        assert_eq!(model.name, "Project");
        assert_eq!(model.fields, Project::descriptor().fields);
        assert!(model.validate_entity(&project(), &Map::new()).is_ok());
    }

    #[test]
    fn test_json_schema_rendering() {
        let model = merge(Project::descriptor(), &[cloud_provider()]).unwrap();
        let schema = model.to_json_schema();
        assert_eq!(schema["additionalProperties"], false);
        assert_eq!(
            schema["properties"]["created_at"],
            json!({"type": "string", "format": "date-time"})
        );
        assert_eq!(schema["properties"]["cloud_provider"]["enum"], json!(["AWS", "GCP", "Azure"]));
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("cloud_provider")));
        assert!(!required.contains(&json!("description")));

        // The rendered schema is itself a valid blueprint fragment.
        assert!(parse_schema("roundtrip", &schema).is_ok());
    }
}
