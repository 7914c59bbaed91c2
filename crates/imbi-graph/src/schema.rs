//! Uniqueness constraints and lookup indexes derived from the model registry.
//!
//! Declarations use `IF NOT EXISTS` so applying them on every startup is
//! idempotent.

use neo4rs::query;

use imbi_core::{EntityDescriptor, ModelRegistry};

use crate::client::{GraphError, GraphHandle};

/// A schema statement for one label and property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    Unique { label: &'static str, property: &'static str },
    Index { label: &'static str, property: &'static str },
}

impl Declaration {
    pub fn name(&self) -> String {
        match self {
            Self::Unique { label, property } => {
                format!("{}_{}_unique", label.to_lowercase(), property)
            }
            Self::Index { label, property } => {
                format!("{}_{}_index", label.to_lowercase(), property)
            }
        }
    }

    pub fn cypher(&self) -> String {
        let name = self.name();
        match self {
            Self::Unique { label, property } => format!(
                "CREATE CONSTRAINT {name} IF NOT EXISTS FOR (n:{label}) REQUIRE n.{property} IS UNIQUE"
            ),
            Self::Index { label, property } => {
                format!("CREATE INDEX {name} IF NOT EXISTS FOR (n:{label}) ON (n.{property})")
            }
        }
    }
}

/// Declarations for one entity: its natural key constraint, then indexes.
pub fn entity_declarations(descriptor: &EntityDescriptor) -> Vec<Declaration> {
    std::iter::once(Declaration::Unique {
        label: descriptor.label,
        property: descriptor.natural_key,
    })
    .chain(
        descriptor
            .indexed
            .iter()
            .filter(|field| **field != descriptor.natural_key)
            .map(|field| Declaration::Index {
                label: descriptor.label,
                property: *field,
            }),
    )
    .collect()
}

/// Declarations for every entity in the registry.
pub fn declarations(registry: &ModelRegistry) -> Vec<Declaration> {
    registry.iter().flat_map(entity_declarations).collect()
}

/// Apply all declarations. Any failure aborts initialization.
pub async fn apply(handle: &GraphHandle, registry: &ModelRegistry) -> Result<(), GraphError> {
    let declarations = declarations(registry);
    for declaration in &declarations {
        handle.run(query(&declaration.cypher())).await?;
    }
    tracing::info!(count = declarations.len(), "Applied graph schema declarations");
    Ok(())
}
