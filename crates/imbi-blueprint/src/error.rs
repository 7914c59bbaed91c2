use serde_json::Value;

use imbi_core::{ImbiError, ValidationError};
use imbi_graph::GraphError;

/// Failures while turning blueprints into a model. Cloneable so a single
/// failed synthesis can be reported to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SynthesisError {
    #[error("Field {field} from blueprint {incoming} collides with a field from {existing}")]
    SchemaCollision {
        field: String,
        /// Base label or slug of the blueprint that declared it first.
        existing: String,
        incoming: String,
    },

    #[error("Invalid schema in blueprint {blueprint}: {reason}")]
    InvalidSchema { blueprint: String, reason: String },
}

impl SynthesisError {
    pub(crate) fn invalid(blueprint: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSchema {
            blueprint: blueprint.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors from blueprint resolution and model validation.
#[derive(Debug, thiserror::Error)]
pub enum BlueprintError {
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("{label} {key} belongs to more than one category")]
    AmbiguousCategory { label: String, key: Value },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<ImbiError> for BlueprintError {
    fn from(err: ImbiError) -> Self {
        match err {
            ImbiError::Validation(e) => Self::Validation(e),
            other => Self::Serialization(other.to_string()),
        }
    }
}
