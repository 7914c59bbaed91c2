//! imbi-core: Shared types, configuration, and error handling for Imbi services.
//!
//! This crate provides the foundations used by the graph and blueprint layers:
//! - Field descriptors and the generic validator built over them
//! - The `Entity` contract and the domain entities (Organization, Team, ...)
//! - The model registry consumed to declare constraints at startup
//! - Settings loading and logging setup
//! - Common error types

pub mod entity;
pub mod error;
pub mod field;
pub mod logging;
pub mod registry;
pub mod relationships;
pub mod settings;
pub mod types;

pub use entity::{Categorized, Entity, EntityDescriptor};
pub use error::{ImbiError, ValidationError, Violation};
pub use field::{FieldDescriptor, FieldKind};
pub use registry::ModelRegistry;
pub use settings::{BlueprintSettings, Neo4jSettings, Settings};
pub use types::{
    Blueprint, BlueprintAssignment, NoProperties, Organization, Project, ProjectType, Role,
    Session, Team, User,
};
