//! Imbi Blueprint: runtime model synthesis.
//!
//! Blueprints are JSON-Schema fragments assigned to a category entity
//! (e.g. a project type). The models they produce are built over the same
//! field descriptors as the compile-time entities, so one validator serves
//! both:
//! - `schema`: parse fragments into field descriptors, content hashing
//! - `model`: merge with collision detection, strict validation
//! - `cache`: fingerprint-keyed model cache
//! - `engine`: category and assignment resolution against the graph

pub mod cache;
pub mod engine;
pub mod error;
pub mod model;
pub mod schema;

pub use cache::ModelCache;
pub use engine::BlueprintEngine;
pub use error::{BlueprintError, SynthesisError};
pub use model::{merge, BlueprintRef, BlueprintSource, SynthesizedModel};
pub use schema::{parse_schema, schema_hash};
