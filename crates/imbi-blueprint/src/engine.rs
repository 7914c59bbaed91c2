//! Blueprint resolution against the graph.

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};

use imbi_core::relationships::HAS_BLUEPRINT;
use imbi_core::{Blueprint, BlueprintAssignment, BlueprintSettings, Categorized, Entity, NoProperties};
use imbi_graph::{Direction, GraphClient, Related};

use crate::cache::ModelCache;
use crate::error::BlueprintError;
use crate::model::{BlueprintSource, SynthesizedModel};
use crate::schema::parse_schema;

/// Resolves the blueprints that apply to an entity and returns the
/// synthesized model, caching by fingerprint.
#[derive(Clone)]
pub struct BlueprintEngine {
    graph: GraphClient,
    cache: ModelCache,
}

impl BlueprintEngine {
    pub fn new(graph: GraphClient, settings: &BlueprintSettings) -> Self {
        Self {
            graph,
            cache: ModelCache::new(settings),
        }
    }

    pub fn graph(&self) -> &GraphClient {
        &self.graph
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// The model for `entity`: its base fields plus the fields of every
    /// enabled blueprint assigned to its category.
    ///
    /// An entity without a category gets the base-only model.
    pub async fn get_model<E: Categorized>(
        &self,
        entity: &E,
    ) -> Result<Arc<SynthesizedModel>, BlueprintError> {
        let categories: Vec<Related<E::Category, NoProperties>> = self
            .graph
            .fetch_relationships::<E, E::Category, NoProperties>(
                entity,
                E::CATEGORY_RELATIONSHIP,
                Direction::Outgoing,
            )
            .await?
            .take(2)
            .try_collect()
            .await?;

        match categories.as_slice() {
            [] => {
                tracing::debug!(label = E::label(), "Entity has no category; using base model");
                Ok(self.cache.get_or_synthesize(E::descriptor(), Vec::new()).await?)
            }
            [category] => self.get_model_for_category::<E>(&category.node).await,
            _ => Err(BlueprintError::AmbiguousCategory {
                label: E::label().to_string(),
                key: entity.natural_key()?,
            }),
        }
    }

    /// The model for entities of type `E` in `category`.
    pub async fn get_model_for_category<E: Categorized>(
        &self,
        category: &E::Category,
    ) -> Result<Arc<SynthesizedModel>, BlueprintError> {
        let sources = self.assigned_blueprints::<E>(category).await?;
        Ok(self.cache.get_or_synthesize(E::descriptor(), sources).await?)
    }

    /// Enabled blueprints assigned to `category` that extend `E`, in
    /// assignment order.
    async fn assigned_blueprints<E: Categorized>(
        &self,
        category: &E::Category,
    ) -> Result<Vec<BlueprintSource>, BlueprintError> {
        let assigned: Vec<Related<Blueprint, BlueprintAssignment>> = self
            .graph
            .fetch_relationships::<E::Category, Blueprint, BlueprintAssignment>(
                category,
                HAS_BLUEPRINT,
                Direction::Outgoing,
            )
            .await?
            .try_collect()
            .await?;

        let mut sources = Vec::with_capacity(assigned.len());
        for Related { node: blueprint, relationship } in assigned {
            if !blueprint.enabled || blueprint.applies_to != E::label() {
                tracing::debug!(
                    blueprint = %blueprint.slug,
                    applies_to = %blueprint.applies_to,
                    enabled = blueprint.enabled,
                    "Skipping blueprint"
                );
                continue;
            }
            sources.push(BlueprintSource::new(&blueprint, relationship.properties)?);
        }
        Ok(sources)
    }

    /// Assign `blueprint` to a category. Re-assigning updates the
    /// assignment but keeps its original position in the order.
    pub async fn assign_blueprint<C: Entity>(
        &self,
        category: &C,
        blueprint: &Blueprint,
        assignment: BlueprintAssignment,
    ) -> Result<(), BlueprintError> {
        self.graph
            .create_relationship(category, blueprint, HAS_BLUEPRINT, Some(&assignment))
            .await?;
        tracing::info!(
            category = C::label(),
            blueprint = %blueprint.slug,
            is_required = assignment.is_required,
            "Assigned blueprint"
        );
        Ok(())
    }

    pub async fn unassign_blueprint<C: Entity>(
        &self,
        category: &C,
        blueprint: &Blueprint,
    ) -> Result<(), BlueprintError> {
        self.graph
            .delete_relationship(category, blueprint, HAS_BLUEPRINT)
            .await?;
        tracing::info!(category = C::label(), blueprint = %blueprint.slug, "Unassigned blueprint");
        Ok(())
    }

    /// Check the blueprint's schema and store it, replacing an existing
    /// blueprint with the same slug.
    pub async fn save_blueprint(&self, blueprint: &Blueprint) -> Result<Blueprint, BlueprintError> {
        let schema = BlueprintSource::new(blueprint, BlueprintAssignment::default())?.schema;
        parse_schema(&blueprint.slug, &schema)?;

        let stored = self.graph.upsert(blueprint, &[]).await?;
        self.cache.invalidate_blueprint(&blueprint.slug);
        tracing::info!(blueprint = %blueprint.slug, applies_to = %blueprint.applies_to, "Saved blueprint");
        Ok(stored)
    }

    /// Delete the blueprint and its assignments.
    pub async fn delete_blueprint(&self, blueprint: &Blueprint) -> Result<(), BlueprintError> {
        self.graph.delete(blueprint).await?;
        self.cache.invalidate_blueprint(&blueprint.slug);
        tracing::info!(blueprint = %blueprint.slug, "Deleted blueprint");
        Ok(())
    }
}
