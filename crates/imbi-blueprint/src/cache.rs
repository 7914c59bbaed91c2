//! Process-wide cache of synthesized models.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use imbi_core::{BlueprintSettings, EntityDescriptor};

use crate::error::SynthesisError;
use crate::model::{fingerprint, merge, BlueprintSource, SynthesizedModel};

/// Synthesized models keyed by fingerprint.
///
/// Concurrent misses for one key run a single merge; the other callers
/// wait for and share its result (or its error).
#[derive(Clone)]
pub struct ModelCache {
    cache: Cache<String, Arc<SynthesizedModel>>,
}

impl ModelCache {
    pub fn new(settings: &BlueprintSettings) -> Self {
        let mut builder = Cache::builder()
            .max_capacity(settings.cache_capacity)
            .support_invalidation_closures();
        if let Some(ttl) = settings.cache_ttl_secs {
            builder = builder.time_to_live(Duration::from_secs(ttl));
        }
        Self {
            cache: builder.build(),
        }
    }

    /// Return the cached model for `base` plus `sources`, merging on a miss.
    pub async fn get_or_synthesize(
        &self,
        base: &EntityDescriptor,
        sources: Vec<BlueprintSource>,
    ) -> Result<Arc<SynthesizedModel>, SynthesisError> {
        let key = fingerprint(base.label, &sources);
        self.cache
            .try_get_with(key, async move { merge(base, &sources).map(Arc::new) })
            .await
            .map_err(|e| (*e).clone())
    }

    pub async fn get(&self, fingerprint: &str) -> Option<Arc<SynthesizedModel>> {
        self.cache.get(fingerprint).await
    }

    /// Drop every cached model that was built with the blueprint `slug`.
    pub fn invalidate_blueprint(&self, slug: &str) {
        let slug = slug.to_string();
        let result = self
            .cache
            .invalidate_entries_if(move |_, model| model.blueprints.iter().any(|b| b.slug == slug));
        match result {
            Ok(_) => tracing::debug!("Invalidated cached models for blueprint"),
            Err(e) => tracing::warn!(error = %e, "Failed to invalidate cached models"),
        }
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate number of cached models.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}
