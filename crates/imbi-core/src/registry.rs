//! The set of entity types known to the model layer.

use crate::entity::{Entity, EntityDescriptor};
use crate::types::{Blueprint, Organization, Project, ProjectType, Role, Session, Team, User};

/// Immutable list of entity descriptors, consumed at startup to declare
/// constraints and indexes.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    descriptors: Vec<&'static EntityDescriptor>,
}

impl ModelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entity type in the Imbi domain model.
    pub fn standard() -> Self {
        Self::new()
            .with::<Organization>()
            .with::<Team>()
            .with::<ProjectType>()
            .with::<Project>()
            .with::<User>()
            .with::<Role>()
            .with::<Session>()
            .with::<Blueprint>()
    }

    /// Add an entity type. Registering the same label twice is a no-op.
    pub fn with<E: Entity>(mut self) -> Self {
        let descriptor = E::descriptor();
        if self.get(descriptor.label).is_none() {
            self.descriptors.push(descriptor);
        }
        self
    }

    pub fn get(&self, label: &str) -> Option<&'static EntityDescriptor> {
        self.descriptors.iter().copied().find(|d| d.label == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static EntityDescriptor> + '_ {
        self.descriptors.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_contains_domain_labels() {
        let registry = ModelRegistry::standard();
        assert_eq!(registry.len(), 8);
        assert_eq!(registry.get("User").unwrap().natural_key, "email");
        assert_eq!(registry.get("Session").unwrap().natural_key, "session_id");
        assert!(registry.get("Host").is_none());
    }

    #[test]
    fn test_duplicate_registration_is_ignored() {
        let registry = ModelRegistry::new().with::<Team>().with::<Team>();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_natural_keys_are_declared_fields() {
        for descriptor in ModelRegistry::standard().iter() {
            let key = descriptor.field(descriptor.natural_key).unwrap();
            assert!(key.required, "{} key must be required", descriptor.label);
            for indexed in &descriptor.indexed {
                assert!(descriptor.has_field(indexed));
            }
        }
    }
}
