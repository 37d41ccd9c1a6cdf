//! Relation Registry - Per-model table of relation mappings
//!
//! The registry is filled while models are defined and read-only afterwards.
//! It is an ordinary value: build one, wrap it in an `Arc` and hand it to the
//! loader, so every test can work against its own isolated registry.

use std::collections::HashMap;

use tracing::debug;

use super::metadata::{RelationKind, RelationMapping};
use crate::error::{EagerError, EagerResult};

#[derive(Debug, Clone, Default)]
struct ModelRelations {
    /// Relation names in declaration order
    order: Vec<String>,
    by_name: HashMap<String, RelationMapping>,
}

/// Table of relation mappings keyed by model and relation name
#[derive(Debug, Clone, Default)]
pub struct RelationRegistry {
    models: HashMap<String, ModelRelations>,
}

impl RelationRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relation for a model
    ///
    /// Registering the same mapping twice is a no-op; registering a different
    /// mapping under an existing name is a configuration error.
    pub fn register(
        &mut self,
        model: &str,
        relation: &str,
        mapping: RelationMapping,
    ) -> EagerResult<()> {
        if model.trim().is_empty() || relation.trim().is_empty() {
            return Err(EagerError::Configuration(
                "Model and relation names cannot be empty".to_string(),
            ));
        }

        mapping.validate().map_err(|e| {
            EagerError::Configuration(format!(
                "Invalid relation '{}' on model '{}': {}",
                relation, model, e
            ))
        })?;

        let relations = self.models.entry(model.to_string()).or_default();
        match relations.by_name.get(relation) {
            Some(existing) if *existing == mapping => return Ok(()),
            Some(_) => {
                return Err(EagerError::Configuration(format!(
                    "Relation '{}' is already registered on model '{}' with a different mapping",
                    relation, model
                )))
            }
            None => {}
        }

        debug!(
            model,
            relation,
            kind = ?mapping.kind,
            related_model = %mapping.related_model,
            "registered relation"
        );
        relations.order.push(relation.to_string());
        relations.by_name.insert(relation.to_string(), mapping);
        Ok(())
    }

    /// Builder-style registration
    pub fn with_relation(
        mut self,
        model: &str,
        relation: &str,
        mapping: RelationMapping,
    ) -> EagerResult<Self> {
        self.register(model, relation, mapping)?;
        Ok(self)
    }

    /// Look up a relation mapping
    pub fn lookup(&self, model: &str, relation: &str) -> Option<&RelationMapping> {
        self.models.get(model)?.by_name.get(relation)
    }

    /// Look up a relation mapping, turning absence into an error
    pub fn require(&self, model: &str, relation: &str) -> EagerResult<&RelationMapping> {
        self.lookup(model, relation)
            .ok_or_else(|| EagerError::unknown_relation(model, relation))
    }

    /// Check if a relation exists
    pub fn has_relation(&self, model: &str, relation: &str) -> bool {
        self.lookup(model, relation).is_some()
    }

    /// All relations of a model in declaration order
    pub fn relations_for(&self, model: &str) -> Vec<(&str, &RelationMapping)> {
        let Some(relations) = self.models.get(model) else {
            return Vec::new();
        };

        relations
            .order
            .iter()
            .filter_map(|name| {
                relations
                    .by_name
                    .get(name)
                    .map(|mapping| (name.as_str(), mapping))
            })
            .collect()
    }

    /// Relation names of a model in declaration order
    pub fn relation_names(&self, model: &str) -> Vec<String> {
        self.models
            .get(model)
            .map(|relations| relations.order.clone())
            .unwrap_or_default()
    }

    /// Get statistics about the registry
    pub fn stats(&self) -> RegistryStats {
        let mut kind_counts = HashMap::new();
        for relations in self.models.values() {
            for mapping in relations.by_name.values() {
                *kind_counts.entry(mapping.kind).or_insert(0) += 1;
            }
        }

        RegistryStats {
            total_models: self.models.len(),
            total_relations: kind_counts.values().sum(),
            kind_counts,
        }
    }
}

/// Statistics about the relation registry
#[derive(Debug, Clone)]
pub struct RegistryStats {
    pub total_models: usize,
    pub total_relations: usize,
    pub kind_counts: HashMap<RelationKind, usize>,
}
