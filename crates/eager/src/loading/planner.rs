//! Eager planner - turns a relation expression into an ordered fetch plan
//!
//! Every check that can fail without touching the database happens here:
//! the whitelist, the depth guard and relation resolution. A plan that comes
//! out of [`EagerPlanner::plan`] only fails at execution time because of data
//! (lazy expansion guards) or the query executor.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use super::plan::{EagerPlan, Expansion};
use crate::config::EagerLoadConfig;
use crate::error::{EagerError, EagerResult};
use crate::expression::{AllowedExpression, RelationExpression};
use crate::relationships::RelationRegistry;

/// Builds [`EagerPlan`]s against a relation registry
#[derive(Debug, Clone)]
pub struct EagerPlanner {
    registry: Arc<RelationRegistry>,
    config: EagerLoadConfig,
}

struct PendingNode<'a> {
    node: &'a RelationExpression,
    parent: Option<usize>,
    owner_model: String,
    path: Vec<String>,
    depth: usize,
}

impl EagerPlanner {
    pub fn new(registry: Arc<RelationRegistry>) -> Self {
        Self::with_config(registry, EagerLoadConfig::default())
    }

    pub fn with_config(registry: Arc<RelationRegistry>, config: EagerLoadConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &RelationRegistry {
        &self.registry
    }

    /// Plan the fetch steps for `expression` starting from rows of `model`
    pub fn plan(
        &self,
        model: &str,
        expression: &RelationExpression,
        allowed: Option<&AllowedExpression>,
    ) -> EagerResult<EagerPlan> {
        if let Some(allowed) = allowed {
            allowed.check(expression)?;
        }
        self.check_depth(expression)?;

        if expression.is_recursive {
            return Err(EagerError::Configuration(
                "the root of a relation expression cannot be recursive".to_string(),
            ));
        }

        let mut plan = EagerPlan::new(model);

        if expression.is_wildcard_all {
            for (relation, mapping) in self.registry.relations_for(model) {
                plan.push_step(
                    None,
                    vec![relation.to_string()],
                    model,
                    mapping.clone(),
                    1,
                    Expansion::WildcardAll,
                );
            }
            debug!(model, steps = plan.len(), "planned wildcard eager load");
            return Ok(plan);
        }

        let mut queue: VecDeque<PendingNode<'_>> = expression
            .children
            .iter()
            .map(|node| PendingNode {
                node,
                parent: None,
                owner_model: model.to_string(),
                path: Vec::new(),
                depth: 1,
            })
            .collect();

        while let Some(pending) = queue.pop_front() {
            let node = pending.node;
            let name = node.name();
            if (node.is_wildcard_all || node.is_recursive) && !node.children.is_empty() {
                return Err(EagerError::Configuration(format!(
                    "relation '{}' is marked with '*' or '^' and cannot have nested relations",
                    name
                )));
            }
            let mapping = self.registry.require(&pending.owner_model, name)?.clone();

            let expansion = if node.is_wildcard_all {
                Expansion::WildcardAll
            } else if node.is_recursive {
                // the next level resolves the same name on the related model
                self.registry.require(&mapping.related_model, name)?;
                Expansion::Recursive {
                    limit: node.recursion_limit,
                    level: 1,
                }
            } else {
                Expansion::None
            };

            let mut path = pending.path;
            path.push(name.to_string());
            let related_model = mapping.related_model.clone();

            let index = plan.push_step(
                pending.parent,
                path.clone(),
                &pending.owner_model,
                mapping,
                pending.depth,
                expansion,
            );

            queue.extend(node.children.iter().map(|child| PendingNode {
                node: child,
                parent: Some(index),
                owner_model: related_model.clone(),
                path: path.clone(),
                depth: pending.depth + 1,
            }));
        }

        debug!(
            model,
            expression = %expression,
            steps = plan.len(),
            "planned eager load"
        );
        Ok(plan)
    }

    fn check_depth(&self, expression: &RelationExpression) -> EagerResult<()> {
        let max_depth = self.config.max_depth;
        if expression.depth() <= max_depth {
            return Ok(());
        }

        let path = expression
            .paths()
            .into_iter()
            .find(|path| path.len() > max_depth)
            .unwrap_or_default();

        Err(EagerError::ExpressionTooDeep { path, max_depth })
    }
}
