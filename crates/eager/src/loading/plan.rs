//! Eager plans - the ordered fetch steps produced by the planner

use serde::Serialize;

use crate::relationships::RelationMapping;

/// How a step grows at execution time once its rows are known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Expansion {
    /// Fixed step, nothing is synthesized below it
    None,
    /// `name.^` / `name.^N`: the same relation again one level down
    Recursive { limit: Option<usize>, level: usize },
    /// `*`: every relation of the related model, one level down
    WildcardAll,
}

/// One batched fetch of a relation for every row of the parent step
#[derive(Debug, Clone, Serialize)]
pub struct FetchStep {
    /// Position in the plan
    pub index: usize,
    /// Step whose rows own this relation (`None` for the base rows)
    pub parent: Option<usize>,
    /// Relation names from the base rows down to this step
    pub path: Vec<String>,
    /// Model the relation is declared on
    pub owner_model: String,
    pub relation: String,
    pub mapping: RelationMapping,
    /// Distance from the base rows, starting at 1
    pub depth: usize,
    pub expansion: Expansion,
}

impl FetchStep {
    /// Dotted path, e.g. `children.pets`
    pub fn path_string(&self) -> String {
        self.path.join(".")
    }

    /// Path of a step synthesized below this one
    pub fn child_path(&self, relation: &str) -> Vec<String> {
        let mut path = self.path.clone();
        path.push(relation.to_string());
        path
    }
}

/// Fetch steps in breadth-first order
///
/// A step's parent always has a lower index than the step itself.
#[derive(Debug, Clone, Serialize)]
pub struct EagerPlan {
    pub root_model: String,
    pub steps: Vec<FetchStep>,
}

impl EagerPlan {
    pub fn new(root_model: impl Into<String>) -> Self {
        Self {
            root_model: root_model.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step, assigning its index
    pub fn push_step(
        &mut self,
        parent: Option<usize>,
        path: Vec<String>,
        owner_model: &str,
        mapping: RelationMapping,
        depth: usize,
        expansion: Expansion,
    ) -> usize {
        let index = self.steps.len();
        let relation = path.last().cloned().unwrap_or_default();
        self.steps.push(FetchStep {
            index,
            parent,
            path,
            owner_model: owner_model.to_string(),
            relation,
            mapping,
            depth,
            expansion,
        });
        index
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, index: usize) -> Option<&FetchStep> {
        self.steps.get(index)
    }

    /// Dotted paths of every step in plan order
    pub fn paths(&self) -> Vec<String> {
        self.steps.iter().map(FetchStep::path_string).collect()
    }

    /// Deepest step level in the static plan
    pub fn max_depth(&self) -> usize {
        self.steps.iter().map(|s| s.depth).max().unwrap_or(0)
    }
}
