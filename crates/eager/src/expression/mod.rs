//! Relation expressions - the textual DSL describing which relations to eager load
//!
//! `children.[pets, movies]` loads `children` for every owner row and then
//! `pets` and `movies` for every child. Two tokens have special meaning:
//! `*` (every relation, recursively) and `^` (this relation, recursively).
//! `name.^N` limits the recursion to `N` levels.

use std::fmt;
use std::str::FromStr;

use crate::error::{EagerError, EagerResult};

pub mod allowed;
pub mod parser;

pub use allowed::AllowedExpression;
pub use parser::{parse, ExpressionParser};

/// One node of a parsed relation expression
///
/// The root node has no name and stands for the rows already fetched by the
/// base query. Children keep the order in which they were written, which is
/// also the order the planner emits sibling fetch steps in.
#[derive(Debug, Clone, Default)]
pub struct RelationExpression {
    /// Relation name (`None` for the root)
    pub name: Option<String>,
    /// Nested relations, unique by name
    pub children: Vec<RelationExpression>,
    /// Set by `name.^`
    pub is_recursive: bool,
    /// Set by `name.^N`
    pub recursion_limit: Option<usize>,
    /// Set by `*` or `name.*`
    pub is_wildcard_all: bool,
}

impl RelationExpression {
    /// Create an empty root node
    pub fn root() -> Self {
        Self::default()
    }

    /// Create a named node without children
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Mark this node as recursive (`name.^`), optionally bounded
    pub fn recursive(mut self, limit: Option<usize>) -> Self {
        self.is_recursive = true;
        self.recursion_limit = limit;
        self
    }

    /// Mark this node as "all relations recursively", dropping nested relations
    pub fn wildcard(mut self) -> Self {
        self.is_wildcard_all = true;
        self.is_recursive = false;
        self.recursion_limit = None;
        self.children.clear();
        self
    }

    /// Add a child, failing on a duplicate name or on a `*`/`^` node
    pub fn with_child(mut self, child: RelationExpression) -> EagerResult<Self> {
        self.insert_child(child, 0)?;
        Ok(self)
    }

    /// Parse an expression string
    pub fn parse(expression: &str) -> EagerResult<Self> {
        parser::parse(expression)
    }

    /// Relation name, empty for the root
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn is_root(&self) -> bool {
        self.name.is_none()
    }

    /// True for a root that requests nothing
    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && !self.is_wildcard_all && !self.is_recursive
    }

    /// Find a direct child by name
    pub fn child(&self, name: &str) -> Option<&RelationExpression> {
        self.children.iter().find(|c| c.name.as_deref() == Some(name))
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut RelationExpression> {
        self.children.iter_mut().find(|c| c.name.as_deref() == Some(name))
    }

    pub(crate) fn insert_child(
        &mut self,
        child: RelationExpression,
        position: usize,
    ) -> EagerResult<()> {
        if self.is_wildcard_all || self.is_recursive {
            return Err(EagerError::Configuration(format!(
                "relation '{}' is marked with '{}' and cannot have nested relations",
                self.name(),
                if self.is_wildcard_all { "*" } else { "^" }
            )));
        }
        if self.child(child.name()).is_some() {
            return Err(EagerError::parse(
                position,
                format!("duplicate relation '{}'", child.name()),
            ));
        }
        self.children.push(child);
        Ok(())
    }

    /// Number of relation levels spelled out by the expression
    pub fn depth(&self) -> usize {
        let below = self.children.iter().map(|c| c.depth()).max().unwrap_or(0);
        if self.is_root() {
            below
        } else {
            below + 1
        }
    }

    /// Every root-to-node path, depth first
    pub fn paths(&self) -> Vec<Vec<String>> {
        fn walk(node: &RelationExpression, prefix: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
            for child in &node.children {
                prefix.push(child.name().to_string());
                out.push(prefix.clone());
                walk(child, prefix, out);
                prefix.pop();
            }
        }

        let mut out = Vec::new();
        walk(self, &mut Vec::new(), &mut out);
        out
    }

    /// Union another expression into this one
    ///
    /// Wildcards absorb everything below them and the larger recursion bound
    /// wins. A recursive relation cannot also carry nested relations; on that
    /// error `self` is left unchanged.
    pub fn merge(&mut self, other: RelationExpression) -> EagerResult<()> {
        let mut merged = self.clone();
        merged.merge_into(other)?;
        *self = merged;
        Ok(())
    }

    fn merge_into(&mut self, other: RelationExpression) -> EagerResult<()> {
        if other.is_wildcard_all {
            self.is_wildcard_all = true;
        }
        if other.is_recursive {
            self.recursion_limit = match (self.is_recursive, self.recursion_limit, other.recursion_limit) {
                (false, _, limit) => limit,
                (true, Some(a), Some(b)) => Some(a.max(b)),
                (true, _, _) => None,
            };
            self.is_recursive = true;
        }

        for child in other.children {
            match self.child_mut(child.name()) {
                Some(existing) => existing.merge_into(child)?,
                None => self.children.push(child),
            }
        }

        if self.is_wildcard_all {
            self.children.clear();
            self.is_recursive = false;
            self.recursion_limit = None;
        }
        if self.is_recursive && !self.children.is_empty() {
            return Err(EagerError::Configuration(format!(
                "recursive relation '{}' cannot have nested relations",
                self.name()
            )));
        }
        Ok(())
    }

    fn fmt_children(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.children.as_slice() {
            [] => Ok(()),
            [only] => write!(f, "{}", only),
            many => {
                f.write_str("[")?;
                for (i, child) in many.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", child)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Canonical form: `a.b`, `[a, b.[c, d]]`, `a.^`, `a.^3`, `a.*`, `*`
impl fmt::Display for RelationExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            if self.is_wildcard_all {
                return f.write_str("*");
            }
            return self.fmt_children(f);
        }

        f.write_str(self.name())?;
        if self.is_wildcard_all {
            f.write_str(".*")
        } else if self.is_recursive {
            match self.recursion_limit {
                Some(limit) => write!(f, ".^{}", limit),
                None => f.write_str(".^"),
            }
        } else if self.children.is_empty() {
            Ok(())
        } else {
            f.write_str(".")?;
            self.fmt_children(f)
        }
    }
}

impl FromStr for RelationExpression {
    type Err = EagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse(s)
    }
}

/// Children compare as a set: `[a, b]` equals `[b, a]`
impl PartialEq for RelationExpression {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.is_recursive == other.is_recursive
            && self.recursion_limit == other.recursion_limit
            && self.is_wildcard_all == other.is_wildcard_all
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .all(|c| other.child(c.name()).is_some_and(|o| c == o))
    }
}

impl Eq for RelationExpression {}
