//! Allowed expressions - server-declared upper bound for client expressions
//!
//! A requested expression is allowed when every requested path exists in the
//! allowed tree. A `*` in the allowed tree lifts every restriction below it;
//! a requested `*` is only allowed where the allowed tree has one too, and a
//! requested `^` needs an allowed `*` or an allowed `^` with at least the same
//! bound. An allowed `name.^N` also covers `name.name...` spelled out by hand,
//! up to `N` levels.

use super::{parse, RelationExpression};
use crate::error::{EagerError, EagerResult};

/// Whitelist of relation paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedExpression {
    tree: RelationExpression,
}

impl AllowedExpression {
    pub fn new(tree: RelationExpression) -> Self {
        Self { tree }
    }

    /// Parse the allowed expression with the regular expression grammar
    pub fn parse(expression: &str) -> EagerResult<Self> {
        parse(expression).map(Self::new)
    }

    pub fn tree(&self) -> &RelationExpression {
        &self.tree
    }

    /// Check a requested expression, reporting the first uncovered path
    pub fn check(&self, requested: &RelationExpression) -> EagerResult<()> {
        let mut path = Vec::new();
        check_node(&self.tree, requested, &mut path, 1)
            .map_err(|path| EagerError::DisallowedExpression { path })
    }

    pub fn allows(&self, requested: &RelationExpression) -> bool {
        self.check(requested).is_ok()
    }
}

fn check_node(
    allowed: &RelationExpression,
    requested: &RelationExpression,
    path: &mut Vec<String>,
    level: usize,
) -> Result<(), Vec<String>> {
    if allowed.is_wildcard_all {
        return Ok(());
    }

    if requested.is_wildcard_all {
        let mut denied = path.clone();
        denied.push("*".to_string());
        return Err(denied);
    }

    if requested.is_recursive {
        let covered = allowed.is_recursive
            && match (allowed.recursion_limit, requested.recursion_limit) {
                (None, _) => true,
                (Some(max), Some(wanted)) => level + wanted - 1 <= max,
                (Some(_), None) => false,
            };
        if !covered {
            let mut denied = path.clone();
            denied.push("^".to_string());
            return Err(denied);
        }
    }

    for child in &requested.children {
        path.push(child.name().to_string());
        if allowed.is_recursive && child.name() == allowed.name() {
            // `level` counts the levels of `allowed` already used by the chain
            let next = level + 1;
            if allowed.recursion_limit.is_some_and(|max| next > max) {
                return Err(path.clone());
            }
            check_node(allowed, child, path, next)?;
        } else {
            match allowed.child(child.name()) {
                Some(allowed_child) => check_node(allowed_child, child, path, 1)?,
                None => return Err(path.clone()),
            }
        }
        path.pop();
    }

    Ok(())
}
