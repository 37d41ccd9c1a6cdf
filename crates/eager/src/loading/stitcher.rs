//! Graph stitching - attaching fetched child rows to their parent rows
//!
//! Every parent ends up with the relation property set: an array for
//! collection relations, an object or `null` for one-to-one relations. For
//! one-to-one relations the first matching child wins.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::error::{EagerError, EagerResult};
use crate::query::THROUGH_OWNER_KEY;
use crate::relationships::{RelationKind, RelationMapping};

/// Normalised join key
///
/// Strings compare by content, numbers and booleans by their textual form,
/// so `1` and `"1"` join. Null and structured values never join.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinKey(String);

impl JoinKey {
    pub fn from_value(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::String(s) => Some(Self(s.clone())),
            JsonValue::Number(n) => Some(Self(n.to_string())),
            JsonValue::Bool(b) => Some(Self(b.to_string())),
            JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Collect distinct, non-null values of `column` in first-seen order
pub fn collect_keys(rows: &[JsonValue], column: &str) -> Vec<JsonValue> {
    let mut seen = std::collections::HashSet::new();
    let mut keys = Vec::new();

    for value in rows.iter().filter_map(|row| row.get(column)) {
        if let Some(key) = JoinKey::from_value(value) {
            if seen.insert(key) {
                keys.push(value.clone());
            }
        }
    }

    keys
}

/// Attaches batches of child rows onto parent rows
pub struct GraphStitcher;

impl GraphStitcher {
    /// Set `relation` on every parent from the matching `children`
    pub fn attach(
        parents: &mut [JsonValue],
        children: Vec<JsonValue>,
        relation: &str,
        mapping: &RelationMapping,
    ) -> EagerResult<()> {
        let grouped = Self::group_by_owner(children, mapping)?;

        for parent in parents.iter_mut() {
            let object = parent.as_object_mut().ok_or_else(|| {
                EagerError::InvalidRow(format!(
                    "cannot attach relation '{}' to a non-object row",
                    relation
                ))
            })?;

            let matches = object
                .get(&mapping.owner_column)
                .and_then(JoinKey::from_value)
                .and_then(|key| grouped.get(&key));

            let value = match mapping.kind {
                RelationKind::OneToOne => matches
                    .and_then(|rows| rows.first().cloned())
                    .unwrap_or(JsonValue::Null),
                RelationKind::OneToMany | RelationKind::ManyToMany => {
                    JsonValue::Array(matches.cloned().unwrap_or_default())
                }
            };

            object.insert(relation.to_string(), value);
        }

        Ok(())
    }

    /// Group children by the key that points at their owner, in query order
    ///
    /// Rows fetched through a join table lose the synthetic owner column here.
    pub fn group_by_owner(
        children: Vec<JsonValue>,
        mapping: &RelationMapping,
    ) -> EagerResult<HashMap<JoinKey, Vec<JsonValue>>> {
        let key_column = mapping.join_key_on_related();
        let strip = mapping.through.is_some();
        let mut grouped: HashMap<JoinKey, Vec<JsonValue>> = HashMap::new();

        for mut child in children {
            let object = child.as_object_mut().ok_or_else(|| {
                EagerError::InvalidRow(format!(
                    "related row from '{}' is not an object",
                    mapping.related_table
                ))
            })?;

            let key = if strip {
                object.remove(key_column)
            } else {
                object.get(key_column).cloned()
            };

            if let Some(key) = key.as_ref().and_then(JoinKey::from_value) {
                grouped.entry(key).or_default().push(child);
            }
        }

        Ok(grouped)
    }
}
