//! Relation Mapping Metadata - Static descriptors for declared relations

use serde::{Deserialize, Serialize};

use crate::error::{EagerError, EagerResult};
use crate::security::validate_identifier;

/// Defines the kind of relation between models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// Each owner has at most one related row (has-one or belongs-to)
    OneToOne,
    /// Each owner has any number of related rows
    OneToMany,
    /// Owners and related rows are linked through a join table
    ManyToMany,
}

impl RelationKind {
    /// Returns true if this relation loads a collection
    pub fn is_collection(self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }

    /// Returns true if this relation requires a through table
    pub fn requires_through(self) -> bool {
        matches!(self, Self::ManyToMany)
    }
}

/// Join table configuration for many-to-many relations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughTable {
    /// The join table name
    pub table: String,
    /// Column in the join table holding the owner's key
    pub owner_column: String,
    /// Column in the join table holding the related row's key
    pub related_column: String,
}

impl ThroughTable {
    pub fn new(
        table: impl Into<String>,
        owner_column: impl Into<String>,
        related_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            owner_column: owner_column.into(),
            related_column: related_column.into(),
        }
    }

    /// Validate the join table configuration
    pub fn validate(&self) -> EagerResult<()> {
        validate_identifier(&self.table)?;
        validate_identifier(&self.owner_column)?;
        validate_identifier(&self.related_column)?;

        if self.owner_column == self.related_column {
            return Err(EagerError::Configuration(format!(
                "Through table '{}' must use different owner and related columns",
                self.table
            )));
        }

        Ok(())
    }
}

/// Static descriptor of one declared relation
///
/// `owner_column` is read from the owner rows and matched against
/// `related_column` on the related rows. For many-to-many relations the owner
/// key is matched against `through.owner_column` and the related rows are
/// joined on `through.related_column = related_column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationMapping {
    pub kind: RelationKind,
    /// Model fetched through this relation
    pub related_model: String,
    /// Table the related model lives in
    pub related_table: String,
    pub owner_column: String,
    pub related_column: String,
    /// Join table, present for many-to-many relations only
    pub through: Option<ThroughTable>,
}

impl RelationMapping {
    pub fn new(
        kind: RelationKind,
        related_model: impl Into<String>,
        related_table: impl Into<String>,
        owner_column: impl Into<String>,
        related_column: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            related_model: related_model.into(),
            related_table: related_table.into(),
            owner_column: owner_column.into(),
            related_column: related_column.into(),
            through: None,
        }
    }

    /// One-to-one relation; the column pair decides its direction
    pub fn one_to_one(
        related_model: impl Into<String>,
        related_table: impl Into<String>,
        owner_column: impl Into<String>,
        related_column: impl Into<String>,
    ) -> Self {
        Self::new(
            RelationKind::OneToOne,
            related_model,
            related_table,
            owner_column,
            related_column,
        )
    }

    pub fn one_to_many(
        related_model: impl Into<String>,
        related_table: impl Into<String>,
        owner_column: impl Into<String>,
        related_column: impl Into<String>,
    ) -> Self {
        Self::new(
            RelationKind::OneToMany,
            related_model,
            related_table,
            owner_column,
            related_column,
        )
    }

    pub fn many_to_many(
        related_model: impl Into<String>,
        related_table: impl Into<String>,
        owner_column: impl Into<String>,
        through: ThroughTable,
        related_column: impl Into<String>,
    ) -> Self {
        Self::new(
            RelationKind::ManyToMany,
            related_model,
            related_table,
            owner_column,
            related_column,
        )
        .with_through(through)
    }

    /// Set the join table configuration
    pub fn with_through(mut self, through: ThroughTable) -> Self {
        self.through = Some(through);
        self
    }

    /// Validate the mapping for consistency
    pub fn validate(&self) -> EagerResult<()> {
        match (self.kind.requires_through(), &self.through) {
            (true, None) => {
                return Err(EagerError::Configuration(format!(
                    "Relation to '{}' of kind {:?} requires a through table",
                    self.related_model, self.kind
                )))
            }
            (false, Some(through)) => {
                return Err(EagerError::Configuration(format!(
                    "Relation to '{}' of kind {:?} cannot use through table '{}'",
                    self.related_model, self.kind, through.table
                )))
            }
            _ => {}
        }

        if self.related_model.trim().is_empty() {
            return Err(EagerError::Configuration(
                "Related model name cannot be empty".to_string(),
            ));
        }

        validate_identifier(&self.related_table)?;
        validate_identifier(&self.owner_column)?;
        validate_identifier(&self.related_column)?;

        if let Some(ref through) = self.through {
            through.validate()?;
        }

        Ok(())
    }

    /// Column on the fetched rows that identifies their owner
    pub fn join_key_on_related(&self) -> &str {
        match self.through {
            Some(_) => crate::query::THROUGH_OWNER_KEY,
            None => &self.related_column,
        }
    }
}
