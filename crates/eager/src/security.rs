//! SQL identifier helpers
//!
//! Table and column names reach SQL text through relation mappings, so they are
//! validated when a mapping is registered and escaped when a query is rendered.

use crate::error::{EagerError, EagerResult};

/// Characters allowed in SQL identifiers (alphanumeric, underscore, dollar)
const ALLOWED_IDENTIFIER_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_$";

/// PostgreSQL truncates identifiers past this length
const MAX_IDENTIFIER_LEN: usize = 63;

/// Escape a SQL identifier (table name, column name, etc.)
///
/// ```
/// use elif_eager::security::escape_identifier;
///
/// assert_eq!(escape_identifier("owner_id"), "\"owner_id\"");
/// assert_eq!(escape_identifier("odd\"name"), "\"odd\"\"name\"");
/// ```
pub fn escape_identifier(identifier: &str) -> String {
    let escaped = identifier.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Escape a `table.column` pair
pub fn qualified_column(table: &str, column: &str) -> String {
    format!("{}.{}", escape_identifier(table), escape_identifier(column))
}

/// Validate that an identifier is safe to embed in SQL
pub fn validate_identifier(identifier: &str) -> EagerResult<()> {
    let Some(first) = identifier.chars().next() else {
        return Err(EagerError::Configuration(
            "Identifier cannot be empty".to_string(),
        ));
    };

    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(EagerError::Configuration(format!(
            "Identifier '{}' is too long (max {} characters)",
            identifier, MAX_IDENTIFIER_LEN
        )));
    }

    if let Some(c) = identifier.chars().find(|c| !ALLOWED_IDENTIFIER_CHARS.contains(*c)) {
        return Err(EagerError::Configuration(format!(
            "Identifier '{}' contains invalid character '{}'",
            identifier, c
        )));
    }

    if first.is_ascii_digit() {
        return Err(EagerError::Configuration(format!(
            "Identifier '{}' cannot start with a number",
            identifier
        )));
    }

    Ok(())
}
