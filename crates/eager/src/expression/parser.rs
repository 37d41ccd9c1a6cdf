//! Relation expression parser
//!
//! Grammar (whitespace is insignificant):
//!
//! ```text
//! expression := ε | item | '*'
//! item       := NAME ( '.' tail )? | '[' item ( ',' item )* ']'
//! tail       := item | '^' DIGITS? | '*'
//! NAME       := [A-Za-z0-9_$]+
//! ```
//!
//! Error positions are character offsets into the input.

use tracing::trace;

use super::RelationExpression;
use crate::error::{EagerError, EagerResult};

/// Parse an expression string into a relation expression tree
///
/// ```
/// use elif_eager::expression::parse;
///
/// let expr = parse("children.[pets, movies]").unwrap();
/// assert_eq!(expr.children.len(), 1);
/// assert_eq!(expr.children[0].children.len(), 2);
/// ```
pub fn parse(expression: &str) -> EagerResult<RelationExpression> {
    ExpressionParser::new(expression).parse()
}

/// Recursive descent parser over the characters of an expression
pub struct ExpressionParser {
    chars: Vec<char>,
    pos: usize,
    open_brackets: Vec<usize>,
}

impl ExpressionParser {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            open_brackets: Vec::new(),
        }
    }

    /// Parse the whole input
    pub fn parse(mut self) -> EagerResult<RelationExpression> {
        let mut root = RelationExpression::root();

        self.skip_whitespace();
        match self.peek() {
            None => return Ok(root),
            Some('*') => {
                self.pos += 1;
                root.is_wildcard_all = true;
            }
            Some(_) => self.parse_item(&mut root)?,
        }

        self.skip_whitespace();
        if let Some(c) = self.peek() {
            let message = match c {
                ']' => "unmatched ']'".to_string(),
                '.' if root.is_wildcard_all || ends_with_special(&root) => {
                    "'*' and '^' must be the last token of a path".to_string()
                }
                _ => format!("unexpected '{}'", c),
            };
            return Err(EagerError::parse(self.pos, message));
        }

        trace!(expression = %root, "parsed relation expression");
        Ok(root)
    }

    /// Parse a name path or a bracketed group into `parent`
    fn parse_item(&mut self, parent: &mut RelationExpression) -> EagerResult<()> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(self.eof_error()),
            Some('[') => self.parse_group(parent),
            Some(c) if is_name_char(c) => {
                let start = self.pos;
                let node = self.parse_named()?;
                parent.insert_child(node, start)
            }
            Some('*') => Err(EagerError::parse(
                self.pos,
                "'*' must follow a relation name or be the whole expression",
            )),
            Some('^') => Err(EagerError::parse(
                self.pos,
                "'^' must directly follow a relation name",
            )),
            Some(']') if !self.open_brackets.is_empty() => {
                Err(EagerError::parse(self.pos, "expected relation name before ']'"))
            }
            Some(']') => Err(EagerError::parse(self.pos, "unmatched ']'")),
            Some(c) => Err(EagerError::parse(self.pos, format!("unexpected '{}'", c))),
        }
    }

    /// `[item, item, ...]` - every item lands on the same level as the group
    fn parse_group(&mut self, parent: &mut RelationExpression) -> EagerResult<()> {
        self.open_brackets.push(self.pos);
        self.pos += 1;

        loop {
            self.skip_whitespace();
            if self.peek().is_none() {
                return Err(self.eof_error());
            }
            self.parse_item(parent)?;

            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(']') => {
                    self.pos += 1;
                    self.open_brackets.pop();
                    return Ok(());
                }
                None => return Err(self.eof_error()),
                Some('.') => {
                    return Err(EagerError::parse(
                        self.pos,
                        "'*' and '^' must be the last token of a path",
                    ))
                }
                Some(c) => {
                    return Err(EagerError::parse(
                        self.pos,
                        format!("expected ',' or ']' but found '{}'", c),
                    ))
                }
            }
        }
    }

    /// `name`, `name.tail`, `name.^`, `name.^N` or `name.*`
    fn parse_named(&mut self) -> EagerResult<RelationExpression> {
        let start = self.pos;
        while self.peek().is_some_and(is_name_char) {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        let mut node = RelationExpression::named(name);

        self.skip_whitespace();
        if self.peek() != Some('.') {
            return Ok(node);
        }
        self.pos += 1;
        self.skip_whitespace();

        match self.peek() {
            None => return Err(self.eof_error()),
            Some('^') => {
                self.pos += 1;
                node.is_recursive = true;
                node.recursion_limit = self.parse_recursion_limit()?;
            }
            Some('*') => {
                self.pos += 1;
                node.is_wildcard_all = true;
            }
            Some(_) => self.parse_item(&mut node)?,
        }

        Ok(node)
    }

    fn parse_recursion_limit(&mut self) -> EagerResult<Option<usize>> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Ok(None);
        }

        let digits: String = self.chars[start..self.pos].iter().collect();
        match digits.parse::<usize>() {
            Ok(0) => Err(EagerError::parse(start, "recursion depth must be at least 1")),
            Ok(limit) => Ok(Some(limit)),
            Err(_) => Err(EagerError::parse(start, "recursion depth is too large")),
        }
    }

    /// End of input inside a group points at the innermost open bracket
    fn eof_error(&self) -> EagerError {
        match self.open_brackets.last() {
            Some(&open) => EagerError::parse(open, "unterminated '['"),
            None => EagerError::parse(self.chars.len(), "unexpected end of expression"),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Whether the last written path of `node` ended in `*` or `^`
fn ends_with_special(node: &RelationExpression) -> bool {
    match node.children.last() {
        Some(last) => last.is_recursive || last.is_wildcard_all || ends_with_special(last),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_error(input: &str) -> (usize, String) {
        match parse(input) {
            Err(EagerError::Parse { position, message }) => (position, message),
            other => panic!("expected parse error for {:?}, got {:?}", input, other),
        }
    }

    #[test]
    fn test_empty_expression() {
        let expr = parse("").unwrap();
        assert!(expr.is_root());
        assert!(expr.is_empty());

        assert!(parse("   ").unwrap().is_empty());
    }

    #[test]
    fn test_single_relation() {
        let expr = parse("pets").unwrap();
        assert_eq!(expr.children.len(), 1);
        assert_eq!(expr.children[0].name(), "pets");
        assert!(expr.children[0].children.is_empty());
    }

    #[test]
    fn test_nested_sibling_group() {
        let expr = parse("children.[pets, movies]").unwrap();
        let children = expr.child("children").unwrap();
        assert_eq!(children.children.len(), 2);
        assert_eq!(children.children[0].name(), "pets");
        assert_eq!(children.children[1].name(), "movies");
    }

    #[test]
    fn test_whitespace_is_insignificant() {
        assert_eq!(
            parse(" children . [ pets ,movies ] ").unwrap(),
            parse("children.[pets, movies]").unwrap()
        );
    }

    #[test]
    fn test_nested_groups_flatten() {
        assert_eq!(parse("[[a, b], c]").unwrap(), parse("[a, b, c]").unwrap());
    }

    #[test]
    fn test_recursive_token() {
        let expr = parse("parent.^").unwrap();
        let parent = expr.child("parent").unwrap();
        assert!(parent.is_recursive);
        assert_eq!(parent.recursion_limit, None);
        assert!(parent.children.is_empty());

        let bounded = parse("parent.^4").unwrap();
        assert_eq!(bounded.child("parent").unwrap().recursion_limit, Some(4));
    }

    #[test]
    fn test_wildcard_token() {
        assert!(parse("*").unwrap().is_wildcard_all);

        let expr = parse("[pets, children.*]").unwrap();
        assert!(expr.child("children").unwrap().is_wildcard_all);
        assert!(!expr.child("pets").unwrap().is_wildcard_all);
    }

    #[test]
    fn test_unterminated_bracket_reports_bracket_offset() {
        assert_eq!(parse_error("a.[b,").0, 2);
        assert_eq!(parse_error("[a, b").0, 0);
        assert_eq!(parse_error("a.[b.[c").0, 5);
    }

    #[test]
    fn test_unmatched_closing_bracket() {
        let (position, message) = parse_error("a.b]");
        assert_eq!(position, 3);
        assert!(message.contains("unmatched"));
    }

    #[test]
    fn test_misplaced_special_tokens() {
        assert_eq!(parse_error("^").0, 0);
        assert_eq!(parse_error("[a, ^]").0, 4);
        assert_eq!(parse_error("[a, *]").0, 4);
        assert_eq!(parse_error("a.^.b").0, 3);
        assert_eq!(parse_error("a.*.b").0, 3);
        assert_eq!(parse_error("*.a").0, 1);
        assert_eq!(parse_error("a.^0").0, 3);
    }

    #[test]
    fn test_duplicate_sibling_names() {
        let (position, message) = parse_error("[pets, movies, pets]");
        assert_eq!(position, 15);
        assert!(message.contains("duplicate"));

        // Same name at different levels is fine
        assert!(parse("children.children").is_ok());
    }

    #[test]
    fn test_malformed_groups() {
        assert_eq!(parse_error("[]").0, 1);
        assert_eq!(parse_error("[a,]").0, 3);
        assert_eq!(parse_error("[a b]").0, 3);
        assert_eq!(parse_error("a.").0, 2);
        assert_eq!(parse_error("a-b").0, 1);
        assert_eq!(parse_error("pétß").0, 1);
        assert_eq!(parse_error("[a, émile]").0, 4);
    }
}
