//! JSONPath expressions.
//!
//! ```text
//! $.resources[?(@.category == 'network')]['name','id']
//! ```
//!
//! [`JsonPath::parse`] builds the syntax tree, [`JsonPath::evaluate`] runs it
//! against a document, and `Display` turns it back into a canonical string.

mod eval;
mod parser;

use std::fmt;

use serde_json::Value;

use crate::error::QueryError;

/// A parsed JSONPath query, rooted at `$`.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath {
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// `.sel` or `[sel]`: applies to the children of each input node.
    Child(Selector),
    /// `..sel`: applies to each input node and all of its descendants.
    Descendant(Selector),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Bare member: `.name`
    Name(String),
    /// String-literal subscript: `['name']`
    QuotedName(String),
    /// `*` or `[*]`
    Wildcard,
    /// `[3]`, `[-1]`
    Index(i64),
    /// `[start:end:step]`
    Slice(Slice),
    /// `['a','b']`, `[0,2]`
    Union(Vec<UnionMember>),
    /// `[?(...)]`
    Filter(FilterExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnionMember {
    Name(String),
    Index(i64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Slice {
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub step: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Or(Box<FilterExpr>, Box<FilterExpr>),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
    Exists(RelativePath),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Path(RelativePath),
    Literal(Value),
}

/// A singular path inside a filter, starting at `@` or `$`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelativePath {
    pub from_root: bool,
    pub steps: Vec<PathStep>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathStep {
    Name(String),
    Index(i64),
}

impl JsonPath {
    /// Parses a JSONPath expression.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::InvalidQuery` with a `Lexical` kind for
    /// malformed tokens and a `Parse` kind for malformed structure.
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        parser::Parser::new(input).parse_path()
    }

    /// Evaluates the query against `root`, returning matched nodes in
    /// document order.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Internal` if a descendant segment exceeds the
    /// maximum traversal depth.
    pub fn evaluate<'v>(&self, root: &'v Value) -> Result<Vec<&'v Value>, QueryError> {
        eval::evaluate(&self.segments, root)
    }

    /// Splits off the last segment, returning the remaining path and the
    /// popped segment.
    #[must_use]
    pub fn split_last(&self) -> Option<(JsonPath, &Segment)> {
        let (last, rest) = self.segments.split_last()?;
        Some((
            JsonPath {
                segments: rest.to_vec(),
            },
            last,
        ))
    }
}

fn is_plain_member(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '@' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("'")?;
    for c in s.chars() {
        match c {
            '\'' => f.write_str("\\'")?,
            '\\' => f.write_str("\\\\")?,
            other => write!(f, "{other}")?,
        }
    }
    f.write_str("'")
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.segments {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Child(Selector::Name(name)) if is_plain_member(name) => {
                write!(f, ".{name}")
            }
            Segment::Child(selector) => write!(f, "[{selector}]"),
            Segment::Descendant(Selector::Name(name)) if is_plain_member(name) => {
                write!(f, "..{name}")
            }
            Segment::Descendant(Selector::Wildcard) => f.write_str("..*"),
            Segment::Descendant(selector) => write!(f, "..[{selector}]"),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Name(name) | Selector::QuotedName(name) => write_quoted(f, name),
            Selector::Wildcard => f.write_str("*"),
            Selector::Index(i) => write!(f, "{i}"),
            Selector::Slice(slice) => {
                if let Some(start) = slice.start {
                    write!(f, "{start}")?;
                }
                f.write_str(":")?;
                if let Some(end) = slice.end {
                    write!(f, "{end}")?;
                }
                if let Some(step) = slice.step {
                    write!(f, ":{step}")?;
                }
                Ok(())
            }
            Selector::Union(members) => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    match member {
                        UnionMember::Name(name) => write_quoted(f, name)?,
                        UnionMember::Index(index) => write!(f, "{index}")?,
                    }
                }
                Ok(())
            }
            Selector::Filter(expr) => write!(f, "?({expr})"),
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::Or(left, right) => write!(f, "{left} || {right}"),
            FilterExpr::And(left, right) => {
                write_and_operand(f, left)?;
                f.write_str(" && ")?;
                write_and_operand(f, right)
            }
            FilterExpr::Not(inner) => match inner.as_ref() {
                FilterExpr::Exists(path) => write!(f, "!{path}"),
                other => write!(f, "!({other})"),
            },
            FilterExpr::Exists(path) => write!(f, "{path}"),
            FilterExpr::Compare { left, op, right } => write!(f, "{left} {op} {right}"),
        }
    }
}

fn write_and_operand(f: &mut fmt::Formatter<'_>, expr: &FilterExpr) -> fmt::Result {
    match expr {
        FilterExpr::Or(..) => write!(f, "({expr})"),
        other => write!(f, "{other}"),
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        })
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Path(path) => write!(f, "{path}"),
            Operand::Literal(Value::String(s)) => write_quoted(f, s),
            Operand::Literal(value) => write!(f, "{value}"),
        }
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.from_root { "$" } else { "@" })?;
        for step in &self.steps {
            match step {
                PathStep::Name(name) if is_plain_member(name) => write!(f, ".{name}")?,
                PathStep::Name(name) => {
                    f.write_str("[")?;
                    write_quoted(f, name)?;
                    f.write_str("]")?;
                }
                PathStep::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}
