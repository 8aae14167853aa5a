//! Compiled query plans.

use std::fmt;

use regex::Regex;

/// A dotted field reference resolved against a target type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    type_name: String,
    segments: Vec<String>,
}

impl FieldPath {
    /// Creates a path into records of `type_name`.
    pub fn new(type_name: impl Into<String>, segments: Vec<String>) -> Self {
        Self {
            type_name: type_name.into(),
            segments,
        }
    }

    /// The type the path is resolved against.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Field names from the record root inward.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Comparison operators after spelling variants are folded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    /// `=` / `==`
    Eq,
    /// `!=` / `<>`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// Substring or array membership.
    Contains,
    /// Text prefix.
    StartsWith,
    /// Text suffix.
    EndsWith,
    /// Regular expression search.
    Matches,
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Contains => "contains",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Matches => "matches",
        };
        f.write_str(s)
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone)]
pub enum Operand {
    /// `null`
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Decimal literal. Records hold no floats, so it only ever compares
    /// against integer fields.
    Decimal(f64),
    /// String literal.
    Text(String),
    /// Compiled `matches` pattern.
    Pattern(Regex),
}

impl PartialEq for Operand {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Decimal(a), Self::Decimal(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Pattern(a), Self::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

/// A leaf test: `field op operand`.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Field being tested.
    pub field: FieldPath,
    /// Operator.
    pub op: ComparisonOp,
    /// Literal operand.
    pub operand: Operand,
}

/// Predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Leaf comparison.
    Compare(Comparison),
    /// Negation.
    Not(Box<Predicate>),
    /// All children must hold. Always has at least two children.
    And(Vec<Predicate>),
    /// Any child must hold. Always has at least two children.
    Or(Vec<Predicate>),
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// Ordering of query results.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    /// Direction applied to every field.
    pub direction: SortDirection,
    /// Sort fields in priority order. Empty means primary-key order.
    pub fields: Vec<FieldPath>,
}

/// An immutable, reusable compiled query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    type_name: String,
    predicate: Option<Predicate>,
    order: Option<OrderSpec>,
    skip: usize,
    limit: Option<usize>,
}

impl QueryPlan {
    pub(crate) fn new(
        type_name: impl Into<String>,
        predicate: Option<Predicate>,
        order: Option<OrderSpec>,
        skip: usize,
        limit: Option<usize>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            predicate,
            order,
            skip,
            limit,
        }
    }

    /// Type whose records are scanned.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Filter; `None` matches every record.
    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    /// Result ordering; `None` keeps primary-key order.
    pub fn order(&self) -> Option<&OrderSpec> {
        self.order.as_ref()
    }

    /// Matches dropped from the front.
    pub fn skip(&self) -> usize {
        self.skip
    }

    /// Maximum number of results.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}
