//! Syntax tree produced by the query parser.

/// A value with the byte span it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    /// The parsed value.
    pub value: T,
    /// Start offset in the query text.
    pub start: usize,
    /// End offset (exclusive).
    pub end: usize,
}

/// A parsed query. Every clause is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryAst {
    /// `filter ...`
    pub filter: Option<OrExpr>,
    /// `ordered ...` / `reversed ...`
    pub order: Option<OrderClause>,
    /// `skip N`
    pub skip: Option<Spanned<i64>>,
    /// `limit N`
    pub limit: Option<Spanned<i64>>,
    /// Trailing quoted type name.
    pub type_name: Option<Spanned<String>>,
}

/// Disjunction of one or more conjunctions.
#[derive(Debug, Clone, PartialEq)]
pub struct OrExpr {
    /// Operands of `or`.
    pub terms: Vec<AndExpr>,
}

/// Conjunction of one or more unary expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct AndExpr {
    /// Operands of `and`.
    pub factors: Vec<UnaryExpr>,
}

/// A primary expression with an optional leading `not`.
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpr {
    /// Whether `not` was written.
    pub negated: bool,
    /// The operand.
    pub primary: Primary,
}

/// Comparison or parenthesized group.
#[derive(Debug, Clone, PartialEq)]
pub enum Primary {
    /// `field op literal`
    Comparison(ComparisonExpr),
    /// `( or_expr )`
    Group(Box<OrExpr>),
}

/// `field operator literal`
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonExpr {
    /// Dotted field path segments.
    pub field: Vec<String>,
    /// Operator as written.
    pub operator: Operator,
    /// Right-hand literal.
    pub literal: Spanned<Literal>,
}

/// Operators exactly as spelled in the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Assign,
    /// `==`
    Equals,
    /// `!=`
    BangEquals,
    /// `<>`
    Diamond,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `contains`
    Contains,
    /// `startsWith`
    StartsWith,
    /// `endsWith`
    EndsWith,
    /// `matches`
    Matches,
}

/// Literal operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Integer.
    Int(i64),
    /// Decimal.
    Decimal(f64),
    /// `true` / `false`
    Bool(bool),
    /// `null`
    Null,
    /// Quoted string.
    Text(String),
}

/// `ordered` or `reversed` with an optional field list.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderClause {
    /// Which keyword was used.
    pub direction: OrderDirection,
    /// Sort fields; empty means primary-key order.
    pub fields: Vec<Vec<String>>,
}

/// Sort direction keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    /// `ordered`
    Ordered,
    /// `reversed`
    Reversed,
}
