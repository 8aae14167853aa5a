//! Query language: text → syntax tree → plan → results.
//!
//! A query is an optional filter, ordering, skip, limit and target type:
//!
//! ```text
//! filter city.name contains 'holm' and not streetNumber > 10
//!     ordered streetName, streetNumber skip 0 limit 20 "Street"
//! ```
//!
//! [`QueryCompiler`] parses and compiles text into an immutable
//! [`QueryPlan`]; [`QueryExecutor`] runs a plan over one type's key group
//! inside a transaction. [`PlanCache`] keeps compiled plans per target
//! type and text.

mod ast;
mod cache;
mod compiler;
mod executor;
mod lexer;
mod parser;
mod plan;

pub use cache::PlanCache;
pub use compiler::QueryCompiler;
pub use executor::{evaluate, QueryExecutor, Truth};
pub use plan::{
    Comparison, ComparisonOp, FieldPath, Operand, OrderSpec, Predicate, QueryPlan, SortDirection,
};
