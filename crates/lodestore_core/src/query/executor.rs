//! Runs a [`QueryPlan`] inside a transaction.

use std::cmp::Ordering;

use lodestore_codec::{from_cbor, Value};
use tracing::trace;

use super::plan::{Comparison, ComparisonOp, Operand, OrderSpec, Predicate, QueryPlan, SortDirection};
use crate::error::CoreResult;
use crate::key::{PrimaryKey, RowKey};
use crate::transaction::{Transaction, TransactionManager};
use crate::types::{Keyspace, SchemaId};

/// Three-valued result of evaluating a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    /// The predicate holds.
    True,
    /// The predicate does not hold.
    False,
    /// The predicate could not be decided (missing field, incomparable types).
    Unknown,
}

impl Truth {
    fn from_bool(b: bool) -> Self {
        if b {
            Self::True
        } else {
            Self::False
        }
    }

    /// Negation; unknown stays unknown.
    pub fn negate(self) -> Self {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Unknown => Self::Unknown,
        }
    }
}

/// Evaluates `predicate` against a decoded record.
pub fn evaluate(predicate: &Predicate, record: &Value) -> Truth {
    match predicate {
        Predicate::Compare(cmp) => compare(cmp, record),
        Predicate::Not(inner) => evaluate(inner, record).negate(),
        Predicate::And(children) => {
            let mut result = Truth::True;
            for child in children {
                match evaluate(child, record) {
                    Truth::False => return Truth::False,
                    Truth::Unknown => result = Truth::Unknown,
                    Truth::True => {}
                }
            }
            result
        }
        Predicate::Or(children) => {
            let mut result = Truth::False;
            for child in children {
                match evaluate(child, record) {
                    Truth::True => return Truth::True,
                    Truth::Unknown => result = Truth::Unknown,
                    Truth::False => {}
                }
            }
            result
        }
    }
}

fn compare(cmp: &Comparison, record: &Value) -> Truth {
    let Some(field) = record.get_path(cmp.field.segments()) else {
        return Truth::Unknown;
    };

    match (field, &cmp.operand) {
        (Value::Null, Operand::Null) => match cmp.op {
            ComparisonOp::Eq => Truth::True,
            ComparisonOp::Ne => Truth::False,
            _ => Truth::Unknown,
        },
        (Value::Null, _) | (_, Operand::Null) => match cmp.op {
            ComparisonOp::Eq => Truth::False,
            ComparisonOp::Ne => Truth::True,
            _ => Truth::Unknown,
        },
        _ => compare_present(field, cmp.op, &cmp.operand),
    }
}

fn compare_present(field: &Value, op: ComparisonOp, operand: &Operand) -> Truth {
    let ordered = |test: fn(Ordering) -> bool| {
        order_against(field, operand).map_or(Truth::Unknown, |o| Truth::from_bool(test(o)))
    };

    match op {
        ComparisonOp::Eq => ordered(Ordering::is_eq),
        ComparisonOp::Ne => ordered(Ordering::is_ne),
        ComparisonOp::Gt => ordered(Ordering::is_gt),
        ComparisonOp::Ge => ordered(Ordering::is_ge),
        ComparisonOp::Lt => ordered(Ordering::is_lt),
        ComparisonOp::Le => ordered(Ordering::is_le),
        ComparisonOp::Contains => match (field, operand) {
            (Value::Text(text), Operand::Text(needle)) => Truth::from_bool(text.contains(needle.as_str())),
            (Value::Array(items), _) => Truth::from_bool(
                items
                    .iter()
                    .any(|item| order_against(item, operand) == Some(Ordering::Equal)),
            ),
            _ => Truth::Unknown,
        },
        ComparisonOp::StartsWith => match (field, operand) {
            (Value::Text(text), Operand::Text(prefix)) => Truth::from_bool(text.starts_with(prefix.as_str())),
            _ => Truth::Unknown,
        },
        ComparisonOp::EndsWith => match (field, operand) {
            (Value::Text(text), Operand::Text(suffix)) => Truth::from_bool(text.ends_with(suffix.as_str())),
            _ => Truth::Unknown,
        },
        ComparisonOp::Matches => match (field, operand) {
            (Value::Text(text), Operand::Pattern(re)) => Truth::from_bool(re.is_match(text)),
            _ => Truth::Unknown,
        },
    }
}

/// Orders a record value against a literal; `None` when incomparable.
fn order_against(value: &Value, operand: &Operand) -> Option<Ordering> {
    match (value, operand) {
        (Value::Integer(a), Operand::Int(b)) => Some(a.cmp(b)),
        #[allow(clippy::cast_precision_loss)]
        (Value::Integer(a), Operand::Decimal(b)) => (*a as f64).partial_cmp(b),
        (Value::Text(a), Operand::Text(b)) => Some(a.as_str().cmp(b.as_str())),
        (Value::Bool(a), Operand::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Operand::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn sort_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Integer(_)) => 3,
        Some(Value::Text(_)) => 4,
        Some(Value::Bytes(_)) => 5,
        Some(Value::Array(_)) => 6,
        Some(Value::Map(_)) => 7,
    }
}

/// Total order used for sort keys: missing, null, then values grouped by
/// kind (bool, integer, text, bytes, array, map).
fn sort_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Integer(x)), Some(Value::Integer(y))) => x.cmp(y),
        (Some(Value::Text(x)), Some(Value::Text(y))) => x.cmp(y),
        (Some(Value::Bytes(x)), Some(Value::Bytes(y))) => x.cmp(y),
        (Some(Value::Array(x)), Some(Value::Array(y))) => x
            .iter()
            .zip(y)
            .map(|(l, r)| sort_cmp(Some(l), Some(r)))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Some(x @ Value::Map(_)), Some(y @ Value::Map(_))) => x.cmp_canonical(y),
        _ => sort_rank(a).cmp(&sort_rank(b)),
    }
}

fn apply_order(rows: &mut Vec<(PrimaryKey, Value)>, order: &OrderSpec) {
    if order.fields.is_empty() {
        if order.direction == SortDirection::Descending {
            rows.reverse();
        }
        return;
    }
    rows.sort_by(|(_, a), (_, b)| {
        order
            .fields
            .iter()
            .map(|field| {
                let o = sort_cmp(a.get_path(field.segments()), b.get_path(field.segments()));
                match order.direction {
                    SortDirection::Ascending => o,
                    SortDirection::Descending => o.reverse(),
                }
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

/// Scans one type's key group and applies a plan.
#[derive(Debug, Clone, Copy)]
pub struct QueryExecutor<'a> {
    manager: &'a TransactionManager,
}

impl<'a> QueryExecutor<'a> {
    /// Creates an executor reading through `manager`.
    pub fn new(manager: &'a TransactionManager) -> Self {
        Self { manager }
    }

    /// Runs `plan` over the records of `schema_id` visible to `txn`.
    ///
    /// Results are fully materialized, filtered, ordered, then skipped and
    /// limited.
    pub fn execute(
        &self,
        txn: &mut Transaction,
        schema_id: SchemaId,
        plan: &QueryPlan,
    ) -> CoreResult<Vec<(PrimaryKey, Value)>> {
        let rows = self
            .manager
            .scan(txn, Keyspace::Records, RowKey::group_bounds(schema_id))?;
        let scanned = rows.len();

        let mut matched = Vec::new();
        for (key, bytes) in rows {
            let record = from_cbor(&bytes)?;
            let keep = plan
                .predicate()
                .map_or(true, |p| evaluate(p, &record) == Truth::True);
            if keep {
                let (_, primary_key) = RowKey::decode(key.as_bytes())?;
                matched.push((primary_key, record));
            }
        }

        if let Some(order) = plan.order() {
            apply_order(&mut matched, order);
        }

        let results: Vec<_> = matched
            .into_iter()
            .skip(plan.skip())
            .take(plan.limit().unwrap_or(usize::MAX))
            .collect();
        trace!(
            txn = %txn.id(),
            type_name = plan.type_name(),
            scanned,
            returned = results.len(),
            "executed query"
        );
        Ok(results)
    }
}
