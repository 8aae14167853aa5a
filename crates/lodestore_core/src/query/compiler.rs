//! Turns a parsed query into a [`QueryPlan`].

use regex::Regex;
use tracing::debug;

use super::ast::{
    AndExpr, ComparisonExpr, Literal, Operator, OrExpr, OrderDirection, Primary, QueryAst,
    Spanned, UnaryExpr,
};
use super::parser::parse;
use super::plan::{
    Comparison, ComparisonOp, FieldPath, Operand, OrderSpec, Predicate, QueryPlan, SortDirection,
};
use crate::error::{CoreError, CoreResult, QuerySyntaxError};

/// Compiles query text into plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryCompiler;

impl QueryCompiler {
    /// Parses and compiles `text`.
    ///
    /// `requested` is the type the caller will decode results into. A query
    /// that names a different type is rejected; a query that names no type
    /// needs a requested one.
    pub fn compile(text: &str, requested: Option<&str>) -> CoreResult<QueryPlan> {
        let ast = parse(text)?;
        let type_name = Self::target_type(&ast, requested)?;
        let plan = Visitor {
            text,
            type_name: &type_name,
        }
        .visit_query(&ast)?;
        debug!(query = text, type_name = plan.type_name(), "compiled query");
        Ok(plan)
    }

    fn target_type(ast: &QueryAst, requested: Option<&str>) -> CoreResult<String> {
        match (ast.type_name.as_ref(), requested) {
            (Some(named), Some(requested)) if named.value != requested => {
                Err(CoreError::invalid_operation(format!(
                    "query targets '{}' but results were requested as '{requested}'",
                    named.value
                )))
            }
            (Some(named), _) => Ok(named.value.clone()),
            (None, Some(requested)) => Ok(requested.to_string()),
            (None, None) => Err(CoreError::invalid_operation(
                "query does not name a target type",
            )),
        }
    }
}

struct Visitor<'a> {
    text: &'a str,
    type_name: &'a str,
}

impl Visitor<'_> {
    fn syntax_error<T>(&self, message: &str, span: &Spanned<T>) -> QuerySyntaxError {
        let fragment = self.text.get(span.start..span.end).unwrap_or_default();
        QuerySyntaxError::new(message, fragment, span.start)
    }

    fn visit_query(&self, ast: &QueryAst) -> CoreResult<QueryPlan> {
        let predicate = ast.filter.as_ref().map(|f| self.visit_or(f)).transpose()?;
        let order = ast.order.as_ref().map(|clause| OrderSpec {
            direction: match clause.direction {
                OrderDirection::Ordered => SortDirection::Ascending,
                OrderDirection::Reversed => SortDirection::Descending,
            },
            fields: clause
                .fields
                .iter()
                .map(|segments| self.field(segments))
                .collect(),
        });
        let skip = match &ast.skip {
            Some(span) => self.count(span, "skip")?,
            None => 0,
        };
        let limit = ast
            .limit
            .as_ref()
            .map(|span| self.count(span, "limit"))
            .transpose()?;

        Ok(QueryPlan::new(self.type_name, predicate, order, skip, limit))
    }

    fn count(&self, span: &Spanned<i64>, clause: &str) -> Result<usize, QuerySyntaxError> {
        usize::try_from(span.value)
            .map_err(|_| self.syntax_error(&format!("{clause} must not be negative"), span))
    }

    fn field(&self, segments: &[String]) -> FieldPath {
        FieldPath::new(self.type_name, segments.to_vec())
    }

    fn visit_or(&self, expr: &OrExpr) -> CoreResult<Predicate> {
        let mut children = expr
            .terms
            .iter()
            .map(|term| self.visit_and(term))
            .collect::<CoreResult<Vec<_>>>()?;
        if children.len() == 1 {
            Ok(children.remove(0))
        } else {
            Ok(Predicate::Or(children))
        }
    }

    fn visit_and(&self, expr: &AndExpr) -> CoreResult<Predicate> {
        let mut children = expr
            .factors
            .iter()
            .map(|factor| self.visit_unary(factor))
            .collect::<CoreResult<Vec<_>>>()?;
        if children.len() == 1 {
            Ok(children.remove(0))
        } else {
            Ok(Predicate::And(children))
        }
    }

    fn visit_unary(&self, expr: &UnaryExpr) -> CoreResult<Predicate> {
        match &expr.primary {
            Primary::Comparison(cmp) => {
                let compiled = self.visit_comparison(cmp)?;
                if expr.negated {
                    Ok(Predicate::Not(Box::new(compiled)))
                } else {
                    Ok(compiled)
                }
            }
            // `not (...)` evaluates the group as written; the negation is dropped.
            Primary::Group(inner) => self.visit_or(inner),
        }
    }

    fn visit_comparison(&self, cmp: &ComparisonExpr) -> CoreResult<Predicate> {
        let op = match cmp.operator {
            Operator::Assign | Operator::Equals => ComparisonOp::Eq,
            Operator::BangEquals | Operator::Diamond => ComparisonOp::Ne,
            Operator::Greater => ComparisonOp::Gt,
            Operator::GreaterOrEqual => ComparisonOp::Ge,
            Operator::Less => ComparisonOp::Lt,
            Operator::LessOrEqual => ComparisonOp::Le,
            Operator::Contains => ComparisonOp::Contains,
            Operator::StartsWith => ComparisonOp::StartsWith,
            Operator::EndsWith => ComparisonOp::EndsWith,
            Operator::Matches => ComparisonOp::Matches,
        };

        let operand = match (op, &cmp.literal.value) {
            (ComparisonOp::Matches, Literal::Text(pattern)) => Regex::new(pattern)
                .map(Operand::Pattern)
                .map_err(|e| {
                    self.syntax_error(&format!("invalid regular expression: {e}"), &cmp.literal)
                })?,
            (ComparisonOp::Matches, _) => {
                return Err(self
                    .syntax_error("matches requires a string pattern", &cmp.literal)
                    .into())
            }
            (_, Literal::Int(n)) => Operand::Int(*n),
            (_, Literal::Decimal(d)) => Operand::Decimal(*d),
            (_, Literal::Bool(b)) => Operand::Bool(*b),
            (_, Literal::Null) => Operand::Null,
            (_, Literal::Text(s)) => Operand::Text(s.clone()),
        };

        Ok(Predicate::Compare(Comparison {
            field: self.field(&cmp.field),
            op,
            operand,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(text: &str) -> QueryPlan {
        QueryCompiler::compile(text, Some("Street")).unwrap()
    }

    fn leaf(field: &str, op: ComparisonOp, operand: Operand) -> Predicate {
        Predicate::Compare(Comparison {
            field: FieldPath::new(
                "Street",
                field.split('.').map(str::to_string).collect(),
            ),
            op,
            operand,
        })
    }

    #[test]
    fn empty_query_matches_everything() {
        let plan = compile("");
        assert_eq!(plan.type_name(), "Street");
        assert!(plan.predicate().is_none());
        assert!(plan.order().is_none());
        assert_eq!(plan.skip(), 0);
        assert_eq!(plan.limit(), None);
    }

    #[test]
    fn single_comparison_is_not_wrapped() {
        let plan = compile("filter streetNumber > 3");
        assert_eq!(
            plan.predicate(),
            Some(&leaf("streetNumber", ComparisonOp::Gt, Operand::Int(3)))
        );
    }

    #[test]
    fn spellings_fold_to_one_operator() {
        for text in ["filter a = 1", "filter a == 1"] {
            assert_eq!(
                compile(text).predicate(),
                Some(&leaf("a", ComparisonOp::Eq, Operand::Int(1)))
            );
        }
        for text in ["filter a != 1", "filter a <> 1"] {
            assert_eq!(
                compile(text).predicate(),
                Some(&leaf("a", ComparisonOp::Ne, Operand::Int(1)))
            );
        }
    }

    #[test]
    fn and_or_are_n_ary() {
        let plan = compile("filter a = 1 or b = 2 or c = 3 and d = 4");
        let Some(Predicate::Or(children)) = plan.predicate() else {
            panic!("expected or");
        };
        assert_eq!(children.len(), 3);
        assert!(matches!(&children[2], Predicate::And(inner) if inner.len() == 2));
    }

    #[test]
    fn not_negates_a_comparison() {
        let plan = compile("filter not a = 1");
        assert_eq!(
            plan.predicate(),
            Some(&Predicate::Not(Box::new(leaf("a", ComparisonOp::Eq, Operand::Int(1)))))
        );
    }

    #[test]
    fn not_before_group_is_dropped() {
        let negated = compile("filter not (a = 1 or b = 2)");
        let plain = compile("filter (a = 1 or b = 2)");
        assert_eq!(negated.predicate(), plain.predicate());
        assert!(matches!(negated.predicate(), Some(Predicate::Or(_))));
    }

    #[test]
    fn field_paths_carry_the_target_type() {
        let plan = compile("filter city.name contains 'holm'");
        let Some(Predicate::Compare(cmp)) = plan.predicate() else {
            panic!("expected comparison");
        };
        assert_eq!(cmp.field.type_name(), "Street");
        assert_eq!(cmp.field.segments(), ["city", "name"]);
        assert_eq!(cmp.field.to_string(), "city.name");
    }

    #[test]
    fn ordering() {
        let plan = compile("reversed streetName, streetNumber");
        let order = plan.order().unwrap();
        assert_eq!(order.direction, SortDirection::Descending);
        assert_eq!(order.fields.len(), 2);
        assert_eq!(order.fields[1].segments(), ["streetNumber"]);

        let natural_plan = compile("ordered");
        let natural = natural_plan.order().unwrap();
        assert_eq!(natural.direction, SortDirection::Ascending);
        assert!(natural.fields.is_empty());
    }

    #[test]
    fn skip_and_limit() {
        let plan = compile("skip 5 limit 0");
        assert_eq!(plan.skip(), 5);
        assert_eq!(plan.limit(), Some(0));
    }

    #[test]
    fn negative_limit_is_a_syntax_error() {
        let err = QueryCompiler::compile("limit -1", Some("Street")).unwrap_err();
        let CoreError::QuerySyntax(err) = err else {
            panic!("expected syntax error, got {err:?}");
        };
        assert_eq!(err.fragment, "-1");
        assert_eq!(err.position, 6);
    }

    #[test]
    fn matches_compiles_regex() {
        let plan = compile("filter streetName matches '^Ki.*gatan$'");
        let Some(Predicate::Compare(cmp)) = plan.predicate() else {
            panic!("expected comparison");
        };
        let Operand::Pattern(re) = &cmp.operand else {
            panic!("expected pattern");
        };
        assert!(re.is_match("Kingsgatan"));
    }

    #[test]
    fn invalid_regex_is_a_syntax_error() {
        let err = QueryCompiler::compile("filter a matches '('", Some("Street")).unwrap_err();
        let CoreError::QuerySyntax(err) = err else {
            panic!("expected syntax error");
        };
        assert_eq!(err.fragment, "'('");
    }

    #[test]
    fn matches_requires_text() {
        let err = QueryCompiler::compile("filter a matches 3", Some("Street")).unwrap_err();
        assert!(matches!(err, CoreError::QuerySyntax(_)));
    }

    #[test]
    fn named_type_must_match_request() {
        let err = QueryCompiler::compile("'City'", Some("Street")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));

        let plan = QueryCompiler::compile("limit 1 'City'", None).unwrap();
        assert_eq!(plan.type_name(), "City");

        let same = QueryCompiler::compile("'Street'", Some("Street")).unwrap();
        assert_eq!(same.type_name(), "Street");
    }

    #[test]
    fn untyped_dynamic_query_is_rejected() {
        let err = QueryCompiler::compile("filter a = 1", None).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn parse_errors_surface_as_query_syntax() {
        let err = QueryCompiler::compile("filter a ~ 1", Some("Street")).unwrap_err();
        assert!(matches!(err, CoreError::QuerySyntax(_)));
    }
}
