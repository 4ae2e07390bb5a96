//! Expression AST and evaluator (§4.11).
//!
//! Grounded in the original compiler's type checker: arithmetic lifts
//! `int op int -> int`, anything else involving a number goes to float;
//! comparisons and boolean logic always yield `Bool`; NULL comparisons
//! evaluate to `false` rather than three-valued `Unknown`.

use crate::common::{Error, Result};
use crate::execution::value::{Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// A recognized aggregate function name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggFunc {
    pub fn from_name(name: &str) -> Option<AggFunc> {
        match name.to_uppercase().as_str() {
            "COUNT" => Some(AggFunc::Count),
            "SUM" => Some(AggFunc::Sum),
            "AVG" => Some(AggFunc::Avg),
            "MIN" => Some(AggFunc::Min),
            "MAX" => Some(AggFunc::Max),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Count => "COUNT",
            AggFunc::Sum => "SUM",
            AggFunc::Avg => "AVG",
            AggFunc::Min => "MIN",
            AggFunc::Max => "MAX",
        }
    }
}

/// A column reference, optionally qualified by table name or alias.
#[derive(Debug, Clone)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub column: String,
}

impl ColumnRef {
    pub fn unqualified(column: impl Into<String>) -> Self {
        Self {
            table: None,
            column: column.into(),
        }
    }

    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            column: column.into(),
        }
    }

    /// The column's display name, as it would appear in a result-set
    /// header: `t.c` if qualified, else `c`.
    pub fn display_name(&self) -> String {
        match &self.table {
            Some(t) => format!("{t}.{}", self.column),
            None => self.column.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Column(ColumnRef),
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    /// An aggregate function call, e.g. `COUNT(*)` (arg = `None`) or
    /// `SUM(t.amount)`.
    Aggregate {
        func: AggFunc,
        arg: Option<Box<Expr>>,
    },
    /// `expr IN (e1, e2, ...)`.
    InList { expr: Box<Expr>, list: Vec<Expr> },
    /// `expr IN (SELECT ...)`; the subquery's resolved row values are
    /// supplied by the plan builder ahead of evaluation.
    InSubquery { expr: Box<Expr>, values: Vec<Value> },
    IsNull { expr: Box<Expr>, negated: bool },
}

impl Expr {
    pub fn column_name(&self) -> String {
        match self {
            Expr::Column(c) => c.display_name(),
            Expr::Aggregate { func, arg } => match arg {
                Some(a) => format!("{}({})", func.name(), a.column_name()),
                None => format!("{}(*)", func.name()),
            },
            Expr::Literal(v) => v.to_string(),
            Expr::BinaryOp { .. } | Expr::UnaryOp { .. } => "expr".to_string(),
            Expr::InList { expr, .. } | Expr::InSubquery { expr, .. } => expr.column_name(),
            Expr::IsNull { expr, .. } => expr.column_name(),
        }
    }

    /// Does this expression tree contain an aggregate call anywhere?
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::BinaryOp { left, right, .. } => left.contains_aggregate() || right.contains_aggregate(),
            Expr::UnaryOp { expr, .. }
            | Expr::IsNull { expr, .. }
            | Expr::InList { expr, .. }
            | Expr::InSubquery { expr, .. } => expr.contains_aggregate(),
            _ => false,
        }
    }

    /// Evaluate against a single row. Aggregates cannot be evaluated
    /// row-at-a-time; [`super::operator::Operator::GroupBy`] extracts
    /// and computes them separately before this is called on the
    /// post-aggregation row.
    pub fn evaluate(&self, row: &Row) -> Result<Value> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Column(c) => Ok(resolve_column(row, c)),
            Expr::BinaryOp { op, left, right } => {
                let l = left.evaluate(row)?;
                let r = right.evaluate(row)?;
                evaluate_binary(*op, &l, &r)
            }
            Expr::UnaryOp { op, expr } => {
                let v = expr.evaluate(row)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!v.is_truthy()),
                    UnaryOp::Neg => match v {
                        Value::Int64(i) => Value::Int64(-i),
                        Value::Float64(f) => Value::Float64(-f),
                        Value::Null => Value::Null,
                        other => {
                            return Err(Error::TypeMismatch(format!(
                                "cannot negate value of type {}",
                                other.type_name()
                            )))
                        }
                    },
                })
            }
            Expr::Aggregate { .. } => Err(Error::Unsupported(
                "aggregate expression evaluated outside of GROUP BY".to_string(),
            )),
            Expr::InList { expr, list } => {
                let v = expr.evaluate(row)?;
                let mut found = false;
                for item in list {
                    if v.values_equal(&item.evaluate(row)?) {
                        found = true;
                        break;
                    }
                }
                Ok(Value::Bool(found))
            }
            Expr::InSubquery { expr, values } => {
                let v = expr.evaluate(row)?;
                Ok(Value::Bool(values.iter().any(|candidate| v.values_equal(candidate))))
            }
            Expr::IsNull { expr, negated } => {
                let v = expr.evaluate(row)?;
                Ok(Value::Bool(v.is_null() != *negated))
            }
        }
    }
}

/// Resolve a column reference against a row keyed by display name
/// (`t.c` for joined rows, bare `c` otherwise). Tries the qualified key
/// first, then falls back to the bare column name so unqualified
/// references still work against single-table rows.
fn resolve_column(row: &Row, col: &ColumnRef) -> Value {
    if let Some(table) = &col.table {
        let qualified = format!("{table}.{}", col.column);
        if let Some(v) = row.get(&qualified) {
            return v.clone();
        }
    }
    row.get(&col.column).cloned().unwrap_or(Value::Null)
}

fn evaluate_binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value> {
    Ok(match op {
        BinaryOp::Add => l.add(r),
        BinaryOp::Sub => l.sub(r),
        BinaryOp::Mul => l.mul(r),
        BinaryOp::Div => l.div(r),
        BinaryOp::Eq => Value::Bool(l.values_equal(r)),
        BinaryOp::NotEq => Value::Bool(!l.is_null() && !r.is_null() && !l.values_equal(r)),
        BinaryOp::Lt => Value::Bool(matches!(l.partial_compare(r), Some(std::cmp::Ordering::Less))),
        BinaryOp::LtEq => Value::Bool(matches!(
            l.partial_compare(r),
            Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)
        )),
        BinaryOp::Gt => Value::Bool(matches!(l.partial_compare(r), Some(std::cmp::Ordering::Greater))),
        BinaryOp::GtEq => Value::Bool(matches!(
            l.partial_compare(r),
            Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)
        )),
        BinaryOp::And => Value::Bool(l.is_truthy() && r.is_truthy()),
        BinaryOp::Or => Value::Bool(l.is_truthy() || r.is_truthy()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_not_equal_is_false_when_either_side_null() {
        let r = row(&[("a", Value::Null)]);
        let expr = Expr::BinaryOp {
            op: BinaryOp::NotEq,
            left: Box::new(Expr::Column(ColumnRef::unqualified("a"))),
            right: Box::new(Expr::Literal(Value::Int64(1))),
        };
        assert!(matches!(expr.evaluate(&r).unwrap(), Value::Bool(false)));
    }

    #[test]
    fn test_equality_comparison_against_null_is_false() {
        let r = row(&[("a", Value::Null)]);
        let expr = Expr::BinaryOp {
            op: BinaryOp::Eq,
            left: Box::new(Expr::Column(ColumnRef::unqualified("a"))),
            right: Box::new(Expr::Literal(Value::Int64(1))),
        };
        assert!(matches!(expr.evaluate(&r).unwrap(), Value::Bool(false)));
    }

    #[test]
    fn test_qualified_column_resolution_falls_back_to_bare_name() {
        let r = row(&[("age", Value::Int64(30))]);
        let expr = Expr::Column(ColumnRef::qualified("users", "age"));
        assert!(matches!(expr.evaluate(&r).unwrap(), Value::Int64(30)));
    }

    #[test]
    fn test_in_list_matches_any_value() {
        let r = row(&[("status", Value::String("active".to_string()))]);
        let expr = Expr::InList {
            expr: Box::new(Expr::Column(ColumnRef::unqualified("status"))),
            list: vec![
                Expr::Literal(Value::String("pending".to_string())),
                Expr::Literal(Value::String("active".to_string())),
            ],
        };
        assert!(matches!(expr.evaluate(&r).unwrap(), Value::Bool(true)));
    }

    #[test]
    fn test_is_null_and_negated() {
        let r = row(&[("a", Value::Null)]);
        let expr = Expr::IsNull {
            expr: Box::new(Expr::Column(ColumnRef::unqualified("a"))),
            negated: false,
        };
        assert!(matches!(expr.evaluate(&r).unwrap(), Value::Bool(true)));

        let expr = Expr::IsNull {
            expr: Box::new(Expr::Column(ColumnRef::unqualified("a"))),
            negated: true,
        };
        assert!(matches!(expr.evaluate(&r).unwrap(), Value::Bool(false)));
    }

    #[test]
    fn test_contains_aggregate_detects_nested() {
        let expr = Expr::BinaryOp {
            op: BinaryOp::Add,
            left: Box::new(Expr::Aggregate {
                func: AggFunc::Count,
                arg: None,
            }),
            right: Box::new(Expr::Literal(Value::Int64(1))),
        };
        assert!(expr.contains_aggregate());
    }
}
