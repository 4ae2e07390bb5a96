//! Runtime value type for the execution layer (§4.11).
//!
//! Distinct from [`crate::storage::ColumnValue`]: that type is
//! the physical on-page codec (`Int32`, `Float32`, fixed-width), while
//! `Value` is what expressions and operators pass around at query time
//! (wider integer/float, used for both literals and column reads).

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use crate::storage::ColumnValue;

/// A single runtime value. `Null` compares unequal to everything,
/// including itself, under `PartialEq` — comparisons against NULL are
/// handled explicitly by [`Value::compare`], which returns `false` for
/// any NULL operand rather than a three-valued `Unknown` (`spec.md`
/// §4.11's deliberate non-standard departure from SQL's NULL
/// semantics).
#[derive(Debug, Clone)]
pub enum Value {
    Int64(i64),
    Float64(f64),
    String(String),
    Bool(bool),
    Null,
}

/// One row: column name to value. Qualified lookups (`t.c`) are
/// resolved by the expression evaluator, which tries the qualified key
/// first and falls back to the bare column name.
pub type Row = HashMap<String, Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int64(_) => "int",
            Value::Float64(_) => "float",
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::Null => "null",
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(i) => Some(*i as f64),
            Value::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Numeric arithmetic. NULL propagates: any NULL operand yields
    /// `Value::Null`. Division by zero yields `Value::Null` rather than
    /// erroring (`spec.md` §4.11).
    pub fn add(&self, other: &Value) -> Value {
        self.numeric_op(other, |a, b| a + b, |a, b| a.wrapping_add(b))
    }

    pub fn sub(&self, other: &Value) -> Value {
        self.numeric_op(other, |a, b| a - b, |a, b| a.wrapping_sub(b))
    }

    pub fn mul(&self, other: &Value) -> Value {
        self.numeric_op(other, |a, b| a * b, |a, b| a.wrapping_mul(b))
    }

    pub fn div(&self, other: &Value) -> Value {
        if self.is_null() || other.is_null() {
            return Value::Null;
        }
        match (self, other) {
            (Value::Int64(a), Value::Int64(b)) => {
                if *b == 0 {
                    Value::Null
                } else {
                    Value::Int64(a / b)
                }
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) if b != 0.0 => Value::Float64(a / b),
                _ => Value::Null,
            },
        }
    }

    fn numeric_op(
        &self,
        other: &Value,
        float_op: impl Fn(f64, f64) -> f64,
        int_op: impl Fn(i64, i64) -> i64,
    ) -> Value {
        if self.is_null() || other.is_null() {
            return Value::Null;
        }
        match (self, other) {
            (Value::Int64(a), Value::Int64(b)) => Value::Int64(int_op(*a, *b)),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => Value::Float64(float_op(a, b)),
                _ => Value::Null,
            },
        }
    }

    /// Ordering comparison used by `< <= > >=` and `ORDER BY`. Returns
    /// `None` when either side is NULL or the two values are not
    /// comparable (e.g. string vs number).
    pub fn partial_compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }

    /// Equality comparison used by `= <>` and `WHERE`/`JOIN` predicates.
    /// NULL never equals anything, not even another NULL (`spec.md`
    /// §4.11).
    pub fn values_equal(&self, other: &Value) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Truthiness for `WHERE`/`HAVING`/`AND`/`OR` evaluation. NULL and
    /// non-bool values are falsy.
    pub fn is_truthy(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    /// Sort key used by `ORDER BY`: NULLs sort last regardless of
    /// direction (`spec.md` §4.11), expressed here as `(is_null, ...)`
    /// so the caller's comparator only has to flip the non-null half
    /// for `DESC`.
    pub fn is_null_for_sort(&self) -> bool {
        self.is_null()
    }
}

impl From<&ColumnValue> for Value {
    fn from(cv: &ColumnValue) -> Self {
        match cv {
            ColumnValue::Int32(i) => Value::Int64(*i as i64),
            ColumnValue::Float32(f) => Value::Float64(*f as f64),
            ColumnValue::Bool(b) => Value::Bool(*b),
            ColumnValue::Date(d) => Value::Int64(*d as i64),
            ColumnValue::Varchar(s) => Value::String(s.clone()),
            ColumnValue::Null => Value::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int64(i) => write!(f, "{i}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "NULL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_propagates_through_arithmetic() {
        assert!(Value::Null.add(&Value::Int64(1)).is_null());
        assert!(Value::Int64(1).add(&Value::Null).is_null());
    }

    #[test]
    fn test_int_division_by_zero_is_null() {
        assert!(Value::Int64(10).div(&Value::Int64(0)).is_null());
    }

    #[test]
    fn test_float_division_by_zero_is_null() {
        assert!(Value::Float64(10.0).div(&Value::Float64(0.0)).is_null());
    }

    #[test]
    fn test_int_and_float_lift_to_float() {
        let result = Value::Int64(2).add(&Value::Float64(0.5));
        match result {
            Value::Float64(f) => assert!((f - 2.5).abs() < f64::EPSILON),
            other => panic!("expected Float64, got {other:?}"),
        }
    }

    #[test]
    fn test_null_never_equals_anything() {
        assert!(!Value::Null.values_equal(&Value::Null));
        assert!(!Value::Int64(1).values_equal(&Value::Null));
    }

    #[test]
    fn test_null_comparison_is_false_not_unknown() {
        assert!(Value::Null.partial_compare(&Value::Int64(1)).is_none());
    }

    #[test]
    fn test_int_equals_float_cross_type() {
        assert!(Value::Int64(2).values_equal(&Value::Float64(2.0)));
    }
}
