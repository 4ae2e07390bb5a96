//! Query execution: a typed statement AST, an expression evaluator, a
//! physical operator tree, and the plan builder that translates one
//! into the other (§4.11, §4.12).
//!
//! This crate does not parse SQL text; [`ast::Statement`] is the
//! external contract a front end (or a caller building statements
//! directly) hands to [`plan_builder::build_plan`].

pub mod ast;
pub mod expr;
pub mod operator;
pub mod plan_builder;
pub mod value;

pub use ast::Statement;
pub use expr::{AggFunc, BinaryOp, ColumnRef, Expr, UnaryOp};
pub use operator::{ExecutionContext, Operator, RowId, TableAccess};
pub use plan_builder::build_plan;
pub use value::{Row, Value};
