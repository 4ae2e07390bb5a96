//! Physical execution operators (§4.11, §9).
//!
//! `Operator` is a tagged union rather than a trait object hierarchy:
//! the operator tree is built once by the plan builder and walked
//! exactly once by `execute`, so there is no benefit to dynamic
//! dispatch and a flat enum keeps every variant's state next to its
//! behavior. Execution is eager: every operator materializes its full
//! output `Vec<Row>` rather than pulling rows lazily.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::catalog::Catalog;
use crate::common::{Error, Result};
use crate::execution::ast::{JoinKind, SortDirection};
use crate::execution::expr::{AggFunc, Expr};
use crate::execution::value::{Row, Value};

/// Storage-layer row identity: the page a record lives in plus its
/// slot index within that page.
pub type RowId = (u32, u16);

/// The storage-facing half of execution: how operators read and
/// mutate table data. Implemented by [`crate::storage_manager::StorageManager`];
/// kept as a trait so operator.rs and plan_builder.rs do not depend on
/// buffer pool / WAL internals directly.
pub trait TableAccess {
    fn scan_table(&self, table: &str) -> Result<Vec<(RowId, Row)>>;
    fn insert_row(&self, table: &str, row: &Row) -> Result<RowId>;
    fn update_row(&self, table: &str, row_id: RowId, row: &Row) -> Result<()>;
    fn delete_row(&self, table: &str, row_id: RowId) -> Result<()>;
    fn create_table(&self, table: &str, tablespace: &str) -> Result<()>;
    fn drop_table(&self, table: &str) -> Result<()>;
}

/// Everything an operator needs to execute: catalog lookups plus
/// storage access.
pub struct ExecutionContext<'a> {
    pub catalog: &'a Catalog,
    pub access: &'a dyn TableAccess,
}

/// One grouping key: the evaluated `GROUP BY` expression values for a
/// row, compared by their display form since `Value` has no `Eq`/`Hash`
/// (`f64` isn't hashable without a lossy key).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey(Vec<String>);

impl GroupKey {
    fn from_row(row: &Row, exprs: &[Expr]) -> Result<Self> {
        let mut parts = Vec::with_capacity(exprs.len());
        for e in exprs {
            parts.push(e.evaluate(row)?.to_string());
        }
        Ok(GroupKey(parts))
    }
}

/// A selected projection column: the expression to evaluate and the
/// name to bind it to in the output row.
#[derive(Debug, Clone)]
pub struct ProjectItem {
    pub expr: Expr,
    pub alias: String,
}

#[derive(Debug, Clone)]
pub struct JoinCondition {
    pub kind: JoinKind,
    pub left_alias: String,
    pub right_alias: String,
    pub on: Expr,
}

#[derive(Debug, Clone)]
pub struct OrderKey {
    pub expr: Expr,
    pub direction: SortDirection,
}

/// The physical operator tree. Each variant owns its children and any
/// state the plan builder resolved ahead of execution (target table,
/// projection list, join condition, ...).
pub enum Operator {
    CreateTable {
        table: String,
        tablespace: String,
    },
    DropTable {
        table: String,
    },
    CreateIndex {
        index_name: String,
        table: String,
        columns: Vec<String>,
        unique: bool,
    },
    DropIndex {
        index_name: String,
    },
    Insert {
        table: String,
        rows: Vec<Row>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Expr)>,
        filter: Option<Expr>,
    },
    Delete {
        table: String,
        filter: Option<Expr>,
    },
    /// Full scan of a table, binding rows under both the bare column
    /// name and `alias.column` so downstream operators can resolve
    /// either qualified or unqualified references.
    SeqScan {
        table: String,
        alias: String,
    },
    /// `SeqScan` fused with a column projection pushed down to the scan
    /// itself, so only the listed columns are bound on each row.
    OptimizedSeqScan {
        table: String,
        alias: String,
        columns: Vec<String>,
    },
    /// `SeqScan` fused with a predicate pushed down to the scan itself.
    FilteredSeqScan {
        table: String,
        alias: String,
        predicate: Expr,
    },
    /// Equality lookup via a named catalog index. There is no physical
    /// index structure backing this (index storage is out of scope);
    /// the lookup is satisfied by scanning the table and filtering on
    /// the index's leading column, so this differs from
    /// `FilteredSeqScan` only in how the plan builder chose to express
    /// the predicate, not in execution cost.
    IndexScan {
        table: String,
        alias: String,
        index_name: String,
        key: Expr,
    },
    Filter {
        input: Box<Operator>,
        predicate: Expr,
    },
    Project {
        input: Box<Operator>,
        items: Vec<ProjectItem>,
    },
    GroupBy {
        input: Box<Operator>,
        group_exprs: Vec<Expr>,
        aggregates: Vec<(AggFunc, Option<Expr>, String)>,
        having: Option<Expr>,
    },
    OrderBy {
        input: Box<Operator>,
        keys: Vec<OrderKey>,
    },
    Join {
        left: Box<Operator>,
        right: Box<Operator>,
        condition: JoinCondition,
    },
    Limit {
        input: Box<Operator>,
        limit: u64,
    },
}

impl Operator {
    /// Run this operator (and its children) to completion, returning
    /// every output row.
    pub fn execute(&self, ctx: &ExecutionContext) -> Result<Vec<Row>> {
        match self {
            Operator::CreateTable { table, tablespace } => {
                ctx.access.create_table(table, tablespace)?;
                Ok(vec![affected_rows_row(0)])
            }
            Operator::DropTable { table } => {
                ctx.access.drop_table(table)?;
                Ok(vec![affected_rows_row(0)])
            }
            Operator::CreateIndex { .. } | Operator::DropIndex { .. } => {
                // Catalog mutation already happened in the plan builder
                // (index definitions are metadata-only; there is no
                // physical index structure to populate here).
                Ok(vec![affected_rows_row(0)])
            }
            Operator::Insert { table, rows } => {
                for row in rows {
                    ctx.access.insert_row(table, row)?;
                }
                Ok(vec![affected_rows_row(rows.len())])
            }
            Operator::Update {
                table,
                assignments,
                filter,
            } => {
                let mut affected = 0usize;
                for (row_id, row) in ctx.access.scan_table(table)? {
                    if !matches_filter(&row, filter)? {
                        continue;
                    }
                    let mut updated = row.clone();
                    for (col, expr) in assignments {
                        updated.insert(col.clone(), expr.evaluate(&row)?);
                    }
                    ctx.access.update_row(table, row_id, &updated)?;
                    affected += 1;
                }
                Ok(vec![affected_rows_row(affected)])
            }
            Operator::Delete { table, filter } => {
                let mut affected = 0usize;
                for (row_id, row) in ctx.access.scan_table(table)? {
                    if !matches_filter(&row, filter)? {
                        continue;
                    }
                    ctx.access.delete_row(table, row_id)?;
                    affected += 1;
                }
                Ok(vec![affected_rows_row(affected)])
            }
            Operator::SeqScan { table, alias } => {
                let rows = ctx.access.scan_table(table)?;
                Ok(rows
                    .into_iter()
                    .map(|(_, row)| qualify_row(row, alias))
                    .collect())
            }
            Operator::OptimizedSeqScan { table, alias, columns } => {
                let rows = ctx.access.scan_table(table)?;
                Ok(rows
                    .into_iter()
                    .map(|(_, row)| select_columns(qualify_row(row, alias), columns, alias))
                    .collect())
            }
            Operator::FilteredSeqScan { table, alias, predicate } => {
                let rows = ctx.access.scan_table(table)?;
                rows.into_iter()
                    .map(|(_, row)| qualify_row(row, alias))
                    .filter_map(|row| match predicate.evaluate(&row) {
                        Ok(v) if v.is_truthy() => Some(Ok(row)),
                        Ok(_) => None,
                        Err(e) => Some(Err(e)),
                    })
                    .collect()
            }
            Operator::IndexScan {
                table,
                alias,
                index_name,
                key,
            } => {
                let index = ctx.catalog.get_index(index_name)?;
                let key_value = key.evaluate(&Row::new())?;
                let lookup_column = index.columns.first().cloned().unwrap_or_default();
                let rows = ctx.access.scan_table(table)?;
                Ok(rows
                    .into_iter()
                    .map(|(_, row)| qualify_row(row, alias))
                    .filter(|row| {
                        row.get(&lookup_column)
                            .is_some_and(|v| v.values_equal(&key_value))
                    })
                    .collect())
            }
            Operator::Filter { input, predicate } => {
                let rows = input.execute(ctx)?;
                rows.into_iter()
                    .filter_map(|row| match predicate.evaluate(&row) {
                        Ok(v) if v.is_truthy() => Some(Ok(row)),
                        Ok(_) => None,
                        Err(e) => Some(Err(e)),
                    })
                    .collect()
            }
            Operator::Project { input, items } => {
                let rows = input.execute(ctx)?;
                rows.into_iter()
                    .map(|row| project_row(&row, items))
                    .collect()
            }
            Operator::GroupBy {
                input,
                group_exprs,
                aggregates,
                having,
            } => {
                let rows = input.execute(ctx)?;
                execute_group_by(rows, group_exprs, aggregates, having.as_ref())
            }
            Operator::OrderBy { input, keys } => {
                let mut rows = input.execute(ctx)?;
                sort_rows(&mut rows, keys)?;
                Ok(rows)
            }
            Operator::Join {
                left,
                right,
                condition,
            } => {
                let left_rows = left.execute(ctx)?;
                let right_rows = right.execute(ctx)?;
                execute_join(left_rows, right_rows, condition)
            }
            Operator::Limit { input, limit } => {
                let mut rows = input.execute(ctx)?;
                rows.truncate(*limit as usize);
                Ok(rows)
            }
        }
    }

    /// Output column names, in order, for operators where that's
    /// statically knowable without executing (used by `Project`'s `*`
    /// expansion and result-set headers).
    pub fn columns(&self) -> Vec<String> {
        match self {
            Operator::Project { items, .. } => items.iter().map(|i| i.alias.clone()).collect(),
            Operator::GroupBy {
                group_exprs,
                aggregates,
                ..
            } => {
                let mut cols: Vec<String> = group_exprs.iter().map(|e| e.column_name()).collect();
                cols.extend(aggregates.iter().map(|(_, _, name)| name.clone()));
                cols
            }
            Operator::Filter { input, .. } | Operator::OrderBy { input, .. } | Operator::Limit { input, .. } => {
                input.columns()
            }
            Operator::SeqScan { .. }
            | Operator::OptimizedSeqScan { .. }
            | Operator::FilteredSeqScan { .. }
            | Operator::IndexScan { .. }
            | Operator::Join { .. }
            | Operator::Insert { .. } => Vec::new(),
            _ => vec!["rows_affected".to_string()],
        }
    }

    pub fn children(&self) -> Vec<&Operator> {
        match self {
            Operator::Filter { input, .. }
            | Operator::Project { input, .. }
            | Operator::GroupBy { input, .. }
            | Operator::OrderBy { input, .. }
            | Operator::Limit { input, .. } => vec![input.as_ref()],
            Operator::Join { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            _ => Vec::new(),
        }
    }
}

fn affected_rows_row(n: usize) -> Row {
    let mut row = Row::new();
    row.insert("rows_affected".to_string(), Value::Int64(n as i64));
    row
}

fn matches_filter(row: &Row, filter: &Option<Expr>) -> Result<bool> {
    match filter {
        Some(expr) => Ok(expr.evaluate(row)?.is_truthy()),
        None => Ok(true),
    }
}

/// Bind every column in `row` under both its bare name and
/// `alias.column`, so expressions can reference it either way.
fn qualify_row(row: Row, alias: &str) -> Row {
    let mut qualified = Row::with_capacity(row.len() * 2);
    for (col, val) in row {
        qualified.insert(format!("{alias}.{col}"), val.clone());
        qualified.insert(col, val);
    }
    qualified
}

/// Keep only `columns` (plus their `alias.column` forms) from an
/// already-qualified row; missing columns project as NULL, matching
/// `project_row`'s loose-dialect behavior.
fn select_columns(row: Row, columns: &[String], alias: &str) -> Row {
    let mut out = Row::with_capacity(columns.len() * 2);
    for col in columns {
        let value = row.get(col).cloned().unwrap_or(Value::Null);
        out.insert(format!("{alias}.{col}"), value.clone());
        out.insert(col.clone(), value);
    }
    out
}

fn project_row(row: &Row, items: &[ProjectItem]) -> Result<Row> {
    let mut out = Row::with_capacity(items.len());
    for item in items {
        let value = match &item.expr {
            Expr::Column(c) if !row.contains_key(&c.display_name()) && !row.contains_key(&c.column) => {
                // Unknown column projects as NULL rather than erroring,
                // so `SELECT missing_col FROM t` still returns a row
                // shape (matches a best-effort/loose dialect).
                Value::Null
            }
            _ => item.expr.evaluate(row)?,
        };
        out.insert(item.alias.clone(), value);
    }
    Ok(out)
}

fn execute_group_by(
    rows: Vec<Row>,
    group_exprs: &[Expr],
    aggregates: &[(AggFunc, Option<Expr>, String)],
    having: Option<&Expr>,
) -> Result<Vec<Row>> {
    // No GROUP BY keys but an aggregate present: the whole input is one
    // implicit group (e.g. `SELECT COUNT(*) FROM t`).
    let mut groups: Vec<(GroupKey, Row, Vec<Row>)> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for row in rows {
        let key = GroupKey::from_row(&row, group_exprs)?;
        match index.get(&key) {
            Some(&i) => groups[i].2.push(row),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, row.clone(), vec![row]));
            }
        }
    }

    if groups.is_empty() && group_exprs.is_empty() {
        groups.push((GroupKey(Vec::new()), Row::new(), Vec::new()));
    }

    let mut output = Vec::with_capacity(groups.len());
    for (_, sample_row, members) in &groups {
        let mut out_row = Row::new();
        for expr in group_exprs {
            out_row.insert(expr.column_name(), expr.evaluate(sample_row).unwrap_or(Value::Null));
        }
        for (func, arg, name) in aggregates {
            out_row.insert(name.clone(), compute_aggregate(*func, arg.as_ref(), members)?);
        }

        if let Some(h) = having {
            if !h.evaluate(&out_row)?.is_truthy() {
                continue;
            }
        }
        output.push(out_row);
    }
    Ok(output)
}

fn compute_aggregate(func: AggFunc, arg: Option<&Expr>, members: &[Row]) -> Result<Value> {
    if func == AggFunc::Count && arg.is_none() {
        return Ok(Value::Int64(members.len() as i64));
    }
    let arg = arg.ok_or_else(|| Error::Unsupported(format!("{:?} requires an argument", func)))?;

    let values: Vec<Value> = members
        .iter()
        .map(|r| arg.evaluate(r))
        .collect::<Result<Vec<_>>>()?;
    let non_null: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();

    Ok(match func {
        AggFunc::Count => Value::Int64(non_null.len() as i64),
        AggFunc::Sum => non_null
            .iter()
            .fold(Value::Int64(0), |acc, v| acc.add(v)),
        AggFunc::Avg => {
            if non_null.is_empty() {
                Value::Null
            } else {
                let sum = non_null.iter().fold(Value::Int64(0), |acc, v| acc.add(v));
                sum.div(&Value::Int64(non_null.len() as i64))
            }
        }
        AggFunc::Min => non_null
            .into_iter()
            .min_by(|a, b| a.partial_compare(b).unwrap_or(Ordering::Equal))
            .cloned()
            .unwrap_or(Value::Null),
        AggFunc::Max => non_null
            .into_iter()
            .max_by(|a, b| a.partial_compare(b).unwrap_or(Ordering::Equal))
            .cloned()
            .unwrap_or(Value::Null),
    })
}

fn sort_rows(rows: &mut [Row], keys: &[OrderKey]) -> Result<()> {
    // Evaluate every key once per row up front; sort_by would otherwise
    // re-evaluate on every comparison.
    let mut decorated: Vec<(Vec<Value>, Row)> = rows
        .iter()
        .map(|row| -> Result<(Vec<Value>, Row)> {
            let keys = keys
                .iter()
                .map(|k| k.expr.evaluate(row))
                .collect::<Result<Vec<_>>>()?;
            Ok((keys, row.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    decorated.sort_by(|a, b| {
        for (i, key) in keys.iter().enumerate() {
            let (va, vb) = (&a.0[i], &b.0[i]);
            // NULLs sort last regardless of direction.
            let ordering = match (va.is_null_for_sort(), vb.is_null_for_sort()) {
                (true, true) => Ordering::Equal,
                (true, false) => return Ordering::Greater,
                (false, true) => return Ordering::Less,
                (false, false) => {
                    let cmp = va.partial_compare(vb).unwrap_or(Ordering::Equal);
                    if key.direction == SortDirection::Desc {
                        cmp.reverse()
                    } else {
                        cmp
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });

    for (slot, (_, row)) in rows.iter_mut().zip(decorated.into_iter()) {
        *slot = row;
    }
    Ok(())
}

/// Every bare (unqualified) column name present in `row`; rows arriving
/// at a join may already carry `alias.column` keys too (from a scan's
/// `qualify_row`), which this ignores.
fn bare_keys(row: &Row) -> std::collections::HashSet<&str> {
    row.keys().filter(|k| !k.contains('.')).map(|k| k.as_str()).collect()
}

/// Merge one left row and one right row into a joined output row,
/// prefixing every column with its source alias (`spec.md`:195) so a
/// name shared by both sides never silently clobbers the other.
///
/// A bare key is re-qualified as `alias.column` even if the row didn't
/// already carry that form (e.g. a join whose input is a `Project`/
/// `GroupBy` result rather than a bare scan) using `left_alias`/
/// `right_alias` — so this depends on neither side having pre-qualified
/// its own output. The bare form is kept too, but only when that name
/// is unambiguous between the two sides; a name present on both is only
/// reachable via its qualified form in the result.
fn combine_join_rows(l: &Row, r: &Row, left_alias: &str, right_alias: &str) -> Row {
    let l_bare = bare_keys(l);
    let r_bare = bare_keys(r);

    let mut combined = Row::with_capacity(l.len() + r.len());
    for (k, v) in l {
        if k.contains('.') {
            combined.insert(k.clone(), v.clone());
        } else {
            combined.insert(format!("{left_alias}.{k}"), v.clone());
            if !r_bare.contains(k.as_str()) {
                combined.insert(k.clone(), v.clone());
            }
        }
    }
    for (k, v) in r {
        if k.contains('.') {
            combined.insert(k.clone(), v.clone());
        } else {
            combined.insert(format!("{right_alias}.{k}"), v.clone());
            if !l_bare.contains(k.as_str()) {
                combined.insert(k.clone(), v.clone());
            }
        }
    }
    combined
}

/// The bare column names a set of rows exposes (from the first row, all
/// rows share a shape), used to build an all-`NULL` stand-in row for
/// the unmatched side of an outer join.
fn bare_columns_of(rows: &[Row]) -> Vec<String> {
    rows.first().map(|r| bare_keys(r).into_iter().map(str::to_string).collect()).unwrap_or_default()
}

fn null_row(columns: &[String]) -> Row {
    columns.iter().map(|c| (c.clone(), Value::Null)).collect()
}

fn execute_join(left_rows: Vec<Row>, right_rows: Vec<Row>, condition: &JoinCondition) -> Result<Vec<Row>> {
    let left_alias = &condition.left_alias;
    let right_alias = &condition.right_alias;
    let left_columns = bare_columns_of(&left_rows);
    let right_columns = bare_columns_of(&right_rows);
    let empty_right = null_row(&right_columns);
    let empty_left = null_row(&left_columns);

    let mut output = Vec::new();
    for l in &left_rows {
        let mut matched = false;
        for r in &right_rows {
            let combined = combine_join_rows(l, r, left_alias, right_alias);
            if condition.on.evaluate(&combined)?.is_truthy() {
                matched = true;
                output.push(combined);
            }
        }
        if !matched && matches!(condition.kind, JoinKind::Left) {
            output.push(combine_join_rows(l, &empty_right, left_alias, right_alias));
        }
    }

    if matches!(condition.kind, JoinKind::Right) {
        for r in &right_rows {
            let has_match = left_rows.iter().any(|l| {
                let combined = combine_join_rows(l, r, left_alias, right_alias);
                condition.on.evaluate(&combined).map(|v| v.is_truthy()).unwrap_or(false)
            });
            if !has_match {
                output.push(combine_join_rows(&empty_left, r, left_alias, right_alias));
            }
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::expr::{BinaryOp, ColumnRef};
    use std::cell::RefCell;

    struct FakeAccess {
        tables: RefCell<HashMap<String, Vec<(RowId, Row)>>>,
        next_id: RefCell<u16>,
    }

    impl FakeAccess {
        fn new() -> Self {
            Self {
                tables: RefCell::new(HashMap::new()),
                next_id: RefCell::new(0),
            }
        }

        fn seed(&self, table: &str, rows: Vec<Row>) {
            let mut id = self.next_id.borrow_mut();
            let entries = rows
                .into_iter()
                .map(|r| {
                    *id += 1;
                    ((0u32, *id), r)
                })
                .collect();
            self.tables.borrow_mut().insert(table.to_string(), entries);
        }
    }

    impl TableAccess for FakeAccess {
        fn scan_table(&self, table: &str) -> Result<Vec<(RowId, Row)>> {
            Ok(self.tables.borrow().get(table).cloned().unwrap_or_default())
        }
        fn insert_row(&self, table: &str, row: &Row) -> Result<RowId> {
            let mut id = self.next_id.borrow_mut();
            *id += 1;
            self.tables
                .borrow_mut()
                .entry(table.to_string())
                .or_default()
                .push(((0, *id), row.clone()));
            Ok((0, *id))
        }
        fn update_row(&self, table: &str, row_id: RowId, row: &Row) -> Result<()> {
            if let Some(rows) = self.tables.borrow_mut().get_mut(table) {
                if let Some(entry) = rows.iter_mut().find(|(id, _)| *id == row_id) {
                    entry.1 = row.clone();
                }
            }
            Ok(())
        }
        fn delete_row(&self, table: &str, row_id: RowId) -> Result<()> {
            if let Some(rows) = self.tables.borrow_mut().get_mut(table) {
                rows.retain(|(id, _)| *id != row_id);
            }
            Ok(())
        }
        fn create_table(&self, table: &str, _tablespace: &str) -> Result<()> {
            self.tables.borrow_mut().entry(table.to_string()).or_default();
            Ok(())
        }
        fn drop_table(&self, table: &str) -> Result<()> {
            self.tables.borrow_mut().remove(table);
            Ok(())
        }
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_seq_scan_qualifies_columns() {
        let access = FakeAccess::new();
        access.seed("users", vec![row(&[("id", Value::Int64(1))])]);
        let catalog_dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(catalog_dir.path()).unwrap();
        let ctx = ExecutionContext { catalog: &catalog, access: &access };

        let op = Operator::SeqScan { table: "users".to_string(), alias: "u".to_string() };
        let rows = op.execute(&ctx).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].contains_key("id"));
        assert!(rows[0].contains_key("u.id"));
    }

    #[test]
    fn test_filter_respects_null_false_semantics() {
        let access = FakeAccess::new();
        access.seed(
            "t",
            vec![row(&[("a", Value::Null)]), row(&[("a", Value::Int64(5))])],
        );
        let catalog_dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(catalog_dir.path()).unwrap();
        let ctx = ExecutionContext { catalog: &catalog, access: &access };

        let scan = Operator::SeqScan { table: "t".to_string(), alias: "t".to_string() };
        let filter = Operator::Filter {
            input: Box::new(scan),
            predicate: Expr::BinaryOp {
                op: BinaryOp::Gt,
                left: Box::new(Expr::Column(ColumnRef::unqualified("a"))),
                right: Box::new(Expr::Literal(Value::Int64(0))),
            },
        };
        let rows = filter.execute(&ctx).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_group_by_count_star() {
        let access = FakeAccess::new();
        access.seed(
            "t",
            vec![
                row(&[("dept", Value::String("eng".into()))]),
                row(&[("dept", Value::String("eng".into()))]),
                row(&[("dept", Value::String("sales".into()))]),
            ],
        );
        let catalog_dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(catalog_dir.path()).unwrap();
        let ctx = ExecutionContext { catalog: &catalog, access: &access };

        let scan = Operator::SeqScan { table: "t".to_string(), alias: "t".to_string() };
        let group = Operator::GroupBy {
            input: Box::new(scan),
            group_exprs: vec![Expr::Column(ColumnRef::unqualified("dept"))],
            aggregates: vec![(AggFunc::Count, None, "COUNT(*)".to_string())],
            having: None,
        };
        let mut rows = group.execute(&ctx).unwrap();
        rows.sort_by(|a, b| a["dept"].to_string().cmp(&b["dept"].to_string()));
        assert_eq!(rows.len(), 2);
        assert!(matches!(rows[0]["COUNT(*)"], Value::Int64(2)));
        assert!(matches!(rows[1]["COUNT(*)"], Value::Int64(1)));
    }

    #[test]
    fn test_order_by_nulls_last_both_directions() {
        let access = FakeAccess::new();
        access.seed(
            "t",
            vec![
                row(&[("a", Value::Int64(2))]),
                row(&[("a", Value::Null)]),
                row(&[("a", Value::Int64(1))]),
            ],
        );
        let catalog_dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(catalog_dir.path()).unwrap();
        let ctx = ExecutionContext { catalog: &catalog, access: &access };

        let scan = Operator::SeqScan { table: "t".to_string(), alias: "t".to_string() };
        let order = Operator::OrderBy {
            input: Box::new(scan),
            keys: vec![OrderKey {
                expr: Expr::Column(ColumnRef::unqualified("a")),
                direction: SortDirection::Desc,
            }],
        };
        let rows = order.execute(&ctx).unwrap();
        assert!(matches!(rows[0]["a"], Value::Int64(2)));
        assert!(matches!(rows[1]["a"], Value::Int64(1)));
        assert!(rows[2]["a"].is_null());
    }

    fn orders_and_customers_ctx(access: &FakeAccess) {
        access.seed(
            "orders",
            vec![
                row(&[("id", Value::Int64(1)), ("customer_id", Value::Int64(1))]),
                row(&[("id", Value::Int64(2)), ("customer_id", Value::Int64(99))]),
            ],
        );
        access.seed("customers", vec![row(&[("id", Value::Int64(1)), ("name", Value::String("Alice".into()))])]);
    }

    fn orders_join_customers(kind: JoinKind) -> Operator {
        Operator::Join {
            left: Box::new(Operator::SeqScan { table: "orders".to_string(), alias: "o".to_string() }),
            right: Box::new(Operator::SeqScan { table: "customers".to_string(), alias: "c".to_string() }),
            condition: JoinCondition {
                kind,
                left_alias: "o".to_string(),
                right_alias: "c".to_string(),
                on: Expr::BinaryOp {
                    op: BinaryOp::Eq,
                    left: Box::new(Expr::Column(ColumnRef::qualified("o", "customer_id"))),
                    right: Box::new(Expr::Column(ColumnRef::qualified("c", "id"))),
                },
            },
        }
    }

    #[test]
    fn test_inner_join_matches_only() {
        let access = FakeAccess::new();
        orders_and_customers_ctx(&access);
        let catalog_dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(catalog_dir.path()).unwrap();
        let ctx = ExecutionContext { catalog: &catalog, access: &access };

        let rows = orders_join_customers(JoinKind::Inner).execute(&ctx).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(matches!(rows[0]["o.id"], Value::Int64(1)));
        assert!(matches!(rows[0]["c.name"], Value::String(ref s) if s == "Alice"));
    }

    #[test]
    fn test_left_join_fills_null_for_unmatched_left_rows() {
        let access = FakeAccess::new();
        orders_and_customers_ctx(&access);
        let catalog_dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(catalog_dir.path()).unwrap();
        let ctx = ExecutionContext { catalog: &catalog, access: &access };

        let mut rows = orders_join_customers(JoinKind::Left).execute(&ctx).unwrap();
        rows.sort_by_key(|r| match r["o.id"] {
            Value::Int64(n) => n,
            _ => 0,
        });

        assert_eq!(rows.len(), 2);
        assert!(matches!(rows[0]["o.id"], Value::Int64(1)));
        assert!(matches!(rows[0]["c.name"], Value::String(ref s) if s == "Alice"));
        assert!(matches!(rows[1]["o.id"], Value::Int64(2)));
        assert!(rows[1]["c.name"].is_null());
    }

    #[test]
    fn test_right_join_fills_null_for_unmatched_right_rows() {
        let access = FakeAccess::new();
        access.seed("orders", vec![row(&[("id", Value::Int64(1)), ("customer_id", Value::Int64(1))])]);
        access.seed(
            "customers",
            vec![
                row(&[("id", Value::Int64(1)), ("name", Value::String("Alice".into()))]),
                row(&[("id", Value::Int64(2)), ("name", Value::String("Bob".into()))]),
            ],
        );
        let catalog_dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(catalog_dir.path()).unwrap();
        let ctx = ExecutionContext { catalog: &catalog, access: &access };

        let mut rows = orders_join_customers(JoinKind::Right).execute(&ctx).unwrap();
        rows.sort_by_key(|r| match r["c.id"] {
            Value::Int64(n) => n,
            _ => 0,
        });

        assert_eq!(rows.len(), 2);
        assert!(matches!(rows[0]["c.name"], Value::String(ref s) if s == "Alice"));
        assert!(matches!(rows[0]["o.id"], Value::Int64(1)));
        assert!(matches!(rows[1]["c.name"], Value::String(ref s) if s == "Bob"));
        assert!(rows[1]["o.id"].is_null());
    }

    /// `spec.md`:195 — a column name shared by both sides (here, both
    /// tables have an `id` column) must stay reachable via its
    /// qualified form on each side rather than one clobbering the
    /// other under the bare key.
    #[test]
    fn test_join_qualifies_colliding_column_names() {
        let access = FakeAccess::new();
        orders_and_customers_ctx(&access);
        let catalog_dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(catalog_dir.path()).unwrap();
        let ctx = ExecutionContext { catalog: &catalog, access: &access };

        let rows = orders_join_customers(JoinKind::Inner).execute(&ctx).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(matches!(rows[0]["o.id"], Value::Int64(1)));
        assert!(matches!(rows[0]["c.id"], Value::Int64(1)));
        // Ambiguous bare "id" must not silently resolve to just one
        // side's value.
        assert!(!rows[0].contains_key("id"));
    }

    #[test]
    fn test_insert_and_delete_affect_counts() {
        let access = FakeAccess::new();
        access.create_table("t", "default").unwrap();
        let catalog_dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(catalog_dir.path()).unwrap();
        let ctx = ExecutionContext { catalog: &catalog, access: &access };

        let insert = Operator::Insert {
            table: "t".to_string(),
            rows: vec![row(&[("a", Value::Int64(1))]), row(&[("a", Value::Int64(2))])],
        };
        let result = insert.execute(&ctx).unwrap();
        assert!(matches!(result[0]["rows_affected"], Value::Int64(2)));

        let delete = Operator::Delete { table: "t".to_string(), filter: None };
        let result = delete.execute(&ctx).unwrap();
        assert!(matches!(result[0]["rows_affected"], Value::Int64(2)));
        assert_eq!(access.scan_table("t").unwrap().len(), 0);
    }
}
