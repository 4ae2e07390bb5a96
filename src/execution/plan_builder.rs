//! Plan builder: translates a typed [`crate::execution::ast::Statement`]
//! into an [`Operator`] tree (§4.12).
//!
//! DDL is special-cased: `CREATE`/`DROP TABLE` and `CREATE`/`DROP INDEX`
//! mutate the [`Catalog`] here, during planning, rather than at
//! execution time. The resulting operator only drives the matching
//! storage-layer side effect (or, for indexes, nothing at all — there is
//! no physical index structure to populate).

use crate::catalog::{sql_types_compatible, Catalog, ColumnInfo};
use crate::common::{Error, Result};
use crate::execution::ast::{
    DeleteStatement, InsertStatement, SelectItem, SelectStatement, Statement, UpdateStatement,
};
use crate::execution::expr::{AggFunc, BinaryOp, ColumnRef, Expr};
use crate::execution::operator::{JoinCondition, Operator, OrderKey, ProjectItem};
use crate::execution::value::{Row, Value};

const DEFAULT_TABLESPACE: &str = "default";

/// Build an operator tree for `stmt`. DDL statements (`CREATE`/`DROP
/// TABLE`/`INDEX`) apply their catalog change as a side effect of this
/// call; everything else is pure.
pub fn build_plan(stmt: &Statement, catalog: &mut Catalog) -> Result<Operator> {
    match stmt {
        Statement::CreateTable(s) => {
            let tablespace = s.tablespace.clone().unwrap_or_else(|| DEFAULT_TABLESPACE.to_string());
            let columns = s
                .columns
                .iter()
                .map(|c| {
                    let mut info = ColumnInfo::new(c.name.clone(), c.sql_type.clone());
                    info.nullable = c.nullable;
                    info
                })
                .collect();
            catalog.create_table(&s.table, columns, &tablespace)?;
            Ok(Operator::CreateTable {
                table: s.table.clone(),
                tablespace,
            })
        }
        Statement::DropTable(s) => {
            catalog.drop_table(&s.table)?;
            Ok(Operator::DropTable { table: s.table.clone() })
        }
        Statement::CreateIndex(s) => {
            catalog.create_index(&s.index_name, &s.table, s.columns.clone(), s.unique, "btree")?;
            Ok(Operator::CreateIndex {
                index_name: s.index_name.clone(),
                table: s.table.clone(),
                columns: s.columns.clone(),
                unique: s.unique,
            })
        }
        Statement::DropIndex(s) => {
            catalog.drop_index(&s.index_name)?;
            Ok(Operator::DropIndex {
                index_name: s.index_name.clone(),
            })
        }
        Statement::Insert(s) => build_insert(s, catalog),
        Statement::Select(s) => build_select(s, catalog),
        Statement::Update(s) => build_update(s, catalog),
        Statement::Delete(s) => build_delete(s),
        Statement::Begin { .. } | Statement::Commit | Statement::Rollback | Statement::Savepoint { .. } => {
            Err(Error::Unsupported(
                "transaction control statements are handled by the storage layer, not the plan builder"
                    .to_string(),
            ))
        }
    }
}

/// Validate a value against a column's declared SQL type, per `spec.md`
/// §4.11: "VARCHAR<->CHAR and any numeric pair are interchangeable".
/// NULL is always accepted; the column's own `nullable` flag is a
/// storage-layer concern, not this layer's.
fn check_type_compatibility(table: &str, column: &ColumnInfo, value: &Value) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }
    let kind = match value.type_name() {
        "string" => "str",
        other => other,
    };
    if sql_types_compatible(&column.sql_type, kind) {
        Ok(())
    } else {
        Err(Error::TypeMismatch(format!(
            "column '{table}.{}' is declared {} but was given a {kind} value",
            column.name, column.sql_type
        )))
    }
}

fn build_insert(stmt: &InsertStatement, catalog: &Catalog) -> Result<Operator> {
    let table = catalog.get_table(&stmt.table)?;
    let column_names: Vec<String> = match &stmt.columns {
        Some(cols) => cols.clone(),
        None => table.columns.iter().map(|c| c.name.clone()).collect(),
    };

    let mut rows = Vec::with_capacity(stmt.rows.len());
    for value_exprs in &stmt.rows {
        if value_exprs.len() != column_names.len() {
            return Err(Error::InvalidSchema(format!(
                "INSERT into '{}' supplies {} value(s) for {} column(s)",
                stmt.table,
                value_exprs.len(),
                column_names.len()
            )));
        }

        let empty = Row::new();
        let mut row = Row::with_capacity(column_names.len());
        for (name, expr) in column_names.iter().zip(value_exprs) {
            let value = expr.evaluate(&empty)?;
            let column = catalog.get_column_info(&stmt.table, name)?;
            check_type_compatibility(&stmt.table, column, &value)?;
            row.insert(name.clone(), value);
        }
        rows.push(row);
    }

    Ok(Operator::Insert {
        table: stmt.table.clone(),
        rows,
    })
}

fn build_update(stmt: &UpdateStatement, catalog: &Catalog) -> Result<Operator> {
    catalog.get_table(&stmt.table)?;
    let assignments = stmt
        .assignments
        .iter()
        .map(|a| (a.column.clone(), a.value.clone()))
        .collect();
    Ok(Operator::Update {
        table: stmt.table.clone(),
        assignments,
        filter: stmt.where_clause.clone(),
    })
}

fn build_delete(stmt: &DeleteStatement) -> Result<Operator> {
    Ok(Operator::Delete {
        table: stmt.table.clone(),
        filter: stmt.where_clause.clone(),
    })
}

fn build_select(select: &SelectStatement, catalog: &Catalog) -> Result<Operator> {
    let from = select
        .from
        .as_ref()
        .ok_or_else(|| Error::Unsupported("SELECT without FROM is not supported".to_string()))?;
    let alias = from.display_name().to_string();
    let single_table = select.joins.is_empty();

    // Single-table plans get one pushdown opportunity: either the
    // `WHERE` predicate (as an index lookup or a fused scan filter) or,
    // failing that, a pure column projection. Joined plans always start
    // from a plain scan since the predicate may reference either side.
    let mut where_pushed = false;
    let mut project_pushed = false;
    let mut plan = if !single_table {
        Operator::SeqScan { table: from.name.clone(), alias: alias.clone() }
    } else if let Some(op) = try_index_or_filtered_scan(&from.name, &alias, select, catalog) {
        where_pushed = true;
        op
    } else if let Some(op) = try_optimized_scan(&from.name, &alias, select) {
        project_pushed = true;
        op
    } else {
        Operator::SeqScan { table: from.name.clone(), alias: alias.clone() }
    };

    // Tracks the alias a chained join should treat as "the left side":
    // the FROM alias for the first join, then the most recently joined
    // table's alias for each subsequent one (nested-loop join over
    // child outputs, per spec.md §4.11 — an N-way join is just this
    // repeated pairwise).
    let mut left_alias = alias.clone();
    for join in &select.joins {
        let right_alias = join.right.display_name().to_string();
        let right = Operator::SeqScan { table: join.right.name.clone(), alias: right_alias.clone() };
        plan = Operator::Join {
            left: Box::new(plan),
            right: Box::new(right),
            condition: JoinCondition {
                kind: join.kind,
                left_alias: left_alias.clone(),
                right_alias: right_alias.clone(),
                on: join.on.clone(),
            },
        };
        left_alias = right_alias;
    }

    if !where_pushed {
        if let Some(predicate) = &select.where_clause {
            plan = Operator::Filter {
                input: Box::new(plan),
                predicate: predicate.clone(),
            };
        }
    }

    let mut aggregates = collect_select_aggregates(select);
    let grouping = !select.group_by.is_empty() || !aggregates.is_empty();
    if grouping {
        // `GROUP BY` with no aggregate listed implicitly counts group
        // members (`spec.md` §4.12).
        if !select.group_by.is_empty() && aggregates.is_empty() {
            aggregates.push((AggFunc::Count, None, "COUNT(*)".to_string()));
        }
        plan = Operator::GroupBy {
            input: Box::new(plan),
            group_exprs: select.group_by.clone(),
            aggregates,
            having: select.having.as_ref().map(|h| rewrite_aggregates(h)),
        };
    }

    let is_wildcard_only = matches!(select.items.as_slice(), [SelectItem::Wildcard]);
    if !project_pushed && !is_wildcard_only && !select.items.is_empty() {
        let items = select
            .items
            .iter()
            .filter_map(|item| match item {
                SelectItem::Wildcard => None,
                SelectItem::Expr { expr, alias } => {
                    let resolved = if grouping { rewrite_aggregates(expr) } else { expr.clone() };
                    let name = alias.clone().unwrap_or_else(|| expr.column_name());
                    Some(ProjectItem { expr: resolved, alias: name })
                }
            })
            .collect();
        plan = Operator::Project {
            input: Box::new(plan),
            items,
        };
    }

    if !select.order_by.is_empty() {
        let keys = select
            .order_by
            .iter()
            .map(|item| OrderKey {
                expr: if grouping { rewrite_aggregates(&item.expr) } else { item.expr.clone() },
                direction: item.direction,
            })
            .collect();
        plan = Operator::OrderBy {
            input: Box::new(plan),
            keys,
        };
    }

    if let Some(limit) = select.limit {
        plan = Operator::Limit {
            input: Box::new(plan),
            limit,
        };
    }

    Ok(plan)
}

/// Push a single-table `WHERE` predicate into the scan itself, as an
/// [`Operator::IndexScan`] when it's an equality lookup on an indexed
/// column, else as an [`Operator::FilteredSeqScan`]. Returns `None` when
/// there is no predicate to push (the caller falls back to a plain
/// scan). Both pushed forms cost the same as a scan-then-`Filter` to
/// execute (§4.11) — this only saves materializing the unfiltered
/// intermediate row set.
fn try_index_or_filtered_scan(
    table: &str,
    alias: &str,
    select: &SelectStatement,
    catalog: &Catalog,
) -> Option<Operator> {
    let predicate = select.where_clause.as_ref()?;

    if let Expr::BinaryOp { op: BinaryOp::Eq, left, right } = predicate {
        if let Some((column, key)) = as_equality_lookup(left, right) {
            if let Some(index) = catalog.find_best_index(table, &[column.clone()]) {
                if index.columns.first() == Some(&column) {
                    return Some(Operator::IndexScan {
                        table: table.to_string(),
                        alias: alias.to_string(),
                        index_name: index.name.clone(),
                        key,
                    });
                }
            }
        }
    }

    Some(Operator::FilteredSeqScan {
        table: table.to_string(),
        alias: alias.to_string(),
        predicate: predicate.clone(),
    })
}

/// Recognize `column = literal` or `literal = column`, in either order.
fn as_equality_lookup(left: &Expr, right: &Expr) -> Option<(String, Expr)> {
    match (left, right) {
        (Expr::Column(c), Expr::Literal(_)) => Some((c.column.clone(), right.clone())),
        (Expr::Literal(_), Expr::Column(c)) => Some((c.column.clone(), left.clone())),
        _ => None,
    }
}

/// Push a pure column projection (no `WHERE`, no aggregates, every
/// select item a bare unaliased column) into the scan as an
/// [`Operator::OptimizedSeqScan`], skipping a separate `Project` stage.
/// Returns `None` for anything more complex, in which case the caller
/// builds a plain scan and a later `Project` handles it instead.
fn try_optimized_scan(table: &str, alias: &str, select: &SelectStatement) -> Option<Operator> {
    if select.where_clause.is_some() || !select.group_by.is_empty() || select.having.is_some() {
        return None;
    }

    let mut columns = Vec::with_capacity(select.items.len());
    for item in &select.items {
        match item {
            SelectItem::Expr {
                expr: Expr::Column(c),
                alias: None,
            } if c.table.is_none() || c.table.as_deref() == Some(alias) => {
                columns.push(c.column.clone());
            }
            _ => return None,
        }
    }
    if columns.is_empty() {
        return None;
    }

    Some(Operator::OptimizedSeqScan {
        table: table.to_string(),
        alias: alias.to_string(),
        columns,
    })
}

/// Collect every aggregate call in the select list, `HAVING`, and
/// `ORDER BY`, deduplicated by their rendered name. An aggregate
/// referenced only in `ORDER BY` (e.g. `ORDER BY COUNT(*)`) still needs
/// to be computed by `GroupBy` so the sort key can resolve it.
fn collect_select_aggregates(select: &SelectStatement) -> Vec<(AggFunc, Option<Expr>, String)> {
    let mut found = Vec::new();
    for item in &select.items {
        if let SelectItem::Expr { expr, .. } = item {
            collect_aggregates(expr, &mut found);
        }
    }
    if let Some(having) = &select.having {
        collect_aggregates(having, &mut found);
    }
    for order in &select.order_by {
        collect_aggregates(&order.expr, &mut found);
    }
    found
}

fn collect_aggregates(expr: &Expr, out: &mut Vec<(AggFunc, Option<Expr>, String)>) {
    match expr {
        Expr::Aggregate { func, arg } => {
            let name = expr.column_name();
            if !out.iter().any(|(_, _, n)| n == &name) {
                out.push((*func, arg.as_deref().cloned(), name));
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            collect_aggregates(left, out);
            collect_aggregates(right, out);
        }
        Expr::UnaryOp { expr, .. } | Expr::IsNull { expr, .. } => collect_aggregates(expr, out),
        Expr::InList { expr, list } => {
            collect_aggregates(expr, out);
            for item in list {
                collect_aggregates(item, out);
            }
        }
        Expr::InSubquery { expr, .. } => collect_aggregates(expr, out),
        Expr::Literal(_) | Expr::Column(_) => {}
    }
}

/// Replace every `Expr::Aggregate` node with a reference to the column
/// `GroupBy` already bound it under (its `column_name()`), so `HAVING`
/// and post-group `ORDER BY`/projection expressions can evaluate
/// against the aggregated row instead of the raw input.
fn rewrite_aggregates(expr: &Expr) -> Expr {
    match expr {
        Expr::Aggregate { .. } => Expr::Column(ColumnRef::unqualified(expr.column_name())),
        Expr::BinaryOp { op, left, right } => Expr::BinaryOp {
            op: *op,
            left: Box::new(rewrite_aggregates(left)),
            right: Box::new(rewrite_aggregates(right)),
        },
        Expr::UnaryOp { op, expr } => Expr::UnaryOp {
            op: *op,
            expr: Box::new(rewrite_aggregates(expr)),
        },
        Expr::IsNull { expr, negated } => Expr::IsNull {
            expr: Box::new(rewrite_aggregates(expr)),
            negated: *negated,
        },
        Expr::InList { expr, list } => Expr::InList {
            expr: Box::new(rewrite_aggregates(expr)),
            list: list.iter().map(rewrite_aggregates).collect(),
        },
        Expr::InSubquery { expr, values } => Expr::InSubquery {
            expr: Box::new(rewrite_aggregates(expr)),
            values: values.clone(),
        },
        other @ (Expr::Literal(_) | Expr::Column(_)) => other.clone(),
    }
}
