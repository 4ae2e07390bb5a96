//! End-to-end scenarios against the public `StorageManager` surface,
//! built on the typed `Statement` AST directly (this crate ships no SQL
//! parser — see `execution::ast`).

use interchangedb::common::Error;
use interchangedb::execution::ast::{
    Assignment, ColumnDef, CreateTableStatement, DeleteStatement, DropTableStatement,
    InsertStatement, SelectItem, SelectStatement, TableRef, UpdateStatement,
};
use interchangedb::execution::{ColumnRef, Expr, Statement, Value};
use interchangedb::storage_manager::{ExecOutcome, StorageManagerConfig};
use interchangedb::StorageManager;
use tempfile::tempdir;

fn open() -> (std::sync::Arc<StorageManager>, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let manager = StorageManager::open(dir.path(), StorageManagerConfig::default()).unwrap();
    (manager, dir)
}

fn create_users_table(db: &StorageManager) {
    let stmt = Statement::CreateTable(CreateTableStatement {
        table: "users".to_string(),
        columns: vec![
            ColumnDef { name: "id".to_string(), sql_type: "INT".to_string(), nullable: false },
            ColumnDef { name: "name".to_string(), sql_type: "VARCHAR(50)".to_string(), nullable: true },
            ColumnDef { name: "age".to_string(), sql_type: "INT".to_string(), nullable: true },
        ],
        tablespace: None,
    });
    db.execute(&stmt).unwrap();
}

fn insert_user(db: &StorageManager, id: i64, name: &str, age: i64) {
    let stmt = Statement::Insert(InsertStatement {
        table: "users".to_string(),
        columns: None,
        rows: vec![vec![
            Expr::Literal(Value::Int64(id)),
            Expr::Literal(Value::String(name.to_string())),
            Expr::Literal(Value::Int64(age)),
        ]],
    });
    db.execute(&stmt).unwrap();
}

fn rows_of(outcome: ExecOutcome) -> Vec<interchangedb::execution::Row> {
    match outcome {
        ExecOutcome::Rows(rows) => rows,
        other => panic!("expected Rows, got {other:?}"),
    }
}

/// `Value` has no `PartialEq` (NULL is deliberately incomparable even
/// to itself — see `execution::value`), so tests compare via `Display`
/// instead of `assert_eq!`.
fn value_str(row: &interchangedb::execution::Row, column: &str) -> String {
    row.get(column).map(|v| v.to_string()).unwrap_or_else(|| "<missing>".to_string())
}

/// Scenario 1: round-trip DDL/DML/query (`spec.md` §8).
#[test]
fn scenario_round_trip_ddl_dml_query() {
    let (db, _dir) = open();
    create_users_table(&db);
    insert_user(&db, 1, "Alice", 30);
    insert_user(&db, 2, "Bob", 25);

    let select = Statement::Select(SelectStatement {
        items: vec![SelectItem::Expr { expr: Expr::Column(ColumnRef::unqualified("name")), alias: None }],
        from: Some(TableRef::new("users")),
        where_clause: Some(Expr::BinaryOp {
            op: interchangedb::execution::BinaryOp::Gt,
            left: Box::new(Expr::Column(ColumnRef::unqualified("age"))),
            right: Box::new(Expr::Literal(Value::Int64(26))),
        }),
        ..Default::default()
    });

    let rows = rows_of(db.execute(&select).unwrap());
    assert_eq!(rows.len(), 1);
    assert_eq!(value_str(&rows[0], "name"), "Alice");
}

/// Scenario 2: `GROUP BY ... HAVING` over an aggregate (`spec.md` §8).
#[test]
fn scenario_aggregate_with_having() {
    let (db, _dir) = open();

    db.execute(&Statement::CreateTable(CreateTableStatement {
        table: "people".to_string(),
        columns: vec![
            ColumnDef { name: "city".to_string(), sql_type: "VARCHAR(20)".to_string(), nullable: true },
            ColumnDef { name: "age".to_string(), sql_type: "INT".to_string(), nullable: true },
        ],
        tablespace: None,
    }))
    .unwrap();

    for (city, age) in [("NY", 30), ("NY", 20), ("LA", 40)] {
        db.execute(&Statement::Insert(InsertStatement {
            table: "people".to_string(),
            columns: None,
            rows: vec![vec![Expr::Literal(Value::String(city.to_string())), Expr::Literal(Value::Int64(age))]],
        }))
        .unwrap();
    }

    let select = Statement::Select(SelectStatement {
        items: vec![
            SelectItem::Expr { expr: Expr::Column(ColumnRef::unqualified("city")), alias: None },
            SelectItem::Expr {
                expr: Expr::Aggregate {
                    func: interchangedb::execution::AggFunc::Avg,
                    arg: Some(Box::new(Expr::Column(ColumnRef::unqualified("age")))),
                },
                alias: None,
            },
        ],
        from: Some(TableRef::new("people")),
        group_by: vec![Expr::Column(ColumnRef::unqualified("city"))],
        having: Some(Expr::BinaryOp {
            op: interchangedb::execution::BinaryOp::Gt,
            left: Box::new(Expr::Aggregate {
                func: interchangedb::execution::AggFunc::Avg,
                arg: Some(Box::new(Expr::Column(ColumnRef::unqualified("age")))),
            }),
            right: Box::new(Expr::Literal(Value::Int64(25))),
        }),
        ..Default::default()
    });

    let mut rows = rows_of(db.execute(&select).unwrap());
    rows.sort_by(|a, b| value_str(a, "city").cmp(&value_str(b, "city")));

    assert_eq!(rows.len(), 2);
    assert_eq!(value_str(&rows[0], "city"), "LA");
    assert_eq!(value_str(&rows[0], "AVG(age)"), "40");
    assert_eq!(value_str(&rows[1], "city"), "NY");
    assert_eq!(value_str(&rows[1], "AVG(age)"), "25");
}

/// Scenario 3: an uncommitted update must not be visible after a
/// rollback (`spec.md` §8).
#[test]
fn scenario_rollback_restores_original_row() {
    let (db, _dir) = open();
    create_users_table(&db);
    insert_user(&db, 1, "Alice", 30);

    db.execute(&Statement::Begin { isolation: None }).unwrap();
    db.execute(&Statement::Update(UpdateStatement {
        table: "users".to_string(),
        assignments: vec![Assignment { column: "age".to_string(), value: Expr::Literal(Value::Int64(99)) }],
        where_clause: Some(Expr::BinaryOp {
            op: interchangedb::execution::BinaryOp::Eq,
            left: Box::new(Expr::Column(ColumnRef::unqualified("id"))),
            right: Box::new(Expr::Literal(Value::Int64(1))),
        }),
    }))
    .unwrap();
    db.execute(&Statement::Rollback).unwrap();

    let select = Statement::Select(SelectStatement {
        items: vec![SelectItem::Wildcard],
        from: Some(TableRef::new("users")),
        ..Default::default()
    });
    let rows = rows_of(db.execute(&select).unwrap());
    assert_eq!(rows.len(), 1);
    assert_eq!(value_str(&rows[0], "age"), "30");
}

/// A committed transaction's writes must survive: the companion half of
/// scenario 3 (`spec.md` §8 durability invariant).
#[test]
fn committed_update_is_visible_to_a_later_transaction() {
    let (db, _dir) = open();
    create_users_table(&db);
    insert_user(&db, 1, "Alice", 30);

    db.execute(&Statement::Begin { isolation: None }).unwrap();
    db.execute(&Statement::Update(UpdateStatement {
        table: "users".to_string(),
        assignments: vec![Assignment { column: "age".to_string(), value: Expr::Literal(Value::Int64(31)) }],
        where_clause: None,
    }))
    .unwrap();
    db.execute(&Statement::Commit).unwrap();

    let select = Statement::Select(SelectStatement {
        items: vec![SelectItem::Wildcard],
        from: Some(TableRef::new("users")),
        ..Default::default()
    });
    let rows = rows_of(db.execute(&select).unwrap());
    assert_eq!(value_str(&rows[0], "age"), "31");
}

#[test]
fn delete_removes_matching_rows_only() {
    let (db, _dir) = open();
    create_users_table(&db);
    insert_user(&db, 1, "Alice", 30);
    insert_user(&db, 2, "Bob", 25);

    db.execute(&Statement::Delete(DeleteStatement {
        table: "users".to_string(),
        where_clause: Some(Expr::BinaryOp {
            op: interchangedb::execution::BinaryOp::Eq,
            left: Box::new(Expr::Column(ColumnRef::unqualified("name"))),
            right: Box::new(Expr::Literal(Value::String("Bob".to_string()))),
        }),
    }))
    .unwrap();

    let select = Statement::Select(SelectStatement {
        items: vec![SelectItem::Wildcard],
        from: Some(TableRef::new("users")),
        ..Default::default()
    });
    let rows = rows_of(db.execute(&select).unwrap());
    assert_eq!(rows.len(), 1);
    assert_eq!(value_str(&rows[0], "name"), "Alice");
}

#[test]
fn dropping_a_table_clears_its_rows_and_catalog_entry() {
    let (db, _dir) = open();
    create_users_table(&db);
    insert_user(&db, 1, "Alice", 30);

    db.execute(&Statement::DropTable(DropTableStatement {
        table: "users".to_string(),
    }))
    .unwrap();

    let select = Statement::Select(SelectStatement {
        items: vec![SelectItem::Wildcard],
        from: Some(TableRef::new("users")),
        ..Default::default()
    });
    let err = db.execute(&select).unwrap_err();
    assert!(matches!(err, Error::TableNotFound(_) | Error::UnknownTable(_)));
}
