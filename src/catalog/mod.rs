//! Catalog: in-memory table/column/index metadata, persisted as
//! `system_catalog.json` (§4.10).
//!
//! This is distinct from [`crate::storage::TableStorageCatalog`], which
//! tracks the storage-layer page list per table. `Catalog` tracks the
//! SQL-layer schema: column names/types and index definitions.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::config::MAX_IDENTIFIER_LEN;
use crate::common::{Error, Result};
use crate::storage::{ColumnType, SchemaColumn};

/// SQL-level column type name, as it appears in DDL. Distinct from
/// [`ColumnType`] (the physical codec) so the catalog can record the
/// user's declared type string (e.g. `VARCHAR(50)` vs `TEXT`) while
/// `column_type()` maps it down to the physical codec used by the
/// record serializer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: true,
        }
    }

    /// Map the declared SQL type onto the physical [`ColumnType`] codec
    /// the record serializer uses. See `spec.md` §4.11's DML type
    /// compatibility table.
    pub fn column_type(&self) -> Result<ColumnType> {
        let upper = self.sql_type.to_uppercase();
        let base = upper.split('(').next().unwrap_or(&upper).trim();

        match base {
            "INT" | "INTEGER" => Ok(ColumnType::Int32),
            "FLOAT" | "DOUBLE" | "DECIMAL" | "NUMERIC" | "REAL" => Ok(ColumnType::Float32),
            "BOOLEAN" | "BOOL" => Ok(ColumnType::Bool),
            "DATE" | "DATETIME" | "TIMESTAMP" => Ok(ColumnType::Date),
            "VARCHAR" | "CHAR" | "TEXT" => {
                let declared_len = upper
                    .split('(')
                    .nth(1)
                    .and_then(|rest| rest.trim_end_matches(')').parse::<usize>().ok());
                Ok(ColumnType::Varchar(declared_len))
            }
            other => Err(Error::InvalidSchema(format!(
                "unknown SQL type '{other}' for column '{}'",
                self.name
            ))),
        }
    }

    fn to_schema_column(&self) -> Result<SchemaColumn> {
        Ok(SchemaColumn::new(self.name.clone(), self.column_type()?))
    }
}

/// Table types a value's Rust-level tag is compatible with, per
/// `spec.md` §4.11: "VARCHAR<->CHAR and any numeric pair are
/// interchangeable".
pub fn sql_types_compatible(declared: &str, value_kind: &str) -> bool {
    let declared = declared.to_uppercase();
    let base = declared.split('(').next().unwrap_or(&declared).trim();
    match value_kind {
        "int" => matches!(base, "INT" | "INTEGER" | "FLOAT" | "DOUBLE" | "DECIMAL" | "NUMERIC" | "REAL"),
        "float" => matches!(base, "FLOAT" | "DOUBLE" | "DECIMAL" | "NUMERIC" | "REAL" | "INT" | "INTEGER"),
        "str" => matches!(base, "VARCHAR" | "CHAR" | "TEXT"),
        "bool" => matches!(base, "BOOLEAN" | "BOOL"),
        _ => false,
    }
}

/// A table's SQL-level schema: its columns in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub tablespace: String,
}

impl TableMeta {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Physical schema (column name + codec) used by the record
    /// serializer.
    pub fn physical_schema(&self) -> Result<Vec<SchemaColumn>> {
        self.columns.iter().map(ColumnInfo::to_schema_column).collect()
    }
}

/// An index definition: which table/columns it covers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub index_type: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct CatalogRegistry {
    tables: HashMap<String, TableMeta>,
    indexes: HashMap<String, IndexInfo>,
}

/// Reserved words that cannot be used as table or column identifiers.
const RESERVED_WORDS: &[&str] = &[
    "select", "from", "where", "insert", "update", "delete", "create", "drop", "table", "index",
    "into", "values", "set", "and", "or", "not", "join", "group", "order", "by", "having",
    "begin", "commit", "rollback", "savepoint", "null", "true", "false",
];

/// Validate a table/column identifier per `spec.md` §3: "≤ 64 chars,
/// alpha+digit+underscore, not starting with a digit, not a reserved
/// word".
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::InvalidSchema(format!(
            "identifier '{name}' must be 1-{MAX_IDENTIFIER_LEN} characters"
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::InvalidSchema(format!(
            "identifier '{name}' may only contain letters, digits, and underscores"
        )));
    }
    if name.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
        return Err(Error::InvalidSchema(format!(
            "identifier '{name}' cannot start with a digit"
        )));
    }
    if RESERVED_WORDS.contains(&name.to_lowercase().as_str()) {
        return Err(Error::InvalidSchema(format!(
            "'{name}' is a reserved word and cannot be used as an identifier"
        )));
    }
    Ok(())
}

/// In-memory table/column/index metadata, persisted as
/// `system_catalog.json` (write-temp-then-rename, matching every other
/// JSON-backed component in this crate).
#[derive(Clone)]
pub struct Catalog {
    path: PathBuf,
    registry: CatalogRegistry,
}

impl Catalog {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = dir.as_ref().join("system_catalog.json");
        let registry = if path.exists() {
            let contents = fs::read_to_string(&path)
                .map_err(|e| Error::io(path.display().to_string(), "read_catalog", e))?;
            match serde_json::from_str(&contents) {
                Ok(registry) => registry,
                Err(_) => {
                    let backup = path.with_extension("json.backup");
                    let _ = fs::rename(&path, &backup);
                    log::warn!(
                        "corrupt system catalog at {}, backed up to {} and reset",
                        path.display(),
                        backup.display()
                    );
                    CatalogRegistry::default()
                }
            }
        } else {
            CatalogRegistry::default()
        };

        Ok(Self { path, registry })
    }

    fn save(&self) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&self.registry)
            .map_err(|e| Error::Corrupt(format!("failed to serialize system catalog: {e}")))?;
        fs::write(&tmp, json)
            .map_err(|e| Error::io(tmp.display().to_string(), "write_catalog_tmp", e))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| Error::io(self.path.display().to_string(), "rename_catalog", e))
    }

    /// Define a new table. Validates the table name, every column name,
    /// and rejects duplicate column names.
    pub fn create_table(
        &mut self,
        name: &str,
        columns: Vec<ColumnInfo>,
        tablespace: &str,
    ) -> Result<()> {
        validate_identifier(name)?;
        if self.registry.tables.contains_key(name) {
            return Err(Error::TableAlreadyExists(name.to_string()));
        }
        if columns.is_empty() {
            return Err(Error::InvalidSchema(format!(
                "table '{name}' must have at least one column"
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for col in &columns {
            validate_identifier(&col.name)?;
            if !seen.insert(col.name.clone()) {
                return Err(Error::InvalidSchema(format!(
                    "duplicate column name '{}' in table '{name}'",
                    col.name
                )));
            }
            col.column_type()?;
        }

        self.registry.tables.insert(
            name.to_string(),
            TableMeta {
                name: name.to_string(),
                columns,
                tablespace: tablespace.to_string(),
            },
        );
        self.save()
    }

    pub fn drop_table(&mut self, name: &str) -> Result<TableMeta> {
        let table = self
            .registry
            .tables
            .remove(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))?;
        self.registry.indexes.retain(|_, idx| idx.table != name);
        self.save()?;
        Ok(table)
    }

    pub fn get_table(&self, name: &str) -> Result<&TableMeta> {
        self.registry
            .tables
            .get(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.registry.tables.contains_key(name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.registry.tables.keys().map(|s| s.as_str()).collect()
    }

    pub fn get_column_info(&self, table: &str, column: &str) -> Result<&ColumnInfo> {
        self.get_table(table)?
            .column(column)
            .ok_or_else(|| Error::UnknownColumn(format!("{table}.{column}")))
    }

    pub fn create_index(
        &mut self,
        name: &str,
        table: &str,
        columns: Vec<String>,
        unique: bool,
        index_type: &str,
    ) -> Result<()> {
        validate_identifier(name)?;
        if !self.registry.tables.contains_key(table) {
            return Err(Error::TableNotFound(table.to_string()));
        }
        if self.registry.indexes.contains_key(name) {
            return Err(Error::IndexAlreadyExists(name.to_string()));
        }
        for col in &columns {
            self.get_column_info(table, col)?;
        }

        self.registry.indexes.insert(
            name.to_string(),
            IndexInfo {
                name: name.to_string(),
                table: table.to_string(),
                columns,
                unique,
                index_type: index_type.to_string(),
            },
        );
        self.save()
    }

    pub fn drop_index(&mut self, name: &str) -> Result<IndexInfo> {
        let idx = self
            .registry
            .indexes
            .remove(name)
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))?;
        self.save()?;
        Ok(idx)
    }

    pub fn get_index(&self, name: &str) -> Result<&IndexInfo> {
        self.registry
            .indexes
            .get(name)
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))
    }

    pub fn get_all_indexes(&self, table: &str) -> Vec<&IndexInfo> {
        self.registry
            .indexes
            .values()
            .filter(|idx| idx.table == table)
            .collect()
    }

    /// Find the index over `table` that covers the most of `columns`
    /// (in any order), preferring a full match. Returns `None` if no
    /// index covers at least one of `columns`.
    pub fn find_best_index(&self, table: &str, columns: &[String]) -> Option<&IndexInfo> {
        let wanted: std::collections::HashSet<&str> = columns.iter().map(|s| s.as_str()).collect();
        self.get_all_indexes(table)
            .into_iter()
            .filter(|idx| idx.columns.iter().any(|c| wanted.contains(c.as_str())))
            .max_by_key(|idx| idx.columns.iter().filter(|c| wanted.contains(c.as_str())).count())
    }
}
