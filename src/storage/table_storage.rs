//! Table storage catalog: the page list owned by each table.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::{Error, PageId, Result};

/// Per-table record of which pages (and in which tablespace) belong to
/// it, persisted as `table_storage_catalog.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableStorageEntry {
    pub tablespace: String,
    pub page_ids: Vec<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TableStorageRegistry {
    tables: HashMap<String, TableStorageEntry>,
}

/// Maps table names to their ordered list of owned page ids.
pub struct TableStorageCatalog {
    path: PathBuf,
    registry: TableStorageRegistry,
}

impl TableStorageCatalog {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = dir.as_ref().join("table_storage_catalog.json");
        let registry = if path.exists() {
            let contents = fs::read_to_string(&path)
                .map_err(|e| Error::io(path.display().to_string(), "read_table_storage", e))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            TableStorageRegistry::default()
        };

        Ok(Self { path, registry })
    }

    fn save(&self) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&self.registry)
            .map_err(|e| Error::Corrupt(format!("failed to serialize table storage catalog: {e}")))?;
        fs::write(&tmp, json)
            .map_err(|e| Error::io(tmp.display().to_string(), "write_table_storage_tmp", e))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| Error::io(self.path.display().to_string(), "rename_table_storage", e))
    }

    /// Register a new table with its first allocated page.
    pub fn register_table(
        &mut self,
        table_name: &str,
        tablespace: &str,
        first_page: PageId,
    ) -> Result<()> {
        if self.registry.tables.contains_key(table_name) {
            return Err(Error::TableAlreadyExists(table_name.to_string()));
        }
        self.registry.tables.insert(
            table_name.to_string(),
            TableStorageEntry {
                tablespace: tablespace.to_string(),
                page_ids: vec![first_page.0],
            },
        );
        self.save()
    }

    /// Append a newly allocated page to a table's page list.
    pub fn add_page(&mut self, table_name: &str, page_id: PageId) -> Result<()> {
        let entry = self
            .registry
            .tables
            .get_mut(table_name)
            .ok_or_else(|| Error::TableNotFound(table_name.to_string()))?;
        entry.page_ids.push(page_id.0);
        self.save()
    }

    /// Remove a table and all record of its owned pages.
    pub fn drop_table(&mut self, table_name: &str) -> Result<TableStorageEntry> {
        let entry = self
            .registry
            .tables
            .remove(table_name)
            .ok_or_else(|| Error::TableNotFound(table_name.to_string()))?;
        self.save()?;
        Ok(entry)
    }

    /// The ordered page ids owned by a table.
    pub fn pages_for(&self, table_name: &str) -> Result<Vec<PageId>> {
        self.registry
            .tables
            .get(table_name)
            .map(|entry| entry.page_ids.iter().map(|&id| PageId::new(id)).collect())
            .ok_or_else(|| Error::TableNotFound(table_name.to_string()))
    }

    /// The tablespace a table is pinned to.
    pub fn tablespace_for(&self, table_name: &str) -> Result<&str> {
        self.registry
            .tables
            .get(table_name)
            .map(|entry| entry.tablespace.as_str())
            .ok_or_else(|| Error::TableNotFound(table_name.to_string()))
    }

    pub fn table_exists(&self, table_name: &str) -> bool {
        self.registry.tables.contains_key(table_name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.registry.tables.keys().map(|s| s.as_str()).collect()
    }
}
