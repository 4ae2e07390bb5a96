//! Tablespace Manager: named, file-backed storage areas.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};

use super::disk_manager::DiskManager;

/// Tablespaces created automatically on first use.
const BUILTIN_TABLESPACES: &[&str] = &["default", "system", "user_data", "temp", "log"];

/// Persisted metadata for one tablespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablespaceInfo {
    pub file_path: String,
    pub size_mb: u64,
    pub created_time: chrono::DateTime<chrono::Utc>,
    pub is_default: bool,
    pub status: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TablespaceRegistry {
    tablespaces: HashMap<String, TablespaceInfo>,
}

/// Owns the name→file mapping for every tablespace and the lazily
/// opened [`DiskManager`] backing each one.
///
/// `default`, `system`, `user_data`, `temp`, and `log` are guaranteed to
/// exist once a `TablespaceManager` is constructed.
pub struct TablespaceManager {
    base_dir: PathBuf,
    registry_path: PathBuf,
    registry: TablespaceRegistry,
    disk_managers: HashMap<String, DiskManager>,
}

impl TablespaceManager {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)
            .map_err(|e| Error::io(base_dir.display().to_string(), "create_dir_all", e))?;

        let registry_path = base_dir.join("tablespaces.json");
        let registry = Self::load_registry(&registry_path)?;

        let mut manager = Self {
            base_dir,
            registry_path,
            registry,
            disk_managers: HashMap::new(),
        };

        for name in BUILTIN_TABLESPACES {
            manager.ensure_exists(name, *name == "default")?;
        }

        Ok(manager)
    }

    fn load_registry(path: &Path) -> Result<TablespaceRegistry> {
        if !path.exists() {
            return Ok(TablespaceRegistry::default());
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::io(path.display().to_string(), "read_tablespaces", e))?;
        match serde_json::from_str(&contents) {
            Ok(registry) => Ok(registry),
            Err(_) => {
                let backup = path.with_extension("json.backup");
                let _ = fs::rename(path, &backup);
                log::warn!(
                    "corrupt tablespace registry at {}, backed up to {} and reset",
                    path.display(),
                    backup.display()
                );
                Ok(TablespaceRegistry::default())
            }
        }
    }

    fn save_registry(&self) -> Result<()> {
        let tmp = self.registry_path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&self.registry)
            .map_err(|e| Error::Corrupt(format!("failed to serialize tablespace registry: {e}")))?;
        fs::write(&tmp, json)
            .map_err(|e| Error::io(tmp.display().to_string(), "write_tablespaces_tmp", e))?;
        fs::rename(&tmp, &self.registry_path)
            .map_err(|e| Error::io(self.registry_path.display().to_string(), "rename_tablespaces", e))
    }

    fn ensure_exists(&mut self, name: &str, is_default: bool) -> Result<()> {
        if self.registry.tablespaces.contains_key(name) {
            return Ok(());
        }
        self.create_internal(name, is_default)
    }

    fn create_internal(&mut self, name: &str, is_default: bool) -> Result<()> {
        let file_path = self.base_dir.join(format!("{name}.tbs"));
        self.registry.tablespaces.insert(
            name.to_string(),
            TablespaceInfo {
                file_path: file_path.display().to_string(),
                size_mb: 0,
                created_time: chrono::Utc::now(),
                is_default,
                status: "active".to_string(),
            },
        );
        self.save_registry()?;
        // Notify the Page Manager of the new name->path mapping by
        // opening its DiskManager eagerly.
        self.disk_manager_for(name)?;
        Ok(())
    }

    /// Create a new, non-default tablespace.
    ///
    /// # Errors
    /// Fails if a tablespace with this name already exists.
    pub fn create(&mut self, name: &str) -> Result<()> {
        if self.registry.tablespaces.contains_key(name) {
            return Err(Error::InvalidSchema(format!(
                "tablespace '{name}' already exists"
            )));
        }
        self.create_internal(name, false)
    }

    /// Drop a tablespace. The `default` tablespace can never be dropped.
    pub fn drop_tablespace(&mut self, name: &str) -> Result<()> {
        if name == "default" {
            return Err(Error::InvalidSchema(
                "the default tablespace cannot be dropped".to_string(),
            ));
        }
        if self.registry.tablespaces.remove(name).is_none() {
            return Err(Error::InvalidSchema(format!(
                "tablespace '{name}' does not exist"
            )));
        }
        self.disk_managers.remove(name);
        self.save_registry()
    }

    /// List every known tablespace name and its metadata.
    pub fn list(&self) -> Vec<(&str, &TablespaceInfo)> {
        self.registry
            .tablespaces
            .iter()
            .map(|(name, info)| (name.as_str(), info))
            .collect()
    }

    /// Backing file path for a tablespace, if it exists.
    pub fn get_file_path(&self, name: &str) -> Option<PathBuf> {
        self.registry
            .tablespaces
            .get(name)
            .map(|info| PathBuf::from(&info.file_path))
    }

    /// The (lazily opened) disk manager backing a tablespace.
    pub fn disk_manager_for(&mut self, name: &str) -> Result<&mut DiskManager> {
        if !self.disk_managers.contains_key(name) {
            let path = self
                .get_file_path(name)
                .ok_or_else(|| Error::InvalidSchema(format!("unknown tablespace '{name}'")))?;
            let dm = DiskManager::open_or_create(path)?;
            self.disk_managers.insert(name.to_string(), dm);
        }
        Ok(self.disk_managers.get_mut(name).unwrap())
    }
}
