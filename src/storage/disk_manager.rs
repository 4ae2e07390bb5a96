//! Disk Manager (Page Manager) - low-level file I/O and allocation
//! bookkeeping for one tablespace's data file.
//!
//! The [`DiskManager`] owns a single tablespace's bytes on disk plus the
//! metadata needed to hand out page ids: the next unused id, the set of
//! freed-but-reusable ids, and the set of currently allocated ids. It is
//! the sole writer to its backing file; the `buffer` module is
//! responsible for caching and for serializing concurrent access.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::config::{DEFAULT_MAX_ALLOCATED_PAGES, PAGE_SIZE};
use crate::common::{Error, PageId, Result};
use crate::storage::page::Page;

/// Persisted allocation bookkeeping for one tablespace.
///
/// Page ids are 1-based: `next_page_id` starts at 1, and a page's file
/// offset is `(page_id - 1) * PAGE_SIZE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PageMetadata {
    next_page_id: u32,
    free_pages: BTreeSet<u32>,
    allocated_pages: BTreeSet<u32>,
    #[serde(default = "chrono::Utc::now")]
    last_modification: chrono::DateTime<chrono::Utc>,
    #[serde(default = "default_version")]
    version: String,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for PageMetadata {
    fn default() -> Self {
        Self {
            next_page_id: 1,
            free_pages: BTreeSet::new(),
            allocated_pages: BTreeSet::new(),
            last_modification: chrono::Utc::now(),
            version: default_version(),
        }
    }
}

/// Manages disk I/O and page allocation for a single tablespace file.
///
/// # File Layout
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Page 1  │ Page 2  │ Page 3  │  ...    │ Page N  │
/// │ (4KB)   │ (4KB)   │ (4KB)   │         │ (4KB)   │
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0      4096     8192    ...    (N-1)×4096
/// ```
///
/// # Thread Safety
/// `DiskManager` is single-threaded; callers (the buffer pool, the
/// tablespace manager) serialize access to it.
///
/// # Durability
/// Every `write` is followed by `sync_all()`. Metadata is persisted with
/// a write-temp-then-rename so a crash mid-save cannot corrupt the
/// previous durable metadata.
pub struct DiskManager {
    data_path: PathBuf,
    meta_path: PathBuf,
    file: File,
    metadata: PageMetadata,
    max_allocated_pages: u64,
}

impl DiskManager {
    /// Open the tablespace file at `data_path` (creating it and its
    /// `.meta.json` sidecar if absent), loading persisted allocation
    /// metadata.
    pub fn open_or_create<P: AsRef<Path>>(data_path: P) -> Result<Self> {
        let data_path = data_path.as_ref().to_path_buf();
        let meta_path = Self::meta_path_for(&data_path);

        if let Some(parent) = data_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::io(parent.display().to_string(), "create_dir_all", e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&data_path)
            .map_err(|e| Error::io(data_path.display().to_string(), "open", e))?;

        let metadata = Self::load_metadata(&meta_path)?;

        let mut manager = Self {
            data_path,
            meta_path,
            file,
            metadata,
            max_allocated_pages: DEFAULT_MAX_ALLOCATED_PAGES,
        };
        manager.save_metadata()?;
        Ok(manager)
    }

    /// Alias for [`DiskManager::open_or_create`], for callers that know
    /// the file shouldn't already exist.
    pub fn create<P: AsRef<Path>>(data_path: P) -> Result<Self> {
        Self::open_or_create(data_path)
    }

    /// Override the configured ceiling on allocated page count (default
    /// [`DEFAULT_MAX_ALLOCATED_PAGES`]).
    pub fn set_max_allocated_pages(&mut self, max: u64) {
        self.max_allocated_pages = max;
    }

    fn meta_path_for(data_path: &Path) -> PathBuf {
        let mut meta = data_path.to_path_buf();
        let file_name = meta
            .file_name()
            .map(|n| format!("{}.meta.json", n.to_string_lossy()))
            .unwrap_or_else(|| "tablespace.meta.json".to_string());
        meta.set_file_name(file_name);
        meta
    }

    fn load_metadata(meta_path: &Path) -> Result<PageMetadata> {
        if !meta_path.exists() {
            return Ok(PageMetadata::default());
        }

        let contents = fs::read_to_string(meta_path)
            .map_err(|e| Error::io(meta_path.display().to_string(), "read_metadata", e))?;

        match serde_json::from_str(&contents) {
            Ok(metadata) => Ok(metadata),
            Err(_) => {
                // Corrupt metadata: back up and reset to empty rather than fail open.
                let backup = meta_path.with_extension("meta.json.backup");
                let _ = fs::rename(meta_path, &backup);
                log::warn!(
                    "corrupt page metadata at {}, backed up to {} and reset",
                    meta_path.display(),
                    backup.display()
                );
                Ok(PageMetadata::default())
            }
        }
    }

    fn save_metadata(&mut self) -> Result<()> {
        self.metadata.last_modification = chrono::Utc::now();

        let tmp_path = self.meta_path.with_extension("meta.json.tmp");
        let json = serde_json::to_string_pretty(&self.metadata)
            .map_err(|e| Error::Corrupt(format!("failed to serialize page metadata: {e}")))?;

        fs::write(&tmp_path, json)
            .map_err(|e| Error::io(tmp_path.display().to_string(), "write_metadata_tmp", e))?;
        fs::rename(&tmp_path, &self.meta_path)
            .map_err(|e| Error::io(self.meta_path.display().to_string(), "rename_metadata", e))?;

        Ok(())
    }

    /// Allocate a new page id: reuse the smallest freed id if one
    /// exists, otherwise take the next never-used id.
    ///
    /// # Errors
    /// Fails if the allocated page count would exceed the configured
    /// maximum.
    pub fn allocate(&mut self) -> Result<PageId> {
        if self.metadata.allocated_pages.len() as u64 >= self.max_allocated_pages {
            return Err(Error::MaxPagesExceeded(self.max_allocated_pages));
        }

        let page_id = if let Some(&reused) = self.metadata.free_pages.iter().next() {
            self.metadata.free_pages.remove(&reused);
            reused
        } else {
            let id = self.metadata.next_page_id;
            self.metadata.next_page_id += 1;
            id
        };

        self.metadata.allocated_pages.insert(page_id);
        self.save_metadata()?;

        Ok(PageId::new(page_id))
    }

    /// Release a page id back to the free pool.
    ///
    /// # Errors
    /// Fails if `page_id` is not currently allocated.
    pub fn deallocate(&mut self, page_id: PageId) -> Result<()> {
        if !self.metadata.allocated_pages.remove(&page_id.0) {
            return Err(Error::PageNotAllocated(page_id.0));
        }

        self.metadata.free_pages.insert(page_id.0);
        self.save_metadata()
    }

    fn offset_of(page_id: PageId) -> Result<u64> {
        if page_id.0 == 0 || !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }
        Ok((page_id.0 as u64 - 1) * PAGE_SIZE as u64)
    }

    /// Read a page's bytes. Reading an unallocated (but otherwise valid)
    /// id is permitted and returns a zeroed page; short reads near
    /// end-of-file are zero-padded rather than treated as errors.
    pub fn read(&mut self, page_id: PageId) -> Result<Page> {
        let offset = Self::offset_of(page_id)?;

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| self.io_err("seek_read", e))?;

        let mut page = Page::new();
        let mut buf = [0u8; PAGE_SIZE];
        let mut total_read = 0usize;
        loop {
            match self.file.read(&mut buf[total_read..]) {
                Ok(0) => break,
                Ok(n) => total_read += n,
                Err(e) => return Err(self.io_err("read", e)),
            }
            if total_read == PAGE_SIZE {
                break;
            }
        }
        page.as_mut_slice().copy_from_slice(&buf);
        Ok(page)
    }

    /// Write a page's bytes at the computed offset, extending the file
    /// if necessary, then force the write durable with `fsync`.
    pub fn write(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        let offset = Self::offset_of(page_id)?;

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| self.io_err("seek_write", e))?;
        self.file
            .write_all(page.as_slice())
            .map_err(|e| self.io_err("write", e))?;
        self.file.sync_all().map_err(|e| self.io_err("fsync", e))?;

        Ok(())
    }

    fn io_err(&self, operation: &'static str, source: std::io::Error) -> Error {
        Error::io(self.data_path.display().to_string(), operation, source)
    }

    /// Number of pages currently allocated.
    pub fn allocated_count(&self) -> usize {
        self.metadata.allocated_pages.len()
    }

    /// Whether `page_id` is currently allocated.
    pub fn is_allocated(&self, page_id: PageId) -> bool {
        self.metadata.allocated_pages.contains(&page_id.0)
    }

    /// Path to the backing data file.
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_or_create_fresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("default.db");

        let dm = DiskManager::open_or_create(&path).unwrap();
        assert_eq!(dm.allocated_count(), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_allocate_starts_at_one() {
        let dir = tempdir().unwrap();
        let mut dm = DiskManager::open_or_create(dir.path().join("default.db")).unwrap();

        let page_id = dm.allocate().unwrap();
        assert_eq!(page_id, PageId::new(1));
        assert!(dm.is_allocated(page_id));
    }

    #[test]
    fn test_allocate_reuses_smallest_freed_id() {
        let dir = tempdir().unwrap();
        let mut dm = DiskManager::open_or_create(dir.path().join("default.db")).unwrap();

        let p1 = dm.allocate().unwrap();
        let p2 = dm.allocate().unwrap();
        let _p3 = dm.allocate().unwrap();

        dm.deallocate(p2).unwrap();
        dm.deallocate(p1).unwrap();

        // Smallest freed id (p1) is reused first, not insertion order.
        let reused = dm.allocate().unwrap();
        assert_eq!(reused, p1);
    }

    #[test]
    fn test_deallocate_unallocated_fails() {
        let dir = tempdir().unwrap();
        let mut dm = DiskManager::open_or_create(dir.path().join("default.db")).unwrap();
        assert!(dm.deallocate(PageId::new(1)).is_err());
    }

    #[test]
    fn test_read_unallocated_returns_zeroes() {
        let dir = tempdir().unwrap();
        let mut dm = DiskManager::open_or_create(dir.path().join("default.db")).unwrap();

        let page = dm.read(PageId::new(5)).unwrap();
        assert!(page.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let dir = tempdir().unwrap();
        let mut dm = DiskManager::open_or_create(dir.path().join("default.db")).unwrap();

        let page_id = dm.allocate().unwrap();
        let mut page = Page::new();
        page.as_mut_slice()[0] = 0xAB;
        page.as_mut_slice()[4095] = 0xEF;
        dm.write(page_id, &page).unwrap();

        let read_back = dm.read(page_id).unwrap();
        assert_eq!(read_back.as_slice()[0], 0xAB);
        assert_eq!(read_back.as_slice()[4095], 0xEF);
    }

    #[test]
    fn test_metadata_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("default.db");

        {
            let mut dm = DiskManager::open_or_create(&path).unwrap();
            dm.allocate().unwrap();
            dm.allocate().unwrap();
        }

        {
            let mut dm = DiskManager::open_or_create(&path).unwrap();
            assert_eq!(dm.allocated_count(), 2);
            let next = dm.allocate().unwrap();
            assert_eq!(next, PageId::new(3));
        }
    }

    #[test]
    fn test_invalid_page_id_zero_rejected() {
        let dir = tempdir().unwrap();
        let mut dm = DiskManager::open_or_create(dir.path().join("default.db")).unwrap();
        assert!(dm.read(PageId::new(0)).is_err());
    }

    #[test]
    fn test_allocation_ceiling_enforced() {
        let dir = tempdir().unwrap();
        let mut dm = DiskManager::open_or_create(dir.path().join("default.db")).unwrap();
        dm.set_max_allocated_pages(2);

        dm.allocate().unwrap();
        dm.allocate().unwrap();
        assert!(dm.allocate().is_err());
    }

    #[test]
    fn test_corrupt_metadata_backed_up_and_reset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("default.db");
        let meta_path = DiskManager::meta_path_for(&path);

        fs::write(&meta_path, "{ not json").unwrap();
        let dm = DiskManager::open_or_create(&path).unwrap();

        assert_eq!(dm.allocated_count(), 0);
        assert!(meta_path.with_extension("meta.json.backup").exists());
    }
}
