//! Extent Manager: an advisory, heuristic page-grouping layer above the
//! Page Manager.

use std::collections::{HashMap, HashSet};

use crate::common::config::DEFAULT_EXTENT_SIZE;
use crate::common::PageId;

use super::disk_manager::DiskManager;

/// Table-name substrings that, per the allocation heuristic, justify
/// eagerly creating a dedicated extent.
const LARGE_TABLE_HINTS: &[&str] = &["large", "big", "user", "log", "data", "main"];

/// Metadata for one extent: a named range of up to
/// [`DEFAULT_EXTENT_SIZE`] pages assigned to a single table and
/// tablespace.
#[derive(Debug, Clone)]
pub struct ExtentMeta {
    pub extent_id: u32,
    pub start_page: u32,
    pub size: usize,
    pub allocated_pages: HashSet<u32>,
    pub tablespace: String,
    pub table_name: String,
}

impl ExtentMeta {
    fn is_full(&self) -> bool {
        self.allocated_pages.len() >= self.size
    }

    fn is_empty(&self) -> bool {
        self.allocated_pages.is_empty()
    }
}

/// Routes page allocation requests either directly to the
/// [`DiskManager`] or through a per-table extent, based on a simple
/// heuristic. Extents are advisory: they group pages for locality, they
/// do not own the pages durably (the Page Manager does).
pub struct ExtentManager {
    extent_size: usize,
    extents: HashMap<u32, ExtentMeta>,
    page_to_extent: HashMap<u32, u32>,
    next_extent_id: u32,
}

impl ExtentManager {
    pub fn new() -> Self {
        Self {
            extent_size: DEFAULT_EXTENT_SIZE,
            extents: HashMap::new(),
            page_to_extent: HashMap::new(),
            next_extent_id: 1,
        }
    }

    fn should_create_new_extent(&self, table_name: &str) -> bool {
        if self.extents.is_empty() {
            return true;
        }
        let lower = table_name.to_lowercase();
        LARGE_TABLE_HINTS.iter().any(|hint| lower.contains(hint))
    }

    fn try_allocate_from_existing_extent(
        &mut self,
        table_name: &str,
        tablespace: &str,
    ) -> Option<PageId> {
        let extent_id = self.extents.iter().find_map(|(id, extent)| {
            if extent.table_name == table_name && extent.tablespace == tablespace && !extent.is_full() {
                Some(*id)
            } else {
                None
            }
        })?;

        let extent = self.extents.get_mut(&extent_id)?;
        let page_id = (0..extent.size as u32)
            .map(|offset| extent.start_page + offset)
            .find(|id| !extent.allocated_pages.contains(id))?;

        extent.allocated_pages.insert(page_id);
        self.page_to_extent.insert(page_id, extent_id);
        Some(PageId::new(page_id))
    }

    /// Allocate a page, routing through an extent when the heuristic
    /// justifies it.
    ///
    /// 1. `table_name == "unknown"` delegates straight to the Page
    ///    Manager.
    /// 2. Otherwise, an existing extent for this table/tablespace with
    ///    free slots is used.
    /// 3. Otherwise, if a new extent is warranted (none exist yet, or
    ///    the table name hints at a large table), one is created seeded
    ///    with a freshly allocated page.
    /// 4. Otherwise, delegates to the Page Manager directly.
    pub fn allocate_page_smart(
        &mut self,
        disk_manager: &mut DiskManager,
        table_name: &str,
        tablespace: &str,
    ) -> crate::common::Result<PageId> {
        if table_name == "unknown" {
            return disk_manager.allocate();
        }

        if let Some(page_id) = self.try_allocate_from_existing_extent(table_name, tablespace) {
            return Ok(page_id);
        }

        if self.should_create_new_extent(table_name) {
            let seed_page = disk_manager.allocate()?;
            let extent_id = self.next_extent_id;
            self.next_extent_id += 1;

            let mut allocated_pages = HashSet::new();
            allocated_pages.insert(seed_page.0);

            self.extents.insert(
                extent_id,
                ExtentMeta {
                    extent_id,
                    start_page: seed_page.0,
                    size: self.extent_size,
                    allocated_pages,
                    tablespace: tablespace.to_string(),
                    table_name: table_name.to_string(),
                },
            );
            self.page_to_extent.insert(seed_page.0, extent_id);

            return Ok(seed_page);
        }

        disk_manager.allocate()
    }

    /// Deallocate a page, removing it from its extent (recycling the
    /// extent if it becomes empty) before delegating the final
    /// deallocation to the Page Manager.
    pub fn deallocate_page_smart(
        &mut self,
        disk_manager: &mut DiskManager,
        page_id: PageId,
    ) -> crate::common::Result<()> {
        if let Some(extent_id) = self.page_to_extent.remove(&page_id.0) {
            if let Some(extent) = self.extents.get_mut(&extent_id) {
                extent.allocated_pages.remove(&page_id.0);
                if extent.is_empty() {
                    self.extents.remove(&extent_id);
                }
            }
        }

        disk_manager.deallocate(page_id)
    }

    pub fn extent_count(&self) -> usize {
        self.extents.len()
    }

    pub fn extent_for_page(&self, page_id: PageId) -> Option<&ExtentMeta> {
        self.page_to_extent
            .get(&page_id.0)
            .and_then(|id| self.extents.get(id))
    }
}

impl Default for ExtentManager {
    fn default() -> Self {
        Self::new()
    }
}
