//! Page - the fundamental 4KB unit of storage, in slotted layout.
//!
//! A [`Page`] is a raw 4KB byte array: a 16-byte [`PageHeader`], followed
//! by a slot directory (4 bytes per live record, growing upward from the
//! header), followed by record payloads packed downward from the end of
//! the page. Pages are stored in `Frame`s within the buffer pool.

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, Result};

use super::page_header::PageHeader;
use super::slot::Slot;

/// Summary statistics about a page's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub record_count: u16,
    pub free_space_start: u16,
    pub next_page_id: u32,
    pub free_bytes: usize,
    pub used_bytes: usize,
}

/// A page of data (4KB, 4KB-aligned).
///
/// This is the fundamental unit of I/O between disk and memory. The
/// buffer pool manages these in frames.
///
/// # Clone Implementation
/// `Page` does NOT implement `Clone` in production code to match
/// production database behavior (copying 4KB is expensive and should be
/// explicit). A `#[cfg(test)]` Clone is provided for tests; production
/// code uses `Page::snapshot`/`Page::restore` for undo-log before-images.
///
/// # Example
/// ```
/// use interchangedb::storage::page::Page;
///
/// let mut page = Page::create_empty_page();
/// assert!(page.add_data_to_page(b"hello").unwrap());
/// assert_eq!(page.get_data_blocks_from_page(), vec![b"hello".to_vec()]);
/// ```
#[repr(align(4096))]
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Page {
    /// Create a new zeroed page with no header written. Prefer
    /// [`Page::create_empty_page`] for a page ready to receive records.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0u8; PAGE_SIZE],
        }
    }

    /// Create an empty, canonical slotted page: zeroed body, header
    /// initialized with `record_count = 0` and `free_space_start =
    /// PAGE_SIZE`.
    pub fn create_empty_page() -> Self {
        let mut page = Self::new();
        page.set_header(&PageHeader::new_empty(PAGE_SIZE));
        page
    }

    /// Get immutable slice of page data.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Get mutable slice of page data.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Zero out the entire page.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// Get the size of a page.
    #[inline]
    pub const fn size() -> usize {
        PAGE_SIZE
    }

    /// Read the page header.
    pub fn header(&self) -> PageHeader {
        PageHeader::from_bytes(&self.data)
    }

    /// Write a page header.
    pub fn set_header(&mut self, header: &PageHeader) {
        header.write_to(&mut self.data);
    }

    /// Copy this page's bytes into an owned buffer (for undo-log
    /// before-images).
    pub fn snapshot(&self) -> Box<[u8; PAGE_SIZE]> {
        Box::new(self.data)
    }

    /// Overwrite this page's bytes from a previously captured snapshot.
    pub fn restore(&mut self, snapshot: &[u8; PAGE_SIZE]) {
        self.data.copy_from_slice(snapshot);
    }

    fn slot_offset(index: u16) -> usize {
        PageHeader::SIZE + (index as usize) * Slot::SIZE
    }

    fn read_slot(&self, index: u16) -> Slot {
        let off = Self::slot_offset(index);
        Slot::from_bytes(&self.data[off..off + Slot::SIZE])
    }

    fn write_slot(&mut self, index: u16, slot: Slot) {
        let off = Self::slot_offset(index);
        slot.write_to(&mut self.data[off..off + Slot::SIZE]);
    }

    /// Upper boundary (exclusive) of the record payload at slot
    /// `index`: `PAGE_SIZE` for the first-inserted slot, else the
    /// previous slot's offset.
    fn upper_bound(&self, index: u16) -> usize {
        if index == 0 {
            PAGE_SIZE
        } else {
            self.read_slot(index - 1).offset as usize
        }
    }

    /// Append a record payload to the page, growing the slot directory
    /// by one entry.
    ///
    /// Returns `Ok(true)` if the record was added, `Ok(false)` if there
    /// is not enough free space (the page is left unmodified).
    pub fn add_data_to_page(&mut self, bytes: &[u8]) -> Result<bool> {
        let header = self.header();
        let new_record_count = header
            .record_count
            .checked_add(1)
            .ok_or_else(|| Error::Corrupt("page slot directory overflow".to_string()))?;

        let slot_dir_end = PageHeader::SIZE + (new_record_count as usize) * Slot::SIZE;
        let new_free_space_start = (header.free_space_start as usize).saturating_sub(bytes.len());

        if new_free_space_start < slot_dir_end {
            return Ok(false);
        }

        self.data[new_free_space_start..header.free_space_start as usize].copy_from_slice(bytes);
        self.write_slot(header.record_count, Slot::new(new_free_space_start as u32));

        self.set_header(&PageHeader {
            record_count: new_record_count,
            free_space_start: new_free_space_start as u16,
            next_page_id: header.next_page_id,
        });

        Ok(true)
    }

    /// Extract every live record payload, in insertion order.
    pub fn get_data_blocks_from_page(&self) -> Vec<Vec<u8>> {
        let header = self.header();
        (0..header.record_count)
            .map(|i| {
                let slot = self.read_slot(i);
                let upper = self.upper_bound(i);
                self.data[slot.offset as usize..upper].to_vec()
            })
            .collect()
    }

    /// Remove the record at `idx` (0-based, insertion order) and repack
    /// the page into canonical (compact) form.
    ///
    /// Returns `Ok(false)` if `idx` is out of range.
    pub fn remove_data_from_page(&mut self, idx: usize) -> Result<bool> {
        let mut blocks = self.get_data_blocks_from_page();
        if idx >= blocks.len() {
            return Ok(false);
        }
        blocks.remove(idx);

        let next_page_id = self.header().next_page_id;
        let mut rebuilt = Page::create_empty_page();
        for block in &blocks {
            // Space already fit before removal, so this cannot fail.
            rebuilt.add_data_to_page(block)?;
        }
        let mut rebuilt_header = rebuilt.header();
        rebuilt_header.next_page_id = next_page_id;
        rebuilt.set_header(&rebuilt_header);

        self.data = rebuilt.data;
        Ok(true)
    }

    /// Overwrite the record payload at slot `idx` in place, without
    /// moving any other slot's offset (unlike `remove_data_from_page`,
    /// this never repacks the page). `bytes` must fit within the slot's
    /// existing capacity; callers with a fixed-width schema always
    /// produce payloads of exactly that width, so this never fails in
    /// practice for in-place updates or tombstoning.
    ///
    /// Returns `Ok(false)` if `idx` is out of range.
    pub fn overwrite_slot(&mut self, idx: usize, bytes: &[u8]) -> Result<bool> {
        let header = self.header();
        if idx >= header.record_count as usize {
            return Ok(false);
        }
        let slot = self.read_slot(idx as u16);
        let upper = self.upper_bound(idx as u16);
        let capacity = upper - slot.offset as usize;

        if bytes.len() > capacity {
            return Err(Error::Corrupt(format!(
                "overwrite of slot {idx} ({} bytes) exceeds its {capacity}-byte capacity",
                bytes.len()
            )));
        }

        let region = &mut self.data[slot.offset as usize..upper];
        region.fill(0);
        region[..bytes.len()].copy_from_slice(bytes);
        Ok(true)
    }

    /// Snapshot of record count, free space boundaries, and byte
    /// utilization.
    pub fn get_page_info(&self) -> PageInfo {
        let header = self.header();
        let free_bytes = header.free_space(PAGE_SIZE);
        let used_bytes = PAGE_SIZE - free_bytes;
        PageInfo {
            record_count: header.record_count,
            free_space_start: header.free_space_start,
            next_page_id: header.next_page_id,
            free_bytes,
            used_bytes,
        }
    }

    /// Fraction of the page (excluding the fixed header) currently
    /// occupied by slot directory entries and record payloads, in
    /// `[0.0, 1.0]`.
    pub fn get_page_utilization(&self) -> f64 {
        let info = self.get_page_info();
        let capacity = (PAGE_SIZE - PageHeader::SIZE) as f64;
        let occupied = info.used_bytes.saturating_sub(PageHeader::SIZE);
        if capacity == 0.0 {
            0.0
        } else {
            occupied as f64 / capacity
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

// Clone only available in tests - forces explicit copying in production
#[cfg(test)]
impl Clone for Page {
    fn clone(&self) -> Self {
        let mut new_page = Page::new();
        new_page.data.copy_from_slice(&self.data);
        new_page
    }
}
