//! Slotted page header layout.

/// Metadata stored at the beginning of every page.
///
/// # Layout (16 bytes)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       2     record_count      (u16, little-endian)
/// 2       2     free_space_start  (u16, little-endian; offset of the
///                                  downward-growing record area's high
///                                  watermark, i.e. where the next
///                                  record payload would be written)
/// 4       4     next_page_id      (u32, little-endian; page-level
///                                  overflow/chain pointer, NO_NEXT_PAGE
///                                  sentinel when unused)
/// 8       8     reserved          (zeroed, reserved for future use)
/// ```
///
/// Unlike a page-level checksum, no CRC is stored here: corruption
/// detection via CRC applies only to WAL log records
/// (`wal::record::LogRecord`), not to data pages.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    /// Number of live slots in the slot directory.
    pub record_count: u16,
    /// Offset (from the start of the page) of the highest byte occupied
    /// by record payload data; free space lies between the end of the
    /// slot directory and this offset.
    pub free_space_start: u16,
    /// Overflow chain pointer; `NO_NEXT_PAGE` when this page has no
    /// successor.
    pub next_page_id: u32,
}

impl PageHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 16;

    pub const OFFSET_RECORD_COUNT: usize = 0;
    pub const OFFSET_FREE_SPACE_START: usize = 2;
    pub const OFFSET_NEXT_PAGE_ID: usize = 4;
    pub const OFFSET_RESERVED: usize = 8;

    /// Sentinel for "no next page".
    pub const NO_NEXT_PAGE: u32 = u32::MAX;

    /// Create a fresh header for an empty page. `free_space_start` is
    /// initialized to the full page size, since the record area is
    /// empty and grows downward from the end of the page.
    pub fn new_empty(page_size: usize) -> Self {
        Self {
            record_count: 0,
            free_space_start: page_size as u16,
            next_page_id: Self::NO_NEXT_PAGE,
        }
    }

    /// Read a header from the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < PageHeader::SIZE`.
    pub fn from_bytes(data: &[u8]) -> Self {
        assert!(data.len() >= Self::SIZE, "buffer too small for PageHeader");

        let record_count = u16::from_le_bytes([
            data[Self::OFFSET_RECORD_COUNT],
            data[Self::OFFSET_RECORD_COUNT + 1],
        ]);

        let free_space_start = u16::from_le_bytes([
            data[Self::OFFSET_FREE_SPACE_START],
            data[Self::OFFSET_FREE_SPACE_START + 1],
        ]);

        let next_page_id = u32::from_le_bytes([
            data[Self::OFFSET_NEXT_PAGE_ID],
            data[Self::OFFSET_NEXT_PAGE_ID + 1],
            data[Self::OFFSET_NEXT_PAGE_ID + 2],
            data[Self::OFFSET_NEXT_PAGE_ID + 3],
        ]);

        Self {
            record_count,
            free_space_start,
            next_page_id,
        }
    }

    /// Write this header to the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < PageHeader::SIZE`.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for PageHeader");

        data[Self::OFFSET_RECORD_COUNT..Self::OFFSET_RECORD_COUNT + 2]
            .copy_from_slice(&self.record_count.to_le_bytes());
        data[Self::OFFSET_FREE_SPACE_START..Self::OFFSET_FREE_SPACE_START + 2]
            .copy_from_slice(&self.free_space_start.to_le_bytes());
        data[Self::OFFSET_NEXT_PAGE_ID..Self::OFFSET_NEXT_PAGE_ID + 4]
            .copy_from_slice(&self.next_page_id.to_le_bytes());
        data[Self::OFFSET_RESERVED..Self::OFFSET_RESERVED + 8].fill(0);
    }

    /// Whether this page chains to a successor.
    #[inline]
    pub fn has_next_page(&self) -> bool {
        self.next_page_id != Self::NO_NEXT_PAGE
    }

    /// Bytes available between the end of the slot directory and the
    /// start of the record area.
    pub fn free_space(&self, page_size: usize) -> usize {
        let slot_dir_end = Self::SIZE + (self.record_count as usize) * super::Slot::SIZE;
        (self.free_space_start as usize).saturating_sub(slot_dir_end)
    }
}
