//! Configuration constants for InterchangeDB.

/// Size of a page in bytes (4KB).
///
/// This value is chosen to match:
/// - OS page size on most systems (4096 bytes)
/// - Common database page sizes (PostgreSQL uses 8KB, but 4KB is also standard)
/// - BusTub's page size
///
/// # Memory Layout
/// With 4KB pages and 32-bit PageIds:
/// - Max pages: 2^32 = 4,294,967,296 pages
/// - Max database size: 4,294,967,296 × 4KB = 16TB
pub const PAGE_SIZE: usize = 4096;

/// Maximum number of pages with u32 PageId.
pub const MAX_PAGES: u64 = (u32::MAX as u64) + 1;

/// Maximum theoretical database size in bytes.
pub const MAX_DB_SIZE_BYTES: u64 = MAX_PAGES * PAGE_SIZE as u64;

/// Default configured ceiling on allocated pages per tablespace.
///
/// Far below `MAX_PAGES`; exists so `PageManager::allocate` has a
/// concrete "max-pages exceeded" failure mode to test against without
/// actually filling a 16TB file.
pub const DEFAULT_MAX_ALLOCATED_PAGES: u64 = 1_000_000;

/// Default number of pages grouped into one extent.
pub const DEFAULT_EXTENT_SIZE: usize = 64;

/// Lower bound on buffer pool capacity, in pages.
pub const MIN_BUFFER_POOL_SIZE: usize = 10;

/// Upper bound on buffer pool capacity, in pages.
pub const MAX_BUFFER_POOL_SIZE: usize = 1000;

/// Sliding window length for the adaptive replacer's access-pattern analyzer.
pub const ADAPTIVE_ANALYSIS_INTERVAL: usize = 100;

/// `repeat_rate` above which the adaptive replacer recommends LRU.
pub const REPEAT_ACCESS_THRESHOLD: f64 = 0.6;

/// `sequential_rate` above which the adaptive replacer recommends FIFO.
pub const SEQUENTIAL_ACCESS_THRESHOLD: f64 = 0.7;

/// Minimum time between adaptive strategy switches.
///
/// Not specified numerically by the spec; chosen in the style of its
/// own "e.g., 100" placeholder for `ADAPTIVE_ANALYSIS_INTERVAL`.
pub const MIN_SWITCH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// Number of consecutive identical recommendations required before the
/// adaptive replacer commits to a strategy switch.
pub const DECISION_THRESHOLD: usize = 3;

/// Default page-level lock acquisition timeout.
pub const DEFAULT_LOCK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Default WAL log file rotation size (16 MiB).
pub const DEFAULT_WAL_FILE_SIZE_LIMIT: u64 = 16 * 1024 * 1024;

/// Default WAL writer batch size, in bytes, before a forced flush.
pub const DEFAULT_WAL_BATCH_SIZE: usize = 64 * 1024;

/// Number of page versions retained per page for MVCC snapshot reads.
pub const MAX_PAGE_VERSIONS: usize = 10;

/// Minimum auto-flush interval for the storage manager's background
/// flush timer. `0` disables auto-flush entirely.
pub const MIN_AUTO_FLUSH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

/// Maximum length of a table or column identifier.
pub const MAX_IDENTIFIER_LEN: usize = 64;
