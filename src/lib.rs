//! InterchangeDB - a single-node relational database engine with a
//! runtime-swappable buffer pool eviction policy.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         InterchangeDB                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Query Layer (execution/)                    │   │
//! │  │   Statement AST → Plan Builder → Operator Tree            │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │        Storage Manager Facade (storage_manager.rs)        │   │
//! │  │   Catalog + TableStorageCatalog + TableAccess impl        │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Transaction Layer (concurrency/)               │   │
//! │  │      TransactionManager + MVCC + Two-Phase Locking       │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │       Buffer Pool (buffer/)  [Runtime Swappable]        │   │
//! │  │   ┌─────────────────────────────────────────────────┐   │   │
//! │  │   │  Eviction Policies: LRU | FIFO | Adaptive        │   │   │
//! │  │   │            (hot-swappable at runtime)             │   │   │
//! │  │   └─────────────────────────────────────────────────┘   │   │
//! │  │      BufferPoolManager + Frame + Statistics              │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Storage Layer (storage/)                       │   │
//! │  │     DiskManager + Page + Tablespaces + Extents           │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↕                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │        Write-Ahead Log (wal/)  [ARIES-lite recovery]      │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, FrameId, Error, config)
//! - [`buffer`] - Buffer pool management and eviction policies
//! - [`storage`] - Disk I/O, page formats, tablespaces, extents
//! - [`wal`] - Write-ahead logging and crash recovery
//! - [`concurrency`] - Transaction management, MVCC, locking
//! - [`catalog`] - Table/column/index metadata
//! - [`execution`] - Statement AST, expression evaluation, plan building,
//!   physical operators
//! - [`storage_manager`] - The facade tying the above together; the
//!   stable embedding surface a REPL or network front end would sit on
//!   top of. No such front end ships in this crate.
//!
//! # Quick Start
//! ```no_run
//! use interchangedb::storage::DiskManager;
//! use interchangedb::common::PageId;
//!
//! // Create a new database file
//! let mut dm = DiskManager::create("my_database.db").unwrap();
//!
//! // Allocate and write a page
//! let page_id = dm.allocate().unwrap();
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod concurrency;
pub mod execution;
pub mod storage;
pub mod storage_manager;
pub mod wal;

// Re-export commonly used items at crate root for convenience
pub use common::config::PAGE_SIZE;
pub use common::{Error, FrameId, PageId, Result};

pub use buffer::{BufferPoolManager, BufferPoolStats, Frame, StatsSnapshot};
pub use storage::page::{Page, PageHeader};
pub use storage::DiskManager;
pub use storage_manager::StorageManager;
