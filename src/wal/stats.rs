//! WAL metrics, persisted to `wal_stats.json` (§6).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic counters tracked across the lifetime of a [`super::WalManager`].
#[derive(Debug, Default)]
pub struct WalStats {
    pub records_written: AtomicU64,
    pub bytes_written: AtomicU64,
    pub flushes: AtomicU64,
    pub rotations: AtomicU64,
    pub records_read: AtomicU64,
    pub corrupt_records_skipped: AtomicU64,
    pub checkpoints: AtomicU64,
}

impl WalStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> WalStatsSnapshot {
        WalStatsSnapshot {
            records_written: self.records_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            records_read: self.records_read.load(Ordering::Relaxed),
            corrupt_records_skipped: self.corrupt_records_skipped.load(Ordering::Relaxed),
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
        }
    }
}

/// Non-atomic point-in-time copy of [`WalStats`], serializable to
/// `wal_stats.json`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WalStatsSnapshot {
    pub records_written: u64,
    pub bytes_written: u64,
    pub flushes: u64,
    pub rotations: u64,
    pub records_read: u64,
    pub corrupt_records_skipped: u64,
    pub checkpoints: u64,
}
