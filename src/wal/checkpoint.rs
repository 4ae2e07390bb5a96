//! Checkpoint manager: periodic BEGIN/snapshot/END checkpoints plus log
//! file cleanup (§4.6).

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};

use super::record::{now_timestamp, LogRecordType};
use super::writer::LogWriter;

/// Checkpoint before a record-count threshold is hit, absent any other
/// trigger.
const DEFAULT_CHECKPOINT_INTERVAL: u32 = 1000;

/// Checkpoint before this much time elapses, absent any other trigger.
const DEFAULT_CHECKPOINT_TIMEOUT: Duration = Duration::from_secs(300);

/// Persisted, recovery-facing description of one checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub checkpoint_lsn: u32,
    pub checkpoint_time: f64,
    pub start_lsn: u32,
    pub end_lsn: u32,
    /// page_id -> LSN of the earliest still-unflushed write to that page.
    pub dirty_pages: HashMap<u32, u32>,
    pub active_transactions: Vec<u32>,
    pub file_number: u32,
    pub file_offset: u64,
}

/// Tracks dirty-page and active-transaction bookkeeping between
/// checkpoints and drives checkpoint creation.
pub struct CheckpointManager {
    path: PathBuf,
    checkpoint_interval: u32,
    checkpoint_timeout: Duration,
    last_checkpoint_at: Instant,
    records_since_checkpoint: u32,
    checkpoint_count: u32,
    active_transactions: HashSet<u32>,
    dirty_pages: HashMap<u32, u32>,
    last_checkpoint: Option<CheckpointMetadata>,
}

impl CheckpointManager {
    pub fn new(wal_dir: impl AsRef<Path>) -> Result<Self> {
        let path = wal_dir.as_ref().join("checkpoint.json");
        let last_checkpoint = Self::load(&path)?;

        Ok(Self {
            path,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            checkpoint_timeout: DEFAULT_CHECKPOINT_TIMEOUT,
            last_checkpoint_at: Instant::now(),
            records_since_checkpoint: 0,
            checkpoint_count: 0,
            active_transactions: HashSet::new(),
            dirty_pages: HashMap::new(),
            last_checkpoint,
        })
    }

    fn load(path: &Path) -> Result<Option<CheckpointMetadata>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::io(path.display().to_string(), "read_checkpoint", e))?;
        match serde_json::from_str(&contents) {
            Ok(meta) => Ok(Some(meta)),
            Err(_) => {
                log::warn!("corrupt checkpoint.json at {}, ignoring", path.display());
                Ok(None)
            }
        }
    }

    fn save(&self, meta: &CheckpointMetadata) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(meta)
            .map_err(|e| Error::Corrupt(format!("failed to serialize checkpoint: {e}")))?;
        fs::write(&tmp, json).map_err(|e| Error::io(tmp.display().to_string(), "write_checkpoint_tmp", e))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| Error::io(self.path.display().to_string(), "rename_checkpoint", e))
    }

    pub fn set_checkpoint_interval(&mut self, interval: u32) {
        self.checkpoint_interval = interval;
    }

    pub fn set_checkpoint_timeout(&mut self, timeout: Duration) {
        self.checkpoint_timeout = timeout;
    }

    /// Record that `page_id` was modified by a write at `lsn`; only the
    /// first (earliest) LSN per page is retained, matching the Analyze
    /// phase's redo-from point.
    pub fn record_write(&mut self, page_id: u32, lsn: u32) {
        self.dirty_pages.entry(page_id).or_insert(lsn);
        self.records_since_checkpoint += 1;
    }

    pub fn begin_transaction(&mut self, txn_id: u32) {
        self.active_transactions.insert(txn_id);
    }

    pub fn end_transaction(&mut self, txn_id: u32) {
        self.active_transactions.remove(&txn_id);
    }

    fn should_checkpoint(&self) -> bool {
        self.records_since_checkpoint >= self.checkpoint_interval
            || self.last_checkpoint_at.elapsed() >= self.checkpoint_timeout
    }

    /// Create a checkpoint if `force` is set or a trigger threshold has
    /// been crossed; otherwise a no-op.
    ///
    /// Callers must flush all dirty buffer pool pages to disk before
    /// calling this (checkpoints describe durable state): the snapshot's
    /// `dirty_pages` map is cleared afterward on the assumption that it
    /// is.
    pub fn maybe_checkpoint(
        &mut self,
        force: bool,
        writer: &mut LogWriter,
    ) -> Result<Option<CheckpointMetadata>> {
        if !force && !self.should_checkpoint() {
            return Ok(None);
        }

        let start_lsn = writer.append(LogRecordType::CheckpointBegin, 0, 0, Vec::new(), None)?;

        let dirty_pages = self.dirty_pages.clone();
        let active_transactions: Vec<u32> = self.active_transactions.iter().copied().collect();

        let end_lsn = writer.append(LogRecordType::CheckpointEnd, 0, 0, Vec::new(), None)?;
        let (file_number, file_offset) = writer.get_current_position();

        let meta = CheckpointMetadata {
            checkpoint_lsn: end_lsn,
            checkpoint_time: now_timestamp(),
            start_lsn,
            end_lsn,
            dirty_pages,
            active_transactions,
            file_number,
            file_offset,
        };
        self.save(&meta)?;

        self.dirty_pages.clear();
        self.records_since_checkpoint = 0;
        self.last_checkpoint_at = Instant::now();
        self.checkpoint_count += 1;
        self.last_checkpoint = Some(meta.clone());

        if self.checkpoint_count % 10 == 0 {
            self.cleanup_old_logs(writer)?;
        }

        Ok(Some(meta))
    }

    /// Remove log files whose file number is more than one checkpoint
    /// file behind the latest checkpoint's.
    fn cleanup_old_logs(&self, writer: &LogWriter) -> Result<()> {
        let Some(last) = &self.last_checkpoint else {
            return Ok(());
        };
        if last.file_number < 3 {
            return Ok(());
        }
        let threshold = last.file_number - 2;
        let dir = writer.dir_path();

        for entry in fs::read_dir(dir).map_err(|e| Error::io(dir.display().to_string(), "read_dir", e))? {
            let entry = entry.map_err(|e| Error::io(dir.display().to_string(), "read_dir_entry", e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(rest) = name.strip_prefix("wal_").and_then(|s| s.strip_suffix(".log")) {
                if let Ok(n) = rest.parse::<u32>() {
                    if n < threshold {
                        let _ = fs::remove_file(entry.path());
                    }
                }
            }
        }
        Ok(())
    }

    pub fn get_recovery_info(&self) -> Option<&CheckpointMetadata> {
        self.last_checkpoint.as_ref()
    }

    pub fn checkpoint_count(&self) -> u32 {
        self.checkpoint_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::stats::WalStats;
    use crate::wal::writer::SyncMode;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_checkpoint_roundtrip() {
        let dir = tempdir().unwrap();
        let mut writer = LogWriter::new(dir.path(), SyncMode::Flush, Arc::new(WalStats::new())).unwrap();
        let mut cm = CheckpointManager::new(dir.path()).unwrap();

        cm.record_write(1, 0);
        cm.begin_transaction(7);

        let meta = cm.maybe_checkpoint(true, &mut writer).unwrap().unwrap();
        assert_eq!(meta.active_transactions, vec![7]);
        assert_eq!(meta.dirty_pages.get(&1), Some(&0));

        let reopened = CheckpointManager::new(dir.path()).unwrap();
        let recovered = reopened.get_recovery_info().unwrap();
        assert_eq!(recovered.checkpoint_lsn, meta.checkpoint_lsn);
    }

    #[test]
    fn test_no_checkpoint_without_trigger() {
        let dir = tempdir().unwrap();
        let mut writer = LogWriter::new(dir.path(), SyncMode::Flush, Arc::new(WalStats::new())).unwrap();
        let mut cm = CheckpointManager::new(dir.path()).unwrap();

        cm.record_write(1, 0);
        assert!(cm.maybe_checkpoint(false, &mut writer).unwrap().is_none());
    }

    #[test]
    fn test_dirty_pages_cleared_after_checkpoint() {
        let dir = tempdir().unwrap();
        let mut writer = LogWriter::new(dir.path(), SyncMode::Flush, Arc::new(WalStats::new())).unwrap();
        let mut cm = CheckpointManager::new(dir.path()).unwrap();

        cm.record_write(1, 0);
        cm.maybe_checkpoint(true, &mut writer).unwrap();
        assert!(cm.dirty_pages.is_empty());
    }
}
