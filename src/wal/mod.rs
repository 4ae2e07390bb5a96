//! Write-ahead log subsystem: durable, recoverable logging of page writes
//! and transaction/checkpoint boundaries (§4.6).

mod checkpoint;
mod reader;
mod record;
mod recovery;
mod stats;
mod writer;

pub use checkpoint::{CheckpointManager, CheckpointMetadata};
pub use reader::LogReader;
pub use record::{LogRecord, LogRecordType};
pub use recovery::{RecoveryManager, RecoveryStats, UndoOutcome};
pub use stats::{WalStats, WalStatsSnapshot};
pub use writer::{LogWriter, SyncMode};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::Result;

/// Facade composing the writer, checkpoint manager, and stats for a
/// single WAL directory. Readers and the recovery manager are cheap
/// enough to construct on demand since they only need the directory
/// path, not mutable state.
pub struct WalManager {
    writer: LogWriter,
    checkpoint: CheckpointManager,
    stats: Arc<WalStats>,
    dir: PathBuf,
}

impl WalManager {
    pub fn new(dir: impl AsRef<Path>, sync_mode: SyncMode) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let stats = Arc::new(WalStats::new());
        let writer = LogWriter::new(&dir, sync_mode, Arc::clone(&stats))?;
        let checkpoint = CheckpointManager::new(&dir)?;
        Ok(Self {
            writer,
            checkpoint,
            stats,
            dir,
        })
    }

    /// Replay the log against `bpm`, starting from the last checkpoint
    /// if one exists. Call once at startup before any other writes.
    pub fn recover(&self, bpm: &BufferPoolManager) -> Result<RecoveryStats> {
        let reader = LogReader::new(&self.dir)?;
        let recovery = RecoveryManager::new(reader);
        recovery.recover(bpm, self.checkpoint.get_recovery_info())
    }

    pub fn log_txn_begin(&mut self, txn_id: u32) -> Result<u32> {
        let lsn = self.writer.append(LogRecordType::TxnBegin, txn_id, 0, Vec::new(), None)?;
        self.checkpoint.begin_transaction(txn_id);
        Ok(lsn)
    }

    pub fn log_txn_commit(&mut self, txn_id: u32) -> Result<u32> {
        let lsn = self.writer.append(LogRecordType::TxnCommit, txn_id, 0, Vec::new(), None)?;
        self.checkpoint.end_transaction(txn_id);
        Ok(lsn)
    }

    pub fn log_txn_abort(&mut self, txn_id: u32) -> Result<u32> {
        let lsn = self.writer.append(LogRecordType::TxnAbort, txn_id, 0, Vec::new(), None)?;
        self.checkpoint.end_transaction(txn_id);
        Ok(lsn)
    }

    /// Log a full-page write (redo = `after_image`). `before_image`, if
    /// given, lets undo restore the page without a rebuild.
    pub fn log_page_write(
        &mut self,
        txn_id: u32,
        page_id: u32,
        after_image: Vec<u8>,
        before_image: Option<Vec<u8>>,
    ) -> Result<u32> {
        let metadata = before_image.map(|b| serde_json::json!({ "before_image": b }));
        let lsn = self
            .writer
            .append(LogRecordType::PageWrite, txn_id, page_id, after_image, metadata)?;
        self.checkpoint.record_write(page_id, lsn);
        Ok(lsn)
    }

    /// Log a byte-range patch at `offset` within a page.
    pub fn log_page_update(
        &mut self,
        txn_id: u32,
        page_id: u32,
        offset: usize,
        patch: Vec<u8>,
        before_image: Option<Vec<u8>>,
    ) -> Result<u32> {
        let mut metadata = serde_json::json!({ "offset": offset });
        if let Some(before) = before_image {
            metadata["before_image"] = serde_json::json!(before);
        }
        let lsn = self
            .writer
            .append(LogRecordType::PageUpdate, txn_id, page_id, patch, Some(metadata))?;
        self.checkpoint.record_write(page_id, lsn);
        Ok(lsn)
    }

    pub fn log_ddl(&mut self, record_type: LogRecordType, name: &str) -> Result<u32> {
        debug_assert!(matches!(
            record_type,
            LogRecordType::TableCreate
                | LogRecordType::TableDrop
                | LogRecordType::IndexCreate
                | LogRecordType::IndexDrop
        ));
        self.writer.append(record_type, 0, 0, name.as_bytes().to_vec(), None)
    }

    /// Flush buffered records and, if `force` or a trigger has fired,
    /// write a checkpoint.
    ///
    /// Callers must flush all dirty buffer pool pages first: a
    /// checkpoint snapshot describes durable state.
    pub fn maybe_checkpoint(&mut self, force: bool) -> Result<Option<CheckpointMetadata>> {
        self.writer.flush()?;
        self.checkpoint.maybe_checkpoint(force, &mut self.writer)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()
    }

    pub fn current_lsn(&self) -> u32 {
        self.writer.current_lsn()
    }

    pub fn stats(&self) -> WalStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn dir_path(&self) -> &Path {
        &self.dir
    }
}
