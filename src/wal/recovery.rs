//! ARIES-lite three-phase recovery: analyze, redo, undo (§4.6).

use std::collections::{HashMap, HashSet};

use crate::buffer::BufferPoolManager;
use crate::common::config::PAGE_SIZE;
use crate::common::{PageId, Result};

use super::checkpoint::CheckpointMetadata;
use super::reader::LogReader;
use super::record::{LogRecord, LogRecordType};

/// What happened when undoing one logged write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    /// The before-image was present in the record's metadata and was
    /// written back.
    Restored,
    /// No before-image was available; the page is left as-is and
    /// flagged for rebuild rather than failing recovery (§9).
    RebuildRequired,
}

/// Outcome of a full recovery pass.
#[derive(Debug, Default)]
pub struct RecoveryStats {
    pub records_analyzed: usize,
    pub pages_redone: usize,
    pub transactions_undone: usize,
    pub pages_requiring_rebuild: Vec<u32>,
}

/// Runs the analyze/redo/undo recovery procedure against a buffer pool,
/// starting from the most recent checkpoint if one is available.
pub struct RecoveryManager {
    reader: LogReader,
}

impl RecoveryManager {
    pub fn new(reader: LogReader) -> Self {
        Self { reader }
    }

    pub fn recover(
        &self,
        bpm: &BufferPoolManager,
        checkpoint: Option<&CheckpointMetadata>,
    ) -> Result<RecoveryStats> {
        let start_lsn = checkpoint.map_or(0, |c| c.start_lsn);
        let records = self.reader.read_from_lsn(start_lsn)?;

        let (active_transactions, dirty_pages) = self.analyze(&records, checkpoint);
        let pages_redone = self.redo(bpm, &records, &dirty_pages)?;
        bpm.flush_all_pages()?;

        let (transactions_undone, pages_requiring_rebuild) =
            self.undo(bpm, &records, &active_transactions)?;
        bpm.flush_all_pages()?;

        Ok(RecoveryStats {
            records_analyzed: records.len(),
            pages_redone,
            transactions_undone,
            pages_requiring_rebuild,
        })
    }

    fn analyze(
        &self,
        records: &[LogRecord],
        checkpoint: Option<&CheckpointMetadata>,
    ) -> (HashSet<u32>, HashMap<u32, u32>) {
        let mut active: HashSet<u32> = checkpoint
            .map(|c| c.active_transactions.iter().copied().collect())
            .unwrap_or_default();
        let mut dirty_pages: HashMap<u32, u32> =
            checkpoint.map(|c| c.dirty_pages.clone()).unwrap_or_default();

        for record in records {
            match record.record_type {
                LogRecordType::TxnBegin => {
                    active.insert(record.txn_id);
                }
                LogRecordType::TxnCommit | LogRecordType::TxnAbort => {
                    active.remove(&record.txn_id);
                }
                LogRecordType::PageWrite | LogRecordType::PageUpdate => {
                    dirty_pages.entry(record.page_id).or_insert(record.lsn);
                }
                _ => {}
            }
        }

        (active, dirty_pages)
    }

    fn redo(
        &self,
        bpm: &BufferPoolManager,
        records: &[LogRecord],
        dirty_pages: &HashMap<u32, u32>,
    ) -> Result<usize> {
        let recovery_lsn = dirty_pages.values().copied().min().unwrap_or(0);
        let mut count = 0;

        for record in records {
            if record.lsn < recovery_lsn {
                continue;
            }
            let should_redo = matches!(
                record.record_type,
                LogRecordType::PageWrite | LogRecordType::PageUpdate
            ) && dirty_pages
                .get(&record.page_id)
                .is_some_and(|&first| record.lsn >= first);

            if should_redo {
                self.redo_operation(bpm, record)?;
                count += 1;
            }
        }

        Ok(count)
    }

    fn redo_operation(&self, bpm: &BufferPoolManager, record: &LogRecord) -> Result<()> {
        let mut guard = bpm.fetch_page_write(PageId::new(record.page_id))?;

        match record.record_type {
            LogRecordType::PageWrite => {
                let n = record.payload.len().min(PAGE_SIZE);
                guard.as_mut_slice()[..n].copy_from_slice(&record.payload[..n]);
            }
            LogRecordType::PageUpdate => {
                let offset = record
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("offset"))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as usize;
                if offset < PAGE_SIZE {
                    let end = (offset + record.payload.len()).min(PAGE_SIZE);
                    let n = end - offset;
                    guard.as_mut_slice()[offset..end].copy_from_slice(&record.payload[..n]);
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn undo(
        &self,
        bpm: &BufferPoolManager,
        records: &[LogRecord],
        active_transactions: &HashSet<u32>,
    ) -> Result<(usize, Vec<u32>)> {
        let mut rebuild_required = Vec::new();

        for &txn_id in active_transactions {
            let mut txn_writes: Vec<&LogRecord> = records
                .iter()
                .filter(|r| {
                    r.txn_id == txn_id
                        && matches!(r.record_type, LogRecordType::PageWrite | LogRecordType::PageUpdate)
                })
                .collect();
            txn_writes.sort_by(|a, b| b.lsn.cmp(&a.lsn));

            for record in txn_writes {
                if self.undo_operation(bpm, record)? == UndoOutcome::RebuildRequired {
                    rebuild_required.push(record.page_id);
                }
            }
        }

        Ok((active_transactions.len(), rebuild_required))
    }

    fn undo_operation(&self, bpm: &BufferPoolManager, record: &LogRecord) -> Result<UndoOutcome> {
        let before_image = record
            .metadata
            .as_ref()
            .and_then(|m| m.get("before_image"))
            .and_then(|v| serde_json::from_value::<Vec<u8>>(v.clone()).ok());

        match before_image {
            Some(bytes) if bytes.len() == PAGE_SIZE => {
                let mut guard = bpm.fetch_page_write(PageId::new(record.page_id))?;
                guard.as_mut_slice().copy_from_slice(&bytes);
                Ok(UndoOutcome::Restored)
            }
            _ => {
                log::warn!(
                    "no before-image for page {} (lsn {}); marking for rebuild",
                    record.page_id,
                    record.lsn
                );
                Ok(UndoOutcome::RebuildRequired)
            }
        }
    }
}
