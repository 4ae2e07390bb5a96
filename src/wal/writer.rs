//! WAL writer: append-only, batched, rotating log file writer (§4.6).

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::common::config::{DEFAULT_WAL_BATCH_SIZE, DEFAULT_WAL_FILE_SIZE_LIMIT};
use crate::common::{Error, Result};

use super::record::{LogRecord, LogRecordType};
use super::stats::WalStats;

/// Controls how aggressively the writer forces durability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Rely on the OS page cache; never call `sync_*`.
    None,
    /// `flush()` the `BufWriter`-equivalent but skip `fsync`.
    Flush,
    /// `File::sync_all` (data + metadata) after every flush.
    Fsync,
    /// `File::sync_data` (data only) after every flush.
    Fdatasync,
}

fn file_name(file_number: u32) -> String {
    format!("wal_{file_number:08}.log")
}

/// Scan `dir` for `wal_XXXXXXXX.log` files, returning the highest file
/// number found, if any.
fn highest_file_number(dir: &Path) -> Result<Option<u32>> {
    if !dir.exists() {
        return Ok(None);
    }
    let mut highest = None;
    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir.display().to_string(), "read_dir", e))? {
        let entry = entry.map_err(|e| Error::io(dir.display().to_string(), "read_dir_entry", e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(rest) = name.strip_prefix("wal_").and_then(|s| s.strip_suffix(".log")) {
            if let Ok(n) = rest.parse::<u32>() {
                highest = Some(highest.map_or(n, |h: u32| h.max(n)));
            }
        }
    }
    Ok(highest)
}

/// Appends [`LogRecord`]s to the current log file, batching and rotating
/// as configured.
pub struct LogWriter {
    dir: PathBuf,
    file_size_limit: u64,
    batch_size: usize,
    sync_mode: SyncMode,
    file: File,
    file_number: u32,
    file_offset: u64,
    batch: Vec<u8>,
    next_lsn: u32,
    stats: Arc<WalStats>,
}

impl LogWriter {
    pub fn new(dir: impl AsRef<Path>, sync_mode: SyncMode, stats: Arc<WalStats>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| Error::io(dir.display().to_string(), "create_dir_all", e))?;

        let file_number = highest_file_number(&dir)?.unwrap_or(1).max(1);
        let path = dir.join(file_name(file_number));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::io(path.display().to_string(), "open_wal_file", e))?;
        let file_offset = file
            .metadata()
            .map_err(|e| Error::io(path.display().to_string(), "stat_wal_file", e))?
            .len();

        let next_lsn = super::reader::LogReader::new(&dir)?
            .last_lsn()?
            .map_or(0, |lsn| lsn + 1);

        Ok(Self {
            dir,
            file_size_limit: DEFAULT_WAL_FILE_SIZE_LIMIT,
            batch_size: DEFAULT_WAL_BATCH_SIZE,
            sync_mode,
            file,
            file_number,
            file_offset,
            batch: Vec::new(),
            next_lsn,
            stats,
        })
    }

    pub fn set_sync_mode(&mut self, mode: SyncMode) {
        self.sync_mode = mode;
    }

    pub fn set_file_size_limit(&mut self, limit: u64) {
        self.file_size_limit = limit;
    }

    pub fn set_batch_size(&mut self, size: usize) {
        self.batch_size = size;
    }

    /// Current write position, as `(file_number, file_offset)`. The
    /// offset counts only durably-written bytes, not the pending batch.
    pub fn get_current_position(&self) -> (u32, u64) {
        (self.file_number, self.file_offset)
    }

    pub fn current_lsn(&self) -> u32 {
        self.next_lsn
    }

    pub fn dir_path(&self) -> &Path {
        &self.dir
    }

    /// Append one record, assigning it the next LSN. Returns the
    /// assigned LSN.
    ///
    /// Forces an immediate flush+sync for commit, checkpoint-end, and
    /// DDL record types; otherwise batches until `batch_size` is
    /// exceeded.
    pub fn append(
        &mut self,
        record_type: LogRecordType,
        txn_id: u32,
        page_id: u32,
        payload: Vec<u8>,
        metadata: Option<serde_json::Value>,
    ) -> Result<u32> {
        let lsn = self.next_lsn;
        self.next_lsn += 1;

        let mut record = LogRecord::new(lsn, record_type, txn_id, page_id, payload);
        if let Some(meta) = metadata {
            record = record.with_metadata(meta);
        }
        let bytes = record.serialize()?;

        if self.file_offset + (self.batch.len() + bytes.len()) as u64 > self.file_size_limit {
            self.flush()?;
            self.rotate()?;
        }

        self.batch.extend_from_slice(&bytes);
        self.stats.records_written.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes_written.fetch_add(bytes.len() as u64, Ordering::Relaxed);

        if record_type.forces_sync() || self.batch.len() >= self.batch_size {
            self.flush()?;
        }

        Ok(lsn)
    }

    fn rotate(&mut self) -> Result<()> {
        self.file_number += 1;
        self.file_offset = 0;
        let path = self.dir.join(file_name(self.file_number));
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::io(path.display().to_string(), "rotate_wal_file", e))?;
        self.stats.rotations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Write the pending batch to the current file and apply the
    /// configured sync mode.
    pub fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }

        self.file
            .write_all(&self.batch)
            .map_err(|e| Error::WalSyncFailure(format!("write failed: {e}")))?;
        self.file_offset += self.batch.len() as u64;
        self.batch.clear();

        match self.sync_mode {
            SyncMode::None => {}
            SyncMode::Flush => self
                .file
                .flush()
                .map_err(|e| Error::WalSyncFailure(format!("flush failed: {e}")))?,
            SyncMode::Fsync => self
                .file
                .sync_all()
                .map_err(|e| Error::WalSyncFailure(format!("fsync failed: {e}")))?,
            SyncMode::Fdatasync => self
                .file
                .sync_data()
                .map_err(|e| Error::WalSyncFailure(format!("fdatasync failed: {e}")))?,
        }

        self.stats.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.flush()
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
