//! WAL reader: sequential iteration over log files with corruption
//! recovery (§4.6).

use std::fs;
use std::path::{Path, PathBuf};

use crate::common::{Error, Result};

use super::record::{LogRecord, LogRecordType, MAGIC};

/// Discover every `wal_XXXXXXXX.log` file in `dir`, sorted by file
/// number ascending.
fn log_files(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir.display().to_string(), "read_dir", e))? {
        let entry = entry.map_err(|e| Error::io(dir.display().to_string(), "read_dir_entry", e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(rest) = name.strip_prefix("wal_").and_then(|s| s.strip_suffix(".log")) {
            if let Ok(n) = rest.parse::<u32>() {
                files.push((n, entry.path()));
            }
        }
    }
    files.sort_by_key(|(n, _)| *n);
    Ok(files)
}

/// Byte-scan forward from `start` for the next occurrence of the magic
/// number, to resume reading after a corrupt/truncated record.
fn scan_for_next_record(bytes: &[u8], start: usize) -> Option<usize> {
    let magic_bytes = MAGIC.to_le_bytes();
    (start..bytes.len().saturating_sub(3)).find(|&i| bytes[i..i + 4] == magic_bytes)
}

/// Sequentially reads every record across every log file in a WAL
/// directory, recovering from corruption by scanning for the next valid
/// magic number.
pub struct LogReader {
    dir: PathBuf,
}

impl LogReader {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    /// Read every record in every log file, in (file_number, lsn) order.
    /// Corrupt records are skipped rather than aborting the whole read.
    pub fn read_all(&self) -> Result<Vec<LogRecord>> {
        let mut out = Vec::new();
        for (_, path) in log_files(&self.dir)? {
            out.extend(self.read_file(&path)?);
        }
        Ok(out)
    }

    fn read_file(&self, path: &Path) -> Result<Vec<LogRecord>> {
        let bytes = fs::read(path).map_err(|e| Error::io(path.display().to_string(), "read_wal_file", e))?;
        let mut records = Vec::new();
        let mut pos = 0usize;

        while pos < bytes.len() {
            match LogRecord::deserialize(&bytes[pos..]) {
                Ok((record, consumed)) => {
                    records.push(record);
                    pos += consumed;
                }
                Err(_) => match scan_for_next_record(&bytes, pos + 1) {
                    Some(next) => pos = next,
                    None => break,
                },
            }
        }

        Ok(records)
    }

    /// Every record with `lsn >= from_lsn`.
    pub fn read_from_lsn(&self, from_lsn: u32) -> Result<Vec<LogRecord>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| r.lsn >= from_lsn)
            .collect())
    }

    /// Records in `[start_lsn, end_lsn]`.
    pub fn read_range(&self, start_lsn: u32, end_lsn: u32) -> Result<Vec<LogRecord>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| r.lsn >= start_lsn && r.lsn <= end_lsn)
            .collect())
    }

    pub fn read_by_type(&self, record_type: LogRecordType) -> Result<Vec<LogRecord>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| r.record_type == record_type)
            .collect())
    }

    pub fn read_by_page(&self, page_id: u32) -> Result<Vec<LogRecord>> {
        Ok(self.read_all()?.into_iter().filter(|r| r.page_id == page_id).collect())
    }

    pub fn read_by_transaction(&self, txn_id: u32) -> Result<Vec<LogRecord>> {
        Ok(self.read_all()?.into_iter().filter(|r| r.txn_id == txn_id).collect())
    }

    /// The highest LSN present in the log, if any records exist.
    pub fn last_lsn(&self) -> Result<Option<u32>> {
        Ok(self.read_all()?.into_iter().map(|r| r.lsn).max())
    }

    /// Find the last complete `(CHECKPOINT_BEGIN, CHECKPOINT_END)` pair,
    /// if any.
    pub fn find_last_checkpoint(&self) -> Result<Option<(LogRecord, LogRecord)>> {
        let records = self.read_all()?;
        let mut last_begin = None;
        let mut last_pair = None;

        for record in records {
            match record.record_type {
                LogRecordType::CheckpointBegin => last_begin = Some(record),
                LogRecordType::CheckpointEnd => {
                    if let Some(begin) = last_begin.take() {
                        last_pair = Some((begin, record));
                    }
                }
                _ => {}
            }
        }

        Ok(last_pair)
    }
}
