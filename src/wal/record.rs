//! Binary WAL log record format (§4.6).
//!
//! Layout, little-endian throughout:
//! `magic(4) | lsn(4) | type(4) | reserved(4) | timestamp(8,f64) |
//! txn_id(4) | page_id(4) | data_len(4) | data(N) | crc32(4)`.
//!
//! `data` is `meta_len(4) | meta_json(meta_len) | payload`; most record
//! types carry no metadata (`meta_len == 0`), but `PAGE_UPDATE` stores its
//! byte `offset` there, and undo-capable writes store a `before_image`.

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};

/// Magic number identifying a valid record header.
pub const MAGIC: u32 = 0x5741_4C31;

/// Fixed header size, not counting the `data_len`/data/crc trailer.
pub const HEADER_SIZE: usize = 4 + 4 + 4 + 4 + 8 + 4 + 4;

/// Seconds since the Unix epoch, as an f64 (matches the log record
/// header's 8-byte double timestamp field).
pub fn now_timestamp() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum LogRecordType {
    PageWrite = 1,
    PageUpdate = 2,
    TxnBegin = 3,
    TxnCommit = 4,
    TxnAbort = 5,
    CheckpointBegin = 6,
    CheckpointEnd = 7,
    TableCreate = 8,
    TableDrop = 9,
    IndexCreate = 10,
    IndexDrop = 11,
    /// Emitted once at a fresh data directory's first open. Unreferenced
    /// by recovery (analyze/redo/undo all skip it, same as the original
    /// it mirrors) but kept for a complete record-type enum.
    SystemInit = 12,
}

impl LogRecordType {
    fn from_u32(v: u32) -> Result<Self> {
        Ok(match v {
            1 => Self::PageWrite,
            2 => Self::PageUpdate,
            3 => Self::TxnBegin,
            4 => Self::TxnCommit,
            5 => Self::TxnAbort,
            6 => Self::CheckpointBegin,
            7 => Self::CheckpointEnd,
            8 => Self::TableCreate,
            9 => Self::TableDrop,
            10 => Self::IndexCreate,
            11 => Self::IndexDrop,
            12 => Self::SystemInit,
            other => return Err(Error::Corrupt(format!("unknown WAL record type {other}"))),
        })
    }

    /// Records whose durability must be forced before the writer's
    /// batch flush returns, per §4.6.
    pub fn forces_sync(self) -> bool {
        matches!(
            self,
            Self::TxnCommit | Self::CheckpointEnd | Self::TableCreate | Self::TableDrop
        )
    }
}

/// One WAL record: a committed fact about a page write, a transaction
/// boundary, or a checkpoint boundary.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub lsn: u32,
    pub record_type: LogRecordType,
    pub timestamp: f64,
    pub txn_id: u32,
    pub page_id: u32,
    /// Small structured metadata: `PAGE_UPDATE`'s `offset`, or a
    /// `before_image` for undo.
    pub metadata: Option<serde_json::Value>,
    pub payload: Vec<u8>,
}

impl LogRecord {
    pub fn new(
        lsn: u32,
        record_type: LogRecordType,
        txn_id: u32,
        page_id: u32,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            lsn,
            record_type,
            timestamp: now_timestamp(),
            txn_id,
            page_id,
            metadata: None,
            payload,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    fn encode_data(&self) -> Result<Vec<u8>> {
        let meta_bytes = match &self.metadata {
            Some(value) => serde_json::to_vec(value)
                .map_err(|e| Error::Corrupt(format!("failed to serialize WAL metadata: {e}")))?,
            None => Vec::new(),
        };
        let mut data = Vec::with_capacity(4 + meta_bytes.len() + self.payload.len());
        data.extend_from_slice(&(meta_bytes.len() as u32).to_le_bytes());
        data.extend_from_slice(&meta_bytes);
        data.extend_from_slice(&self.payload);
        Ok(data)
    }

    /// Serialize to the on-disk binary format, CRC32-trailed.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let data = self.encode_data()?;

        let mut buf = Vec::with_capacity(HEADER_SIZE + 4 + data.len() + 4);
        buf.extend_from_slice(&MAGIC.to_le_bytes());
        buf.extend_from_slice(&self.lsn.to_le_bytes());
        buf.extend_from_slice(&(self.record_type as u32).to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // reserved
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&self.txn_id.to_le_bytes());
        buf.extend_from_slice(&self.page_id.to_le_bytes());
        buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&data);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&buf);
        buf.extend_from_slice(&hasher.finalize().to_le_bytes());

        Ok(buf)
    }

    /// Parse one record starting at the front of `bytes`. Returns the
    /// record and the number of bytes consumed.
    ///
    /// # Errors
    /// Fails on bad magic, truncated input, or CRC mismatch.
    pub fn deserialize(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < HEADER_SIZE + 4 {
            return Err(Error::Corrupt("WAL record shorter than header".to_string()));
        }

        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(Error::Corrupt(format!("bad WAL magic: {magic:#x}")));
        }

        let lsn = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let record_type = LogRecordType::from_u32(u32::from_le_bytes(bytes[8..12].try_into().unwrap()))?;
        // bytes[12..16] reserved
        let timestamp = f64::from_le_bytes(bytes[16..24].try_into().unwrap());
        let txn_id = u32::from_le_bytes(bytes[24..28].try_into().unwrap());
        let page_id = u32::from_le_bytes(bytes[28..32].try_into().unwrap());
        let data_len = u32::from_le_bytes(bytes[32..36].try_into().unwrap()) as usize;

        // 10MB sanity cap against reading garbage as an enormous length.
        const MAX_RECORD_DATA: usize = 10 * 1024 * 1024;
        if data_len > MAX_RECORD_DATA {
            return Err(Error::Corrupt(format!(
                "WAL record data length {data_len} exceeds sanity cap"
            )));
        }

        let total_len = HEADER_SIZE + 4 + data_len + 4;
        if bytes.len() < total_len {
            return Err(Error::Corrupt("WAL record truncated".to_string()));
        }

        let data = &bytes[HEADER_SIZE + 4..HEADER_SIZE + 4 + data_len];
        let stored_crc = u32::from_le_bytes(
            bytes[HEADER_SIZE + 4 + data_len..total_len]
                .try_into()
                .unwrap(),
        );

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&bytes[..HEADER_SIZE + 4 + data_len]);
        let computed_crc = hasher.finalize();
        if computed_crc != stored_crc {
            return Err(Error::Corrupt(format!(
                "WAL record CRC mismatch at lsn {lsn}: expected {stored_crc:#x}, got {computed_crc:#x}"
            )));
        }

        if data.len() < 4 {
            return Err(Error::Corrupt("WAL record data missing meta length".to_string()));
        }
        let meta_len = u32::from_le_bytes(data[0..4].try_into().unwrap()) as usize;
        if data.len() < 4 + meta_len {
            return Err(Error::Corrupt("WAL record metadata truncated".to_string()));
        }
        let metadata = if meta_len == 0 {
            None
        } else {
            Some(
                serde_json::from_slice(&data[4..4 + meta_len])
                    .map_err(|e| Error::Corrupt(format!("invalid WAL metadata JSON: {e}")))?,
            )
        };
        let payload = data[4 + meta_len..].to_vec();

        Ok((
            Self {
                lsn,
                record_type,
                timestamp,
                txn_id,
                page_id,
                metadata,
                payload,
            },
            total_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_without_metadata() {
        let record = LogRecord::new(1, LogRecordType::PageWrite, 7, 42, vec![1, 2, 3, 4]);
        let bytes = record.serialize().unwrap();
        let (decoded, consumed) = LogRecord::deserialize(&bytes).unwrap();

        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.lsn, 1);
        assert_eq!(decoded.txn_id, 7);
        assert_eq!(decoded.page_id, 42);
        assert_eq!(decoded.payload, vec![1, 2, 3, 4]);
        assert!(decoded.metadata.is_none());
    }

    #[test]
    fn test_roundtrip_with_metadata() {
        let record = LogRecord::new(2, LogRecordType::PageUpdate, 1, 5, vec![9, 9])
            .with_metadata(serde_json::json!({"offset": 16}));
        let bytes = record.serialize().unwrap();
        let (decoded, _) = LogRecord::deserialize(&bytes).unwrap();

        assert_eq!(decoded.metadata.unwrap()["offset"], 16);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = LogRecord::new(1, LogRecordType::TxnBegin, 1, 0, vec![])
            .serialize()
            .unwrap();
        bytes[0] ^= 0xFF;
        assert!(LogRecord::deserialize(&bytes).is_err());
    }

    #[test]
    fn test_crc_mismatch_detected() {
        let mut bytes = LogRecord::new(1, LogRecordType::TxnCommit, 1, 0, vec![1, 2, 3])
            .serialize()
            .unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(LogRecord::deserialize(&bytes).is_err());
    }

    #[test]
    fn test_truncated_record_rejected() {
        let bytes = LogRecord::new(1, LogRecordType::PageWrite, 1, 0, vec![1, 2, 3])
            .serialize()
            .unwrap();
        assert!(LogRecord::deserialize(&bytes[..bytes.len() - 2]).is_err());
    }

    #[test]
    fn test_forces_sync() {
        assert!(LogRecordType::TxnCommit.forces_sync());
        assert!(LogRecordType::CheckpointEnd.forces_sync());
        assert!(!LogRecordType::PageWrite.forces_sync());
    }
}
