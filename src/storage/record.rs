//! Record serializer: schema-driven encode/decode of tuples into the
//! byte blocks a [`super::page::Page`] stores.

use crate::common::{Error, Result};

/// Default maximum byte width for a `VARCHAR` column with no declared
/// length.
pub const DEFAULT_VARCHAR_MAX_LEN: usize = 255;

/// Column type codec, matching the fixed set of types this engine
/// supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Signed 32-bit integer.
    Int32,
    /// 32-bit IEEE-754 float.
    Float32,
    /// Single byte boolean.
    Bool,
    /// Timestamp represented as an unsigned 64-bit integer.
    Date,
    /// Variable-length string, with an optional declared maximum byte
    /// width (defaults to [`DEFAULT_VARCHAR_MAX_LEN`]).
    Varchar(Option<usize>),
}

impl ColumnType {
    /// Number of bytes this column occupies in an encoded record,
    /// excluding the leading status byte.
    pub fn encoded_width(&self) -> usize {
        match self {
            ColumnType::Int32 => 4,
            ColumnType::Float32 => 4,
            ColumnType::Bool => 1,
            ColumnType::Date => 8,
            ColumnType::Varchar(declared) => 2 + declared.unwrap_or(DEFAULT_VARCHAR_MAX_LEN),
        }
    }
}

/// One column descriptor in a table's schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaColumn {
    pub name: String,
    pub col_type: ColumnType,
}

impl SchemaColumn {
    pub fn new(name: impl Into<String>, col_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            col_type,
        }
    }
}

/// An ordered list of column descriptors governing record layout.
pub type Schema = Vec<SchemaColumn>;

/// A decoded column value. `Null` represents a NULL at that position,
/// encoded as zeroed bytes for fixed-width columns or a zero-length
/// string for `VARCHAR`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Int32(i32),
    Float32(f32),
    Bool(bool),
    Date(u64),
    Varchar(String),
    Null,
}

/// Result of decoding a record's bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// A live record with one value per schema column, in schema order.
    Live(Vec<ColumnValue>),
    /// A tombstoned (logically deleted) record.
    Tombstone,
}

const STATUS_LIVE: u8 = 0;
const STATUS_TOMBSTONE: u8 = 1;

impl Record {
    /// Encode a live record's values into bytes, per `schema`.
    ///
    /// # Errors
    /// Fails if `values.len() != schema.len()`, or if a `VARCHAR` value
    /// exceeds its declared width.
    pub fn serialize(values: &[ColumnValue], schema: &Schema) -> Result<Vec<u8>> {
        if values.len() != schema.len() {
            return Err(Error::InvalidSchema(format!(
                "expected {} values, got {}",
                schema.len(),
                values.len()
            )));
        }

        let mut buffer = Vec::with_capacity(1 + schema.iter().map(|c| c.col_type.encoded_width()).sum::<usize>());
        buffer.push(STATUS_LIVE);

        for (value, column) in values.iter().zip(schema.iter()) {
            encode_column(&mut buffer, value, &column.col_type, &column.name)?;
        }

        Ok(buffer)
    }

    /// Encode a tombstone record: a single status byte.
    pub fn serialize_tombstone() -> Vec<u8> {
        vec![STATUS_TOMBSTONE]
    }

    /// Decode a record's bytes per `schema`.
    ///
    /// # Errors
    /// Fails on truncated input or a corrupt `VARCHAR` length prefix.
    pub fn deserialize(bytes: &[u8], schema: &Schema) -> Result<Record> {
        if bytes.is_empty() {
            return Err(Error::Corrupt("empty record bytes".to_string()));
        }

        let status = bytes[0];
        if status == STATUS_TOMBSTONE {
            return Ok(Record::Tombstone);
        }

        let mut offset = 1usize;
        let mut values = Vec::with_capacity(schema.len());

        for column in schema {
            let value = decode_column(bytes, &mut offset, &column.col_type, &column.name)?;
            values.push(value);
        }

        Ok(Record::Live(values))
    }
}

fn encode_column(
    buffer: &mut Vec<u8>,
    value: &ColumnValue,
    col_type: &ColumnType,
    column_name: &str,
) -> Result<()> {
    match (col_type, value) {
        (ColumnType::Int32, ColumnValue::Null) => buffer.extend_from_slice(&[0u8; 4]),
        (ColumnType::Int32, ColumnValue::Int32(v)) => buffer.extend_from_slice(&v.to_le_bytes()),
        (ColumnType::Float32, ColumnValue::Null) => buffer.extend_from_slice(&[0u8; 4]),
        (ColumnType::Float32, ColumnValue::Float32(v)) => {
            buffer.extend_from_slice(&v.to_le_bytes())
        }
        (ColumnType::Bool, ColumnValue::Null) => buffer.push(0),
        (ColumnType::Bool, ColumnValue::Bool(v)) => buffer.push(*v as u8),
        (ColumnType::Date, ColumnValue::Null) => buffer.extend_from_slice(&[0u8; 8]),
        (ColumnType::Date, ColumnValue::Date(v)) => buffer.extend_from_slice(&v.to_le_bytes()),
        (ColumnType::Varchar(declared), ColumnValue::Null) => {
            let max_len = declared.unwrap_or(DEFAULT_VARCHAR_MAX_LEN);
            buffer.extend_from_slice(&0u16.to_le_bytes());
            buffer.extend(std::iter::repeat(0u8).take(max_len));
        }
        (ColumnType::Varchar(declared), ColumnValue::Varchar(s)) => {
            let max_len = declared.unwrap_or(DEFAULT_VARCHAR_MAX_LEN);
            let str_bytes = s.as_bytes();
            if str_bytes.len() > max_len {
                return Err(Error::LengthOverflow {
                    column: column_name.to_string(),
                    actual: str_bytes.len(),
                    declared: max_len,
                });
            }
            buffer.extend_from_slice(&(str_bytes.len() as u16).to_le_bytes());
            buffer.extend_from_slice(str_bytes);
            buffer.extend(std::iter::repeat(0u8).take(max_len - str_bytes.len()));
        }
        _ => {
            return Err(Error::TypeMismatch(format!(
                "column '{}' does not accept this value type",
                column_name
            )))
        }
    }
    Ok(())
}

fn decode_column(
    bytes: &[u8],
    offset: &mut usize,
    col_type: &ColumnType,
    column_name: &str,
) -> Result<ColumnValue> {
    let take = |offset: &mut usize, len: usize| -> Result<&[u8]> {
        if *offset + len > bytes.len() {
            return Err(Error::Corrupt(format!(
                "truncated record while decoding column '{}'",
                column_name
            )));
        }
        let slice = &bytes[*offset..*offset + len];
        *offset += len;
        Ok(slice)
    };

    match col_type {
        ColumnType::Int32 => {
            let raw = take(offset, 4)?;
            if raw == [0u8; 4] {
                Ok(ColumnValue::Null)
            } else {
                Ok(ColumnValue::Int32(i32::from_le_bytes(raw.try_into().unwrap())))
            }
        }
        ColumnType::Float32 => {
            let raw = take(offset, 4)?;
            if raw == [0u8; 4] {
                Ok(ColumnValue::Null)
            } else {
                Ok(ColumnValue::Float32(f32::from_le_bytes(
                    raw.try_into().unwrap(),
                )))
            }
        }
        ColumnType::Bool => {
            let raw = take(offset, 1)?;
            if raw[0] == 0 {
                Ok(ColumnValue::Null)
            } else {
                Ok(ColumnValue::Bool(raw[0] != 0))
            }
        }
        ColumnType::Date => {
            let raw = take(offset, 8)?;
            if raw == [0u8; 8] {
                Ok(ColumnValue::Null)
            } else {
                Ok(ColumnValue::Date(u64::from_le_bytes(raw.try_into().unwrap())))
            }
        }
        ColumnType::Varchar(declared) => {
            let max_len = declared.unwrap_or(DEFAULT_VARCHAR_MAX_LEN);
            let len_bytes = take(offset, 2)?;
            let str_len = u16::from_le_bytes(len_bytes.try_into().unwrap()) as usize;

            if str_len > max_len {
                return Err(Error::Corrupt(format!(
                    "varchar length {} exceeds declared width {} for column '{}'",
                    str_len, max_len, column_name
                )));
            }

            let str_bytes = take(offset, max_len)?;
            if str_len == 0 {
                Ok(ColumnValue::Null)
            } else {
                let s = String::from_utf8_lossy(&str_bytes[..str_len]).into_owned();
                Ok(ColumnValue::Varchar(s))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> Schema {
        vec![
            SchemaColumn::new("id", ColumnType::Int32),
            SchemaColumn::new("name", ColumnType::Varchar(Some(16))),
            SchemaColumn::new("active", ColumnType::Bool),
            SchemaColumn::new("score", ColumnType::Float32),
            SchemaColumn::new("created", ColumnType::Date),
        ]
    }

    #[test]
    fn test_roundtrip_live_record() {
        let schema = sample_schema();
        let values = vec![
            ColumnValue::Int32(42),
            ColumnValue::Varchar("alice".to_string()),
            ColumnValue::Bool(true),
            ColumnValue::Float32(3.5),
            ColumnValue::Date(1_700_000_000),
        ];

        let bytes = Record::serialize(&values, &schema).unwrap();
        let decoded = Record::deserialize(&bytes, &schema).unwrap();

        assert_eq!(decoded, Record::Live(values));
    }

    #[test]
    fn test_tombstone_roundtrip() {
        let schema = sample_schema();
        let bytes = Record::serialize_tombstone();
        let decoded = Record::deserialize(&bytes, &schema).unwrap();
        assert_eq!(decoded, Record::Tombstone);
    }

    #[test]
    fn test_null_encodes_as_zeroed_bytes() {
        let schema = sample_schema();
        let values = vec![
            ColumnValue::Null,
            ColumnValue::Null,
            ColumnValue::Null,
            ColumnValue::Null,
            ColumnValue::Null,
        ];

        let bytes = Record::serialize(&values, &schema).unwrap();
        let decoded = Record::deserialize(&bytes, &schema).unwrap();
        assert_eq!(
            decoded,
            Record::Live(vec![
                ColumnValue::Null,
                ColumnValue::Null,
                ColumnValue::Null,
                ColumnValue::Null,
                ColumnValue::Null,
            ])
        );
    }

    #[test]
    fn test_varchar_overflow_rejected() {
        let schema = vec![SchemaColumn::new("name", ColumnType::Varchar(Some(3)))];
        let values = vec![ColumnValue::Varchar("toolong".to_string())];
        assert!(Record::serialize(&values, &schema).is_err());
    }

    #[test]
    fn test_varchar_default_max_len() {
        let schema = vec![SchemaColumn::new("note", ColumnType::Varchar(None))];
        let values = vec![ColumnValue::Varchar("hi".to_string())];
        let bytes = Record::serialize(&values, &schema).unwrap();
        // 1 status byte + 2 length prefix + DEFAULT_VARCHAR_MAX_LEN padding.
        assert_eq!(bytes.len(), 1 + 2 + DEFAULT_VARCHAR_MAX_LEN);
    }

    #[test]
    fn test_wrong_value_count_rejected() {
        let schema = sample_schema();
        let values = vec![ColumnValue::Int32(1)];
        assert!(Record::serialize(&values, &schema).is_err());
    }

    #[test]
    fn test_truncated_bytes_rejected() {
        let schema = sample_schema();
        let bytes = vec![0u8; 2];
        assert!(Record::deserialize(&bytes, &schema).is_err());
    }
}
