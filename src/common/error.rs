//! Crate-wide error type.
//!
//! A single enum covers every subsystem (storage, buffer pool, WAL,
//! locking, transactions, catalog, SQL execution) so callers handle one
//! `Result` alias instead of converting between per-module error types.

use thiserror::Error;

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in InterchangeDB, grouped by the subsystem that
/// raises them.
#[derive(Debug, Error)]
pub enum Error {
    // -- Storage I/O --
    /// I/O error from disk operations, annotated with the path and the
    /// operation that failed.
    #[error("disk I/O failure during {operation} on {path}: {source}")]
    Io {
        path: String,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    // -- Page --
    /// Requested page does not exist / was never allocated.
    #[error("page {0} not found")]
    PageNotFound(u32),

    /// The provided page ID is invalid (e.g. beyond the allocation ceiling).
    #[error("invalid page id: {0}")]
    InvalidPageId(u32),

    /// Page is not currently allocated (double-free, or operating on a
    /// freed id).
    #[error("page {0} is not allocated")]
    PageNotAllocated(u32),

    /// Allocation would exceed the configured maximum page count.
    #[error("maximum page count ({0}) exceeded")]
    MaxPagesExceeded(u64),

    // -- Buffer pool --
    /// Buffer pool has no free frames and cannot evict any page (all
    /// frames pinned).
    #[error("no free frames available in buffer pool")]
    NoFreeFrames,

    /// Buffer pool capacity requested outside `[MIN_BUFFER_POOL_SIZE, MAX_BUFFER_POOL_SIZE]`.
    #[error("invalid buffer pool capacity: {0}")]
    InvalidCapacity(usize),

    /// Requested page is not currently resident in the buffer pool.
    #[error("page {0} is not present in the buffer pool")]
    PageNotPresent(u32),

    /// Attempted to unpin a page that wasn't pinned.
    #[error("page {0} is not pinned")]
    PageNotPinned(u32),

    // -- Serialization --
    /// Column type code did not match any known type during decode.
    #[error("unknown column type code: {0}")]
    UnknownType(u8),

    /// Encoded value does not fit its declared width.
    #[error("length overflow encoding column '{column}': value is {actual} bytes, field is {declared} bytes")]
    LengthOverflow {
        column: String,
        actual: usize,
        declared: usize,
    },

    /// Corrupt or truncated record/page bytes.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    // -- Catalog --
    /// Table referenced by name does not exist.
    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// Table already exists under this name.
    #[error("table '{0}' already exists")]
    TableAlreadyExists(String),

    /// Index referenced by name does not exist.
    #[error("index '{0}' not found")]
    IndexNotFound(String),

    /// Index already exists under this name.
    #[error("index '{0}' already exists")]
    IndexAlreadyExists(String),

    /// Schema definition is invalid (bad identifier, duplicate column, etc).
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    // -- Lock --
    /// Lock acquisition did not complete before the timeout elapsed.
    #[error("lock acquisition timed out on page {page} for transaction {txn}")]
    LockTimeout { page: u32, txn: u64 },

    // -- Transaction --
    /// Operation requires an active transaction, but it is not active.
    #[error("transaction {0} is not active")]
    TransactionNotActive(u64),

    /// Transaction does not exist.
    #[error("transaction {0} not found")]
    TransactionNotFound(u64),

    /// Commit failed; the caller already triggered a rollback.
    #[error("commit failed for transaction {0}: {1}")]
    CommitFailed(u64, String),

    /// An operation would violate the transaction's isolation level.
    #[error("isolation violation: {0}")]
    IsolationViolation(String),

    // -- WAL --
    /// A log record failed CRC or magic-number validation on read.
    #[error("corrupt WAL record at offset {0}: {1}")]
    WalCorrupt(u64, String),

    /// The WAL writer failed to durably sync a record.
    #[error("WAL sync failure: {0}")]
    WalSyncFailure(String),

    // -- SQL / execution --
    /// Reference to a column not present in the active schema.
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    /// Reference to a table not present in the FROM clause / catalog.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// A value's type did not match the expected type for an operation.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// An operator or function is not supported by this dialect subset.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl Error {
    /// Wrap a `std::io::Error` with the path and operation that produced it.
    pub fn io(path: impl Into<String>, operation: &'static str, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            operation,
            source,
        }
    }
}
