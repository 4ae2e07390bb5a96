//! Page-level locking and transaction management (§4.7, §4.8).

mod lock_manager;
mod transaction;

pub use lock_manager::{LockManager, LockManagerStats, LockMode};
pub use transaction::{
    IsolationLevel, Transaction, TransactionHistoryEntry, TransactionManager,
    TransactionManagerStats, TransactionState,
};
