//! Transaction manager: isolation levels, undo/redo logs, and MVCC page
//! version chains (§4.8).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::common::config::MAX_PAGE_VERSIONS;
use crate::common::{Error, PageId, Result};

use super::lock_manager::{LockManager, LockMode};

/// Transaction lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Preparing,
    Committed,
    Aborted,
}

/// SQL isolation level, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IsolationLevel {
    ReadUncommitted = 0,
    ReadCommitted = 1,
    RepeatableRead = 2,
    Serializable = 3,
}

/// Per-transaction state: logs needed to undo/redo its writes, and the
/// read/write sets used to answer visibility checks.
pub struct Transaction {
    pub id: u64,
    pub state: TransactionState,
    pub isolation_level: IsolationLevel,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub modified_pages: std::collections::HashSet<u32>,
    pub undo_log: Vec<(PageId, Vec<u8>)>,
    pub redo_log: Vec<(PageId, Vec<u8>)>,
    pub read_set: std::collections::HashSet<u32>,
    pub write_set: std::collections::HashSet<u32>,
    pub wal_txn_id: Option<u32>,
}

impl Transaction {
    fn new(id: u64, isolation_level: IsolationLevel, wal_txn_id: Option<u32>) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            isolation_level,
            start_time: Utc::now(),
            end_time: None,
            modified_pages: std::collections::HashSet::new(),
            undo_log: Vec::new(),
            redo_log: Vec::new(),
            read_set: std::collections::HashSet::new(),
            write_set: std::collections::HashSet::new(),
            wal_txn_id,
        }
    }
}

/// One committed or in-progress version of a page, kept for MVCC
/// visibility checks. `timestamp` is the wall-clock time the write was
/// recorded, not the commit time.
#[derive(Clone)]
struct PageVersion {
    txn_id: u64,
    data: Vec<u8>,
    timestamp: DateTime<Utc>,
}

/// Bounded record of a finished transaction, mirroring the persisted
/// `transaction_history.json` shape.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TransactionHistoryEntry {
    pub txn_id: u64,
    pub state: String,
    pub isolation_level: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

const MAX_HISTORY: usize = 1000;

/// Statistics snapshot mirroring the original's `get_statistics()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionManagerStats {
    pub active_transactions: usize,
    pub next_txn_id: u64,
    pub total_commits: u64,
    pub total_rollbacks: u64,
    pub version_count: usize,
}

struct Inner {
    transactions: HashMap<u64, Transaction>,
    page_versions: HashMap<u32, Vec<PageVersion>>,
    history: Vec<TransactionHistoryEntry>,
    total_commits: u64,
    total_rollbacks: u64,
}

/// Coordinates transaction lifecycle, locking, and MVCC visibility on
/// top of a [`LockManager`]. Callers apply the physical page reads and
/// writes (via the storage manager); this type only tracks the logs and
/// version chains needed to undo them and decide what's visible.
pub struct TransactionManager {
    inner: Mutex<Inner>,
    lock_manager: LockManager,
    next_txn_id: AtomicU64,
}

impl TransactionManager {
    pub fn new(lock_manager: LockManager) -> Self {
        Self {
            inner: Mutex::new(Inner {
                transactions: HashMap::new(),
                page_versions: HashMap::new(),
                history: Vec::new(),
                total_commits: 0,
                total_rollbacks: 0,
            }),
            lock_manager,
            next_txn_id: AtomicU64::new(1),
        }
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    /// Start a new transaction and return its id.
    pub fn begin(&self, isolation_level: IsolationLevel) -> u64 {
        self.begin_with_wal(isolation_level, None)
    }

    /// Start a new transaction, recording the WAL-assigned transaction
    /// id it was given (if WAL logging is enabled by the caller).
    pub fn begin_with_wal(&self, isolation_level: IsolationLevel, wal_txn_id: Option<u32>) -> u64 {
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Transaction::new(id, isolation_level, wal_txn_id);
        self.inner.lock().transactions.insert(id, txn);
        id
    }

    fn with_active_txn<F, T>(&self, txn_id: u64, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction) -> Result<T>,
    {
        let mut inner = self.inner.lock();
        let txn = inner
            .transactions
            .get_mut(&txn_id)
            .ok_or(Error::TransactionNotFound(txn_id))?;
        if txn.state != TransactionState::Active {
            return Err(Error::TransactionNotActive(txn_id));
        }
        f(txn)
    }

    /// Acquire an exclusive lock on `page` for `txn_id` and, on first
    /// touch, save `current_data` as its undo image.
    pub fn prepare_write(&self, txn_id: u64, page: PageId, current_data: impl FnOnce() -> Result<Vec<u8>>) -> Result<()> {
        self.lock_manager.acquire(txn_id, page, LockMode::Exclusive)?;

        let result = self.with_active_txn(txn_id, |txn| {
            if txn.modified_pages.insert(page.0) {
                txn.undo_log.push((page, current_data()?));
            }
            txn.write_set.insert(page.0);
            Ok(())
        });

        if result.is_err() {
            self.lock_manager.release_transaction_locks(txn_id);
        }
        result
    }

    /// Record the new page contents after a write has been applied,
    /// appending a redo entry and an MVCC version.
    pub fn record_write(&self, txn_id: u64, page: PageId, new_data: Vec<u8>) -> Result<()> {
        let mut inner = self.inner.lock();
        let txn = inner
            .transactions
            .get_mut(&txn_id)
            .ok_or(Error::TransactionNotFound(txn_id))?;
        txn.redo_log.push((page, new_data.clone()));

        let versions = inner.page_versions.entry(page.0).or_default();
        versions.push(PageVersion {
            txn_id,
            data: new_data,
            timestamp: Utc::now(),
        });
        if versions.len() > MAX_PAGE_VERSIONS {
            let drop = versions.len() - MAX_PAGE_VERSIONS;
            versions.drain(0..drop);
        }
        Ok(())
    }

    /// Acquire a shared lock on `page` for `txn_id` (skipped under
    /// READ UNCOMMITTED) and add it to the read set.
    pub fn prepare_read(&self, txn_id: u64, page: PageId) -> Result<()> {
        let isolation = self.with_active_txn(txn_id, |txn| Ok(txn.isolation_level))?;

        if isolation != IsolationLevel::ReadUncommitted {
            self.lock_manager.acquire(txn_id, page, LockMode::Shared)?;
        }

        self.with_active_txn(txn_id, |txn| {
            txn.read_set.insert(page.0);
            Ok(())
        })
    }

    /// Return the MVCC-visible version of `page` for `txn_id`, if any.
    /// `None` means the caller should fall through to the physical page.
    pub fn get_visible_data(&self, txn_id: u64, page: PageId) -> Option<Vec<u8>> {
        let inner = self.inner.lock();
        let txn = inner.transactions.get(&txn_id)?;
        let versions = inner.page_versions.get(&page.0)?;

        match txn.isolation_level {
            IsolationLevel::ReadUncommitted => versions.last().map(|v| v.data.clone()),
            IsolationLevel::ReadCommitted => versions.iter().rev().find_map(|v| {
                if v.txn_id == txn_id || !inner.transactions.contains_key(&v.txn_id) {
                    Some(v.data.clone())
                } else {
                    None
                }
            }),
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable => versions
                .iter()
                .rev()
                .find(|v| v.timestamp <= txn.start_time)
                .map(|v| v.data.clone()),
        }
    }

    /// Commit `txn_id`. `flush_page` is invoked for every page the
    /// transaction touched; `log_commit` runs once every page has
    /// flushed and must durably write (and force-sync) the transaction's
    /// COMMIT log record — it is called before locks are released or the
    /// transaction is removed from the active table, so that the COMMIT
    /// record precedes both, per `spec.md` §5's ordering guarantee. If
    /// `flush_page` or `log_commit` fails, every page this transaction
    /// touched is restored via `restore_page` (the same role the
    /// caller's `rollback` closure plays) before commit fails, so a
    /// partially-flushed transaction never leaves some of its pages
    /// changed and others not.
    pub fn commit<F, G, L>(&self, txn_id: u64, mut flush_page: F, restore_page: G, log_commit: L) -> Result<()>
    where
        F: FnMut(PageId) -> Result<()>,
        G: FnMut(PageId, &[u8]) -> Result<()>,
        L: FnOnce() -> Result<()>,
    {
        let modified: Vec<u32> = {
            let mut inner = self.inner.lock();
            let txn = inner
                .transactions
                .get_mut(&txn_id)
                .ok_or(Error::TransactionNotFound(txn_id))?;
            if txn.state != TransactionState::Active {
                return Err(Error::TransactionNotActive(txn_id));
            }
            txn.state = TransactionState::Preparing;
            txn.modified_pages.iter().copied().collect()
        };

        for page in &modified {
            if let Err(e) = flush_page(PageId::new(*page)) {
                let _ = self.rollback(txn_id, restore_page);
                return Err(Error::CommitFailed(txn_id, e.to_string()));
            }
        }

        if let Err(e) = log_commit() {
            let _ = self.rollback(txn_id, restore_page);
            return Err(Error::CommitFailed(txn_id, e.to_string()));
        }

        let mut inner = self.inner.lock();
        let mut txn = inner
            .transactions
            .remove(&txn_id)
            .ok_or(Error::TransactionNotFound(txn_id))?;
        txn.state = TransactionState::Committed;
        txn.end_time = Some(Utc::now());
        self.lock_manager.release_transaction_locks(txn_id);
        inner.total_commits += 1;
        push_history(&mut inner.history, &txn);
        Ok(())
    }

    /// Roll back `txn_id`: restore its undo log in reverse order, strip
    /// its MVCC version entries, release its locks.
    pub fn rollback<F>(&self, txn_id: u64, mut restore_page: F) -> Result<()>
    where
        F: FnMut(PageId, &[u8]) -> Result<()>,
    {
        let (undo_log, modified_pages) = {
            let mut inner = self.inner.lock();
            let txn = inner
                .transactions
                .get_mut(&txn_id)
                .ok_or(Error::TransactionNotFound(txn_id))?;
            if txn.state == TransactionState::Committed {
                return Err(Error::TransactionNotActive(txn_id));
            }
            txn.state = TransactionState::Aborted;
            (txn.undo_log.clone(), txn.modified_pages.clone())
        };

        for (page, before_image) in undo_log.iter().rev() {
            if let Err(e) = restore_page(*page, before_image) {
                log::warn!("failed to restore page {} during rollback of txn {}: {e}", page.0, txn_id);
            }
        }

        let mut inner = self.inner.lock();
        for page in &modified_pages {
            if let Some(versions) = inner.page_versions.get_mut(page) {
                versions.retain(|v| v.txn_id != txn_id);
            }
        }

        let mut txn = inner
            .transactions
            .remove(&txn_id)
            .expect("transaction present under same lock held above");
        txn.end_time = Some(Utc::now());
        self.lock_manager.release_transaction_locks(txn_id);
        inner.total_rollbacks += 1;
        push_history(&mut inner.history, &txn);
        Ok(())
    }

    /// Roll back every currently-active transaction, used at shutdown.
    pub fn abort_all<F>(&self, mut restore_page: F) -> Vec<u64>
    where
        F: FnMut(PageId, &[u8]) -> Result<()>,
    {
        let ids: Vec<u64> = self.inner.lock().transactions.keys().copied().collect();
        for id in &ids {
            let _ = self.rollback(*id, &mut restore_page);
        }
        ids
    }

    pub fn get_active_transactions(&self) -> Vec<u64> {
        self.inner.lock().transactions.keys().copied().collect()
    }

    pub fn stats(&self) -> TransactionManagerStats {
        let inner = self.inner.lock();
        TransactionManagerStats {
            active_transactions: inner.transactions.len(),
            next_txn_id: self.next_txn_id.load(Ordering::SeqCst),
            total_commits: inner.total_commits,
            total_rollbacks: inner.total_rollbacks,
            version_count: inner.page_versions.values().map(Vec::len).sum(),
        }
    }
}

fn push_history(history: &mut Vec<TransactionHistoryEntry>, txn: &Transaction) {
    history.push(TransactionHistoryEntry {
        txn_id: txn.id,
        state: format!("{:?}", txn.state),
        isolation_level: format!("{:?}", txn.isolation_level),
        start_time: txn.start_time,
        end_time: txn.end_time,
    });
    if history.len() > MAX_HISTORY {
        let drop = history.len() - MAX_HISTORY;
        history.drain(0..drop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TransactionManager {
        TransactionManager::new(LockManager::with_timeout(std::time::Duration::from_millis(200)))
    }

    #[test]
    fn test_begin_assigns_increasing_ids() {
        let tm = manager();
        let a = tm.begin(IsolationLevel::ReadCommitted);
        let b = tm.begin(IsolationLevel::ReadCommitted);
        assert!(b > a);
    }

    #[test]
    fn test_prepare_write_saves_undo_once() {
        let tm = manager();
        let txn = tm.begin(IsolationLevel::ReadCommitted);
        let page = PageId::new(1);
        tm.prepare_write(txn, page, || Ok(vec![0u8; 4])).unwrap();
        tm.prepare_write(txn, page, || panic!("should not re-read undo")).unwrap();
    }

    #[test]
    fn test_commit_flushes_modified_pages_and_releases_locks() {
        let tm = manager();
        let txn = tm.begin(IsolationLevel::ReadCommitted);
        let page = PageId::new(1);
        tm.prepare_write(txn, page, || Ok(vec![0u8; 4])).unwrap();
        tm.record_write(txn, page, vec![1, 2, 3, 4]).unwrap();

        let mut flushed = Vec::new();
        tm.commit(
            txn,
            |p| {
                flushed.push(p);
                Ok(())
            },
            |_, _| Ok(()),
            || Ok(()),
        )
        .unwrap();

        assert_eq!(flushed, vec![page]);
        assert!(tm.get_active_transactions().is_empty());
        assert_eq!(tm.stats().total_commits, 1);
    }

    #[test]
    fn test_commit_failure_restores_already_flushed_pages() {
        let tm = manager();
        let txn = tm.begin(IsolationLevel::ReadCommitted);
        let p1 = PageId::new(1);
        let p2 = PageId::new(2);
        tm.prepare_write(txn, p1, || Ok(vec![1])).unwrap();
        tm.record_write(txn, p1, vec![11]).unwrap();
        tm.prepare_write(txn, p2, || Ok(vec![2])).unwrap();
        tm.record_write(txn, p2, vec![22]).unwrap();

        let mut restored = Vec::new();
        let err = tm
            .commit(
                txn,
                |p| if p == p2 { Err(Error::Corrupt("disk full".into())) } else { Ok(()) },
                |page, data| {
                    restored.push((page, data.to_vec()));
                    Ok(())
                },
                || Ok(()),
            )
            .unwrap_err();

        assert!(matches!(err, Error::CommitFailed(id, _) if id == txn));
        // Both pages' before-images are restored, not just the one that
        // never got a chance to flush: the transaction's whole undo log
        // is unwound on commit failure, same as a normal rollback.
        assert_eq!(restored, vec![(p2, vec![2]), (p1, vec![1])]);
        assert!(tm.get_active_transactions().is_empty());
    }

    #[test]
    fn test_log_commit_runs_before_locks_release() {
        let tm = manager();
        let txn = tm.begin(IsolationLevel::ReadCommitted);
        let page = PageId::new(1);
        tm.prepare_write(txn, page, || Ok(vec![0])).unwrap();
        tm.record_write(txn, page, vec![1]).unwrap();

        let mut log_written = false;
        tm.commit(
            txn,
            |_| Ok(()),
            |_, _| Ok(()),
            || {
                log_written = true;
                assert!(tm.get_active_transactions().contains(&txn));
                Ok(())
            },
        )
        .unwrap();

        assert!(log_written);
    }

    #[test]
    fn test_rollback_restores_undo_log_in_reverse_order() {
        let tm = manager();
        let txn = tm.begin(IsolationLevel::ReadCommitted);
        let p1 = PageId::new(1);
        let p2 = PageId::new(2);
        tm.prepare_write(txn, p1, || Ok(vec![1])).unwrap();
        tm.prepare_write(txn, p2, || Ok(vec![2])).unwrap();

        let mut restored = Vec::new();
        tm.rollback(txn, |page, data| {
            restored.push((page, data.to_vec()));
            Ok(())
        })
        .unwrap();

        assert_eq!(restored, vec![(p2, vec![2]), (p1, vec![1])]);
        assert_eq!(tm.stats().total_rollbacks, 1);
    }

    #[test]
    fn test_read_uncommitted_sees_latest_uncommitted_version() {
        let tm = manager();
        let writer = tm.begin(IsolationLevel::ReadCommitted);
        let reader = tm.begin(IsolationLevel::ReadUncommitted);
        let page = PageId::new(1);

        tm.prepare_write(writer, page, || Ok(vec![0])).unwrap();
        tm.record_write(writer, page, vec![9, 9]).unwrap();

        assert_eq!(tm.get_visible_data(reader, page), Some(vec![9, 9]));
    }

    #[test]
    fn test_read_committed_does_not_see_uncommitted_write() {
        let tm = manager();
        let writer = tm.begin(IsolationLevel::ReadCommitted);
        let reader = tm.begin(IsolationLevel::ReadCommitted);
        let page = PageId::new(1);

        tm.prepare_write(writer, page, || Ok(vec![0])).unwrap();
        tm.record_write(writer, page, vec![9, 9]).unwrap();

        assert_eq!(tm.get_visible_data(reader, page), None);
    }

    #[test]
    fn test_repeatable_read_pins_snapshot_at_start_time() {
        let tm = manager();
        let page = PageId::new(1);
        let writer = tm.begin(IsolationLevel::ReadCommitted);
        tm.prepare_write(writer, page, || Ok(vec![0])).unwrap();
        tm.record_write(writer, page, vec![1]).unwrap();
        tm.commit(writer, |_| Ok(()), |_, _| Ok(()), || Ok(())).unwrap();

        let reader = tm.begin(IsolationLevel::RepeatableRead);

        let writer2 = tm.begin(IsolationLevel::ReadCommitted);
        tm.prepare_write(writer2, page, || Ok(vec![1])).unwrap();
        tm.record_write(writer2, page, vec![2]).unwrap();
        tm.commit(writer2, |_| Ok(()), |_, _| Ok(()), || Ok(())).unwrap();

        assert_eq!(tm.get_visible_data(reader, page), Some(vec![1]));
    }

    #[test]
    fn test_page_versions_capped_at_limit() {
        let tm = manager();
        let page = PageId::new(1);
        for i in 0..(MAX_PAGE_VERSIONS as u8 + 5) {
            let txn = tm.begin(IsolationLevel::ReadCommitted);
            tm.prepare_write(txn, page, || Ok(vec![0])).unwrap();
            tm.record_write(txn, page, vec![i]).unwrap();
            tm.commit(txn, |_| Ok(()), |_, _| Ok(()), || Ok(())).unwrap();
        }
        assert_eq!(tm.stats().version_count, MAX_PAGE_VERSIONS);
    }
}
