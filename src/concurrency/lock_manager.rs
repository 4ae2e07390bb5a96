//! Page-level two-phase lock manager (§4.7).
//!
//! One lock table entry per page: a set of shared holders plus at most
//! one exclusive holder. There is no deadlock detection — lock requests
//! busy-wait, yielding between polls, until granted or `timeout`
//! elapses; the caller (the transaction manager) maps a timeout into an
//! abort. This is the deliberate "deadlock avoidance by timeout"
//! tradeoff the original storage core makes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::common::config::DEFAULT_LOCK_TIMEOUT;
use crate::common::{Error, PageId, Result};

/// How much a granted lock restricts concurrent access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug, Default)]
struct LockEntry {
    s_holders: HashSet<u64>,
    x_holder: Option<u64>,
}

impl LockEntry {
    fn is_empty(&self) -> bool {
        self.s_holders.is_empty() && self.x_holder.is_none()
    }

    /// Does `txn_id` already hold a lock at least as strong as `mode`?
    fn already_holds(&self, txn_id: u64, mode: LockMode) -> bool {
        if self.x_holder == Some(txn_id) {
            return true;
        }
        mode == LockMode::Shared && self.s_holders.contains(&txn_id)
    }

    /// S-S compatible; S-X and X-X incompatible. A txn's own X lock
    /// satisfies its own S request (covered by `already_holds` above);
    /// an X request from the sole S-holder is a self-upgrade.
    fn can_grant(&self, txn_id: u64, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => self.x_holder.is_none() || self.x_holder == Some(txn_id),
            LockMode::Exclusive => {
                let other_s_holders = self.s_holders.iter().any(|&id| id != txn_id);
                !other_s_holders && (self.x_holder.is_none() || self.x_holder == Some(txn_id))
            }
        }
    }

    fn grant(&mut self, txn_id: u64, mode: LockMode) {
        match mode {
            LockMode::Shared => {
                self.s_holders.insert(txn_id);
            }
            LockMode::Exclusive => {
                self.s_holders.remove(&txn_id);
                self.x_holder = Some(txn_id);
            }
        }
    }

    fn release(&mut self, txn_id: u64) {
        self.s_holders.remove(&txn_id);
        if self.x_holder == Some(txn_id) {
            self.x_holder = None;
        }
    }
}

/// Snapshot of lock manager counters, mirroring the original's
/// `get_statistics()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockManagerStats {
    pub locks_granted: u64,
    pub locks_waited: u64,
    pub locks_timeout: u64,
    pub active_locks: usize,
    pub active_transactions: usize,
}

#[derive(Debug, Default)]
struct Counters {
    locks_granted: AtomicU64,
    locks_waited: AtomicU64,
    locks_timeout: AtomicU64,
}

/// How long a poll loop sleeps between retries while waiting for a lock.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Page-granularity S/X lock table guarded by a single mutex (`spec.md`
/// §5: "a single global mutex guards the table").
pub struct LockManager {
    locks: Mutex<HashMap<u32, LockEntry>>,
    txn_locks: Mutex<HashMap<u64, HashSet<(u32, LockMode)>>>,
    timeout: Duration,
    counters: Counters,
}

impl LockManager {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            txn_locks: Mutex::new(HashMap::new()),
            timeout,
            counters: Counters::default(),
        }
    }

    /// Acquire `mode` on `page` for `txn_id`. Busy-waits, yielding
    /// between attempts, until granted or the configured timeout
    /// elapses.
    ///
    /// # Errors
    /// `Error::LockTimeout` if the timeout elapses without a grant.
    pub fn acquire(&self, txn_id: u64, page: PageId, mode: LockMode) -> Result<()> {
        let start = Instant::now();
        let mut waited = false;

        loop {
            {
                let mut locks = self.locks.lock();
                let entry = locks.entry(page.0).or_default();

                if entry.already_holds(txn_id, mode) {
                    return Ok(());
                }

                if entry.can_grant(txn_id, mode) {
                    entry.grant(txn_id, mode);
                    self.txn_locks
                        .lock()
                        .entry(txn_id)
                        .or_default()
                        .insert((page.0, mode));
                    self.counters.locks_granted.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
            }

            if start.elapsed() >= self.timeout {
                self.counters.locks_timeout.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "lock timeout: txn {} waiting for {:?} on page {}",
                    txn_id,
                    mode,
                    page.0
                );
                return Err(Error::LockTimeout {
                    page: page.0,
                    txn: txn_id,
                });
            }

            if !waited {
                self.counters.locks_waited.fetch_add(1, Ordering::Relaxed);
                waited = true;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Drop every lock entry held by `txn_id`; lock-table rows left
    /// empty are removed.
    pub fn release_transaction_locks(&self, txn_id: u64) {
        let held = match self.txn_locks.lock().remove(&txn_id) {
            Some(held) => held,
            None => return,
        };

        let mut locks = self.locks.lock();
        for (page, _mode) in held {
            if let Some(entry) = locks.get_mut(&page) {
                entry.release(txn_id);
                if entry.is_empty() {
                    locks.remove(&page);
                }
            }
        }
    }

    pub fn stats(&self) -> LockManagerStats {
        let locks = self.locks.lock();
        let active_locks = locks
            .values()
            .map(|e| e.s_holders.len() + e.x_holder.is_some() as usize)
            .sum();
        LockManagerStats {
            locks_granted: self.counters.locks_granted.load(Ordering::Relaxed),
            locks_waited: self.counters.locks_waited.load(Ordering::Relaxed),
            locks_timeout: self.counters.locks_timeout.load(Ordering::Relaxed),
            active_locks,
            active_transactions: self.txn_locks.lock().len(),
        }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
