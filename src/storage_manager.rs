//! Storage Manager facade (§4.9): the single embedding surface tying
//! together tablespaces, the buffer pool, WAL, page-level 2PL/MVCC, and
//! the catalog. A REPL or network front end would sit on top of this
//! module; none ships in this crate.
//!
//! # Concurrency
//! Two plain [`parking_lot::Mutex`]es guard mutable state: `catalog`
//! and `state`. No call path ever needs to hold both at once while
//! re-entering either: [`StorageManager::run_statement`] locks
//! `catalog` only long enough to build a plan and clone an immutable
//! snapshot of it, then drops the lock before executing the plan (which
//! is the only place `state` gets touched by SQL execution). This gets
//! the coarse, always-serializable locking `spec.md` §5 asks for
//! without needing a literal re-entrant mutex or `RefCell`-wrapped
//! interior mutability.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::buffer::{BufferPoolManager, ReplacerPolicy, StatsSnapshot as BufferStatsSnapshot};
use crate::catalog::Catalog;
use crate::common::config::{DEFAULT_LOCK_TIMEOUT, PAGE_SIZE};
use crate::common::{Error, PageId, Result};
use crate::concurrency::{
    IsolationLevel, LockManager, LockManagerStats, TransactionManager, TransactionManagerStats,
};
use crate::execution::{build_plan, ExecutionContext, Row, RowId, Statement, TableAccess, Value};
use crate::storage::page::{Page, PageHeader, Slot};
use crate::storage::{
    ColumnType, ColumnValue, DiskManager, ExtentManager, Record, Schema, TableStorageCatalog,
    TablespaceManager,
};
use crate::wal::{LogRecordType, SyncMode, WalManager, WalStatsSnapshot};

const DEFAULT_BUFFER_POOL_SIZE: usize = 64;
const DEFAULT_TABLESPACE: &str = "default";

/// Tuning knobs for a [`StorageManager`]. See `spec.md` §4.9.
#[derive(Debug, Clone)]
pub struct StorageManagerConfig {
    /// Frame count for every tablespace's buffer pool.
    pub buffer_pool_size: usize,
    /// Eviction policy every tablespace's buffer pool is constructed with.
    pub replacer_policy: ReplacerPolicy,
    /// WAL durability mode.
    pub sync_mode: SyncMode,
    /// Period of the background dirty-page flush thread.
    pub auto_flush_interval: Duration,
    /// Isolation level used for autocommit statements and `BEGIN`
    /// without an explicit level.
    pub default_isolation: IsolationLevel,
    /// How long a lock wait blocks before `Error::LockTimeout`.
    pub lock_timeout: Duration,
}

impl Default for StorageManagerConfig {
    fn default() -> Self {
        Self {
            buffer_pool_size: DEFAULT_BUFFER_POOL_SIZE,
            replacer_policy: ReplacerPolicy::Adaptive,
            sync_mode: SyncMode::Flush,
            auto_flush_interval: Duration::from_secs(5),
            default_isolation: IsolationLevel::ReadCommitted,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// Everything the facade mutates besides the SQL catalog, guarded by
/// one lock so page, extent, table-storage, and WAL state never
/// observe each other mid-update.
struct StorageState {
    tablespaces: TablespaceManager,
    buffer_pools: HashMap<String, BufferPoolManager>,
    extents: HashMap<String, ExtentManager>,
    table_storage: TableStorageCatalog,
    wal: WalManager,
    /// Table name an `allocate_page` caller has scoped itself to, via
    /// [`StorageManager::with_table_context`]; consulted for
    /// extent-aware routing.
    table_context: Option<String>,
    /// The ambient transaction every `TableAccess` call runs under.
    /// Always `Some` while an `Operator` tree is executing: `execute`
    /// opens an implicit autocommit transaction around any statement
    /// that isn't already running inside an explicit one.
    current_txn: Option<u64>,
    /// Per-transaction record of which tablespace each touched page
    /// belongs to. `TransactionManager`'s commit/rollback closures only
    /// ever see a raw page id, so this is the only way the facade can
    /// route a flush/restore to the right buffer pool.
    txn_pages: HashMap<u64, Vec<(String, u32)>>,
}

/// Aggregated runtime statistics across every subsystem, for
/// diagnostics (`spec.md` §4.9).
#[derive(Debug, Clone)]
pub struct StorageManagerStats {
    pub buffer_pools: HashMap<String, BufferStatsSnapshot>,
    pub locks: LockManagerStats,
    pub transactions: TransactionManagerStats,
    pub wal: WalStatsSnapshot,
}

/// Result of [`StorageManager::execute`]: either the rows a data
/// statement produced, or an acknowledgement of a transaction-control
/// statement.
#[derive(Debug, Clone)]
pub enum ExecOutcome {
    Rows(Vec<Row>),
    TransactionStarted(u64),
    Committed,
    RolledBack,
    /// `SAVEPOINT` is accepted but not implemented: MVCC page versions
    /// only support whole-transaction commit/rollback, so there is no
    /// partial rollback point to return to. The name is echoed back so
    /// a caller can at least confirm the statement was accepted.
    SavepointNoted(String),
}

/// The stable embedding surface tying storage, WAL, concurrency
/// control, and the catalog together (`spec.md` §4.9).
pub struct StorageManager {
    state: Mutex<StorageState>,
    catalog: Mutex<Catalog>,
    txn_manager: TransactionManager,
    config: StorageManagerConfig,
    #[allow(dead_code)]
    data_dir: PathBuf,
    auto_flush_running: Arc<AtomicBool>,
}

impl StorageManager {
    /// Open (or create) a database rooted at `base_dir`: construct
    /// every subsystem, replay the WAL against the `default`
    /// tablespace's buffer pool, and start the background auto-flush
    /// thread.
    pub fn open(base_dir: impl AsRef<Path>, config: StorageManagerConfig) -> Result<Arc<Self>> {
        let data_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| Error::io(data_dir.display().to_string(), "create_dir_all", e))?;

        let tablespaces = TablespaceManager::new(&data_dir)?;
        let catalog = Catalog::new(&data_dir)?;
        let table_storage = TableStorageCatalog::new(&data_dir)?;
        let wal = WalManager::new(data_dir.join("wal"), config.sync_mode)?;

        let mut state = StorageState {
            tablespaces,
            buffer_pools: HashMap::new(),
            extents: HashMap::new(),
            table_storage,
            wal,
            table_context: None,
            current_txn: None,
            txn_pages: HashMap::new(),
        };

        ensure_tablespace_loaded(&mut state, &config, DEFAULT_TABLESPACE)?;

        {
            let default_bpm = state
                .buffer_pools
                .get(DEFAULT_TABLESPACE)
                .expect("default tablespace just loaded");
            let recovery = state.wal.recover(default_bpm)?;
            if recovery.records_analyzed > 0 {
                log::info!(
                    "WAL recovery: {} record(s) analyzed, {} page(s) redone, {} transaction(s) undone",
                    recovery.records_analyzed,
                    recovery.pages_redone,
                    recovery.transactions_undone,
                );
            }
        }

        let lock_manager = LockManager::with_timeout(config.lock_timeout);
        let manager = Arc::new(Self {
            state: Mutex::new(state),
            catalog: Mutex::new(catalog),
            txn_manager: TransactionManager::new(lock_manager),
            auto_flush_running: Arc::new(AtomicBool::new(true)),
            config,
            data_dir,
        });

        manager.spawn_auto_flush_thread();
        Ok(manager)
    }

    /// Spawn the background dirty-page flush timer. Grounded on the
    /// `Arc<AtomicBool>` + `thread::spawn` + `sleep` pattern used for
    /// the teacher's buffer pool writer: a `Weak` handle so the thread
    /// never keeps the manager alive past its last `Arc`, no
    /// `JoinHandle` kept around (the thread just exits once `running`
    /// goes false or the manager is dropped).
    fn spawn_auto_flush_thread(self: &Arc<Self>) {
        let weak: Weak<StorageManager> = Arc::downgrade(self);
        let running = Arc::clone(&self.auto_flush_running);
        let interval = self.config.auto_flush_interval;

        std::thread::spawn(move || {
            while running.load(Ordering::Acquire) {
                std::thread::sleep(interval);
                if !running.load(Ordering::Acquire) {
                    break;
                }
                match weak.upgrade() {
                    Some(manager) => {
                        if let Err(e) = manager.flush_all() {
                            log::warn!("auto-flush failed: {e}");
                        }
                    }
                    None => break,
                }
            }
        });
    }

    // ------------------------------------------------------------------
    // Non-transactional page access: the lowest-level entry points, for
    // callers (or tests) that want raw pages without going through SQL.
    // ------------------------------------------------------------------

    pub fn read_page(&self, tablespace: &str, page_id: PageId) -> Result<Box<[u8; PAGE_SIZE]>> {
        let mut state = self.state.lock();
        ensure_tablespace_loaded(&mut state, &self.config, tablespace)?;
        let bpm = state.buffer_pools.get(tablespace).expect("just loaded");
        Ok(bpm.fetch_page_read(page_id)?.snapshot())
    }

    pub fn write_page(&self, tablespace: &str, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut state = self.state.lock();
        ensure_tablespace_loaded(&mut state, &self.config, tablespace)?;
        let bpm = state.buffer_pools.get(tablespace).expect("just loaded");
        let mut guard = bpm.fetch_page_write(page_id)?;
        guard.restore(data);
        Ok(())
    }

    /// Allocate a new, canonically empty page in `tablespace`. If a
    /// call is scoped with [`StorageManager::with_table_context`], the
    /// allocation is routed through that table's extent.
    pub fn allocate_page(&self, tablespace: &str) -> Result<PageId> {
        let mut state = self.state.lock();
        ensure_tablespace_loaded(&mut state, &self.config, tablespace)?;
        let table_hint = state.table_context.clone().unwrap_or_else(|| "unknown".to_string());
        let tablespace_owned = tablespace.to_string();

        let page_id = {
            let bpm = state.buffer_pools.get(tablespace).expect("just loaded");
            bpm.with_disk_manager(|dm| {
                state
                    .extents
                    .entry(tablespace_owned.clone())
                    .or_insert_with(ExtentManager::new)
                    .allocate_page_smart(dm, &table_hint, &tablespace_owned)
            })?
        };

        let bpm = state.buffer_pools.get(tablespace).expect("just loaded");
        let mut guard = bpm.fetch_page_write(page_id)?;
        guard.set_header(&PageHeader::new_empty(PAGE_SIZE));
        Ok(page_id)
    }

    /// Scope `f` to `table`: `allocate_page` calls made inside `f` are
    /// routed through `table`'s extent instead of falling back to a
    /// direct, unhinted allocation.
    pub fn with_table_context<T>(&self, table: &str, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.state.lock().table_context = Some(table.to_string());
        let result = f(self);
        self.state.lock().table_context = None;
        result
    }

    // ------------------------------------------------------------------
    // Transactional page access
    // ------------------------------------------------------------------

    pub fn begin_transaction(&self, isolation: IsolationLevel) -> Result<u64> {
        let txn_id = self.txn_manager.begin(isolation);
        let mut state = self.state.lock();
        state.wal.log_txn_begin(txn_id as u32)?;
        state.txn_pages.insert(txn_id, Vec::new());
        Ok(txn_id)
    }

    pub fn read_page_transactional(&self, txn_id: u64, tablespace: &str, page_id: PageId) -> Result<Box<[u8; PAGE_SIZE]>> {
        self.txn_manager.prepare_read(txn_id, page_id)?;

        if let Some(visible) = self.txn_manager.get_visible_data(txn_id, page_id) {
            if visible.len() == PAGE_SIZE {
                let mut snapshot = [0u8; PAGE_SIZE];
                snapshot.copy_from_slice(&visible);
                return Ok(Box::new(snapshot));
            }
        }

        let mut state = self.state.lock();
        ensure_tablespace_loaded(&mut state, &self.config, tablespace)?;
        let bpm = state.buffer_pools.get(tablespace).expect("just loaded");
        Ok(bpm.fetch_page_read(page_id)?.snapshot())
    }

    pub fn write_page_transactional(
        &self,
        txn_id: u64,
        tablespace: &str,
        page_id: PageId,
        data: &[u8; PAGE_SIZE],
    ) -> Result<()> {
        self.mutate_page_transactional(txn_id, tablespace, page_id, |page| {
            page.restore(data);
            Ok(())
        })
    }

    /// Lock → undo-image → apply → redo/MVCC → WAL, in that order, for
    /// one page write under `txn_id`. Every transactional mutation in
    /// this module (page writes, row inserts/updates/deletes) funnels
    /// through here so that ordering is enforced in one place.
    fn mutate_page_transactional<T>(
        &self,
        txn_id: u64,
        tablespace: &str,
        page_id: PageId,
        mutate: impl FnOnce(&mut Page) -> Result<T>,
    ) -> Result<T> {
        let before_image = {
            let mut state = self.state.lock();
            ensure_tablespace_loaded(&mut state, &self.config, tablespace)?;
            let bpm = state.buffer_pools.get(tablespace).expect("just loaded");
            bpm.fetch_page_read(page_id)?.snapshot().to_vec()
        };

        self.txn_manager.prepare_write(txn_id, page_id, || Ok(before_image.clone()))?;

        let (result, after_image) = {
            let state = self.state.lock();
            let bpm = state.buffer_pools.get(tablespace).expect("loaded above");
            let mut guard = bpm.fetch_page_write(page_id)?;
            let result = mutate(&mut guard)?;
            (result, guard.snapshot().to_vec())
        };

        self.txn_manager.record_write(txn_id, page_id, after_image.clone())?;

        let mut state = self.state.lock();
        state.wal.log_page_write(txn_id as u32, page_id.0, after_image, Some(before_image))?;
        state
            .txn_pages
            .entry(txn_id)
            .or_default()
            .push((tablespace.to_string(), page_id.0));

        Ok(result)
    }

    pub fn commit_transaction(&self, txn_id: u64) -> Result<()> {
        let pages = {
            let mut state = self.state.lock();
            state.txn_pages.remove(&txn_id).unwrap_or_default()
        };
        let page_tablespaces: HashMap<u32, String> = pages.into_iter().map(|(ts, p)| (p, ts)).collect();

        // Shared by the flush path and the on-failure restore path
        // below; both just need a read-only view of which tablespace
        // each touched page lives in.
        let restore_page = |page_id: PageId, before_image: &[u8]| -> Result<()> {
            let tablespace = match page_tablespaces.get(&page_id.0) {
                Some(ts) => ts,
                None => return Ok(()),
            };
            if before_image.len() != PAGE_SIZE {
                return Err(Error::Corrupt(format!(
                    "commit: undo image for page {} has wrong length",
                    page_id.0
                )));
            }
            let mut snapshot = [0u8; PAGE_SIZE];
            snapshot.copy_from_slice(before_image);

            let state = self.state.lock();
            if let Some(bpm) = state.buffer_pools.get(tablespace) {
                let mut guard = bpm.fetch_page_write(page_id)?;
                guard.restore(&snapshot);
            }
            Ok(())
        };

        // Writes (and force-syncs) the COMMIT record before
        // `TransactionManager::commit` releases locks or drops the
        // transaction from the active table, per spec.md's ordering
        // guarantee that the COMMIT record precedes both lock release
        // and visibility of the commit to other transactions.
        let log_commit = || -> Result<()> {
            let mut state = self.state.lock();
            state.wal.log_txn_commit(txn_id as u32)?;
            state.wal.maybe_checkpoint(false)?;
            Ok(())
        };

        let result = self.txn_manager.commit(
            txn_id,
            |page_id| {
                let tablespace = page_tablespaces.get(&page_id.0).ok_or_else(|| {
                    Error::Corrupt(format!("commit: no tablespace recorded for page {}", page_id.0))
                })?;
                let state = self.state.lock();
                if let Some(bpm) = state.buffer_pools.get(tablespace) {
                    bpm.flush_page(page_id)?;
                }
                Ok(())
            },
            restore_page,
            log_commit,
        );

        if result.is_err() {
            let mut state = self.state.lock();
            let _ = state.wal.log_txn_abort(txn_id as u32);
        }
        result
    }

    pub fn rollback_transaction(&self, txn_id: u64) -> Result<()> {
        let pages = {
            let mut state = self.state.lock();
            state.txn_pages.remove(&txn_id).unwrap_or_default()
        };
        let page_tablespaces: HashMap<u32, String> = pages.into_iter().map(|(ts, p)| (p, ts)).collect();

        self.txn_manager.rollback(txn_id, |page_id, before_image| {
            let tablespace = match page_tablespaces.get(&page_id.0) {
                Some(ts) => ts,
                None => return Ok(()),
            };
            if before_image.len() != PAGE_SIZE {
                return Err(Error::Corrupt(format!(
                    "rollback: undo image for page {} has wrong length",
                    page_id.0
                )));
            }
            let mut snapshot = [0u8; PAGE_SIZE];
            snapshot.copy_from_slice(before_image);

            let state = self.state.lock();
            if let Some(bpm) = state.buffer_pools.get(tablespace) {
                let mut guard = bpm.fetch_page_write(page_id)?;
                guard.restore(&snapshot);
            }
            Ok(())
        })?;

        let mut state = self.state.lock();
        let _ = state.wal.log_txn_abort(txn_id as u32);
        Ok(())
    }

    /// Flush every loaded tablespace's dirty pages. Called by the
    /// auto-flush thread and by `shutdown`.
    pub fn flush_all(&self) -> Result<()> {
        let state = self.state.lock();
        for bpm in state.buffer_pools.values() {
            bpm.flush_all_pages()?;
        }
        Ok(())
    }

    /// Stop the auto-flush thread, roll back any transactions still
    /// active, flush every page, and force a final WAL checkpoint.
    ///
    /// Active transactions are rolled back one at a time through
    /// [`StorageManager::rollback_transaction`] rather than
    /// `TransactionManager::abort_all`: `abort_all` reuses one closure
    /// across every aborted transaction, but that closure only ever
    /// sees a raw page id, with no way to resolve which transaction (and
    /// so which tablespace) it belongs to once more than one is active.
    pub fn shutdown(&self) -> Result<()> {
        self.auto_flush_running.store(false, Ordering::Release);

        for txn_id in self.txn_manager.get_active_transactions() {
            if let Err(e) = self.rollback_transaction(txn_id) {
                log::warn!("failed to abort active transaction {txn_id} during shutdown: {e}");
            }
        }

        self.flush_all()?;

        let mut state = self.state.lock();
        state.wal.flush()?;
        state.wal.maybe_checkpoint(true)?;
        Ok(())
    }

    pub fn stats(&self) -> StorageManagerStats {
        let state = self.state.lock();
        let buffer_pools = state
            .buffer_pools
            .iter()
            .map(|(name, bpm)| (name.clone(), bpm.stats().snapshot()))
            .collect();

        StorageManagerStats {
            buffer_pools,
            locks: self.txn_manager.lock_manager().stats(),
            transactions: self.txn_manager.stats(),
            wal: state.wal.stats(),
        }
    }

    // ------------------------------------------------------------------
    // SQL execution
    // ------------------------------------------------------------------

    /// Execute one statement. `Begin`/`Commit`/`Rollback`/`Savepoint`
    /// are handled here directly (the plan builder rejects them, per
    /// `spec.md` §4.11); every other statement runs inside whatever
    /// transaction is already open, or, if none is, an implicit one
    /// that is committed on success and rolled back on error.
    pub fn execute(&self, stmt: &Statement) -> Result<ExecOutcome> {
        match stmt {
            Statement::Begin { isolation } => {
                if self.state.lock().current_txn.is_some() {
                    return Err(Error::IsolationViolation("a transaction is already active".to_string()));
                }
                let level = match isolation {
                    Some(name) => parse_isolation(name)?,
                    None => self.config.default_isolation,
                };
                let txn_id = self.begin_transaction(level)?;
                self.state.lock().current_txn = Some(txn_id);
                Ok(ExecOutcome::TransactionStarted(txn_id))
            }
            Statement::Commit => {
                let txn_id = self.take_current_txn()?;
                self.commit_transaction(txn_id)?;
                Ok(ExecOutcome::Committed)
            }
            Statement::Rollback => {
                let txn_id = self.take_current_txn()?;
                self.rollback_transaction(txn_id)?;
                Ok(ExecOutcome::RolledBack)
            }
            Statement::Savepoint { name } => Ok(ExecOutcome::SavepointNoted(name.clone())),
            other => match self.state.lock().current_txn {
                Some(_) => Ok(ExecOutcome::Rows(self.run_statement(other)?)),
                None => self.run_autocommit(other),
            },
        }
    }

    fn run_autocommit(&self, stmt: &Statement) -> Result<ExecOutcome> {
        let txn_id = self.begin_transaction(self.config.default_isolation)?;
        self.state.lock().current_txn = Some(txn_id);

        let outcome = self.run_statement(stmt);
        self.state.lock().current_txn = None;

        match outcome {
            Ok(rows) => {
                self.commit_transaction(txn_id)?;
                Ok(ExecOutcome::Rows(rows))
            }
            Err(e) => {
                let _ = self.rollback_transaction(txn_id);
                Err(e)
            }
        }
    }

    fn take_current_txn(&self) -> Result<u64> {
        self.state
            .lock()
            .current_txn
            .take()
            .ok_or_else(|| Error::IsolationViolation("no active transaction".to_string()))
    }

    /// Build a plan against the catalog, then clone the catalog and
    /// drop the lock before executing: `TableAccess` methods need their
    /// own catalog lookups (for a table's physical schema), and holding
    /// the lock across `Operator::execute` would deadlock against that
    /// on the same thread since `parking_lot::Mutex` isn't re-entrant.
    fn run_statement(&self, stmt: &Statement) -> Result<Vec<Row>> {
        let (plan, catalog_snapshot) = {
            let mut catalog = self.catalog.lock();
            let plan = build_plan(stmt, &mut catalog)?;
            (plan, catalog.clone())
        };

        let ctx = ExecutionContext {
            catalog: &catalog_snapshot,
            access: self,
        };
        plan.execute(&ctx)
    }

    fn current_txn(&self) -> Result<u64> {
        self.state
            .lock()
            .current_txn
            .ok_or_else(|| Error::IsolationViolation("no active transaction for table access".to_string()))
    }

    fn schema_for(&self, table: &str) -> Result<(Schema, String)> {
        let catalog = self.catalog.lock();
        let meta = catalog.get_table(table)?;
        Ok((meta.physical_schema()?, meta.tablespace.clone()))
    }

    /// Pick (and, if necessary, allocate) the page an insert into
    /// `table` should land on: the table's last page if it has room for
    /// `payload_len` more bytes, else a fresh page from the extent
    /// manager. Returns whether the page is newly allocated, so the
    /// caller knows to stamp a canonical empty header on it.
    fn page_for_insert(&self, table: &str, tablespace: &str, payload_len: usize) -> Result<(PageId, bool)> {
        let mut state = self.state.lock();
        let pages = match state.table_storage.pages_for(table) {
            Ok(p) => p,
            Err(Error::TableNotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };

        if let Some(&last) = pages.last() {
            let bpm = state
                .buffer_pools
                .get(tablespace)
                .ok_or_else(|| Error::InvalidSchema(format!("tablespace '{tablespace}' not loaded")))?;
            let fits = {
                let guard = bpm.fetch_page_read(last)?;
                let header = guard.header();
                let slot_dir_end = PageHeader::SIZE + (header.record_count as usize + 1) * Slot::SIZE;
                (header.free_space_start as usize).saturating_sub(payload_len) >= slot_dir_end
            };
            if fits {
                return Ok((last, false));
            }
        }

        let is_first_page = pages.is_empty();
        let tablespace_owned = tablespace.to_string();
        let table_owned = table.to_string();

        let new_page_id = {
            let bpm = state
                .buffer_pools
                .get(tablespace)
                .ok_or_else(|| Error::InvalidSchema(format!("tablespace '{tablespace}' not loaded")))?;
            bpm.with_disk_manager(|dm| {
                state
                    .extents
                    .entry(tablespace_owned.clone())
                    .or_insert_with(ExtentManager::new)
                    .allocate_page_smart(dm, &table_owned, &tablespace_owned)
            })?
        };

        if is_first_page {
            state.table_storage.register_table(table, tablespace, new_page_id)?;
        } else {
            state.table_storage.add_page(table, new_page_id)?;
        }

        Ok((new_page_id, true))
    }
}

fn ensure_tablespace_loaded(state: &mut StorageState, config: &StorageManagerConfig, tablespace: &str) -> Result<()> {
    if state.buffer_pools.contains_key(tablespace) {
        return Ok(());
    }
    let path = state
        .tablespaces
        .get_file_path(tablespace)
        .ok_or_else(|| Error::InvalidSchema(format!("unknown tablespace '{tablespace}'")))?;
    let dm = DiskManager::open_or_create(&path)?;
    let bpm = BufferPoolManager::with_policy(config.buffer_pool_size, dm, config.replacer_policy);
    state.buffer_pools.insert(tablespace.to_string(), bpm);
    state.extents.entry(tablespace.to_string()).or_insert_with(ExtentManager::new);
    Ok(())
}

fn parse_isolation(name: &str) -> Result<IsolationLevel> {
    match name.to_uppercase().replace('_', " ").as_str() {
        "READ UNCOMMITTED" => Ok(IsolationLevel::ReadUncommitted),
        "READ COMMITTED" => Ok(IsolationLevel::ReadCommitted),
        "REPEATABLE READ" => Ok(IsolationLevel::RepeatableRead),
        "SERIALIZABLE" => Ok(IsolationLevel::Serializable),
        other => Err(Error::Unsupported(format!("unknown isolation level '{other}'"))),
    }
}

/// Coerce an execution-layer [`Value`] into the physical [`ColumnValue`]
/// its column's declared [`ColumnType`] expects. `Record::serialize`
/// itself performs no coercion (an exact variant mismatch is a hard
/// `TypeMismatch`), so every numeric/string widening the SQL layer
/// allows (`spec.md` §4.11: "VARCHAR<->CHAR and any numeric pair are
/// interchangeable") happens here instead.
fn value_to_column_value(value: &Value, col_type: &ColumnType, column_name: &str) -> Result<ColumnValue> {
    match (col_type, value) {
        (_, Value::Null) => Ok(ColumnValue::Null),
        (ColumnType::Int32, Value::Int64(i)) => Ok(ColumnValue::Int32(*i as i32)),
        (ColumnType::Int32, Value::Float64(f)) => Ok(ColumnValue::Int32(*f as i32)),
        (ColumnType::Float32, Value::Float64(f)) => Ok(ColumnValue::Float32(*f as f32)),
        (ColumnType::Float32, Value::Int64(i)) => Ok(ColumnValue::Float32(*i as f32)),
        (ColumnType::Bool, Value::Bool(b)) => Ok(ColumnValue::Bool(*b)),
        (ColumnType::Date, Value::Int64(i)) => Ok(ColumnValue::Date(*i as u64)),
        (ColumnType::Varchar(_), Value::String(s)) => Ok(ColumnValue::Varchar(s.clone())),
        _ => Err(Error::TypeMismatch(format!(
            "column '{column_name}' ({col_type:?}) cannot hold value {value:?}"
        ))),
    }
}

fn row_to_record_values(row: &Row, schema: &Schema) -> Result<Vec<ColumnValue>> {
    schema
        .iter()
        .map(|col| {
            let value = row.get(&col.name).cloned().unwrap_or(Value::Null);
            value_to_column_value(&value, &col.col_type, &col.name)
        })
        .collect()
}

fn record_to_row(values: &[ColumnValue], schema: &Schema) -> Row {
    schema
        .iter()
        .zip(values.iter())
        .map(|(col, v)| (col.name.clone(), Value::from(v)))
        .collect()
}

impl TableAccess for StorageManager {
    fn scan_table(&self, table: &str) -> Result<Vec<(RowId, Row)>> {
        let (schema, tablespace) = self.schema_for(table)?;
        let state = self.state.lock();
        let pages = match state.table_storage.pages_for(table) {
            Ok(p) => p,
            Err(Error::TableNotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let bpm = state
            .buffer_pools
            .get(&tablespace)
            .ok_or_else(|| Error::InvalidSchema(format!("tablespace '{tablespace}' not loaded")))?;

        let mut rows = Vec::new();
        for page_id in pages {
            let guard = bpm.fetch_page_read(page_id)?;
            for (slot_idx, bytes) in guard.get_data_blocks_from_page().into_iter().enumerate() {
                if bytes.is_empty() {
                    continue;
                }
                if let Record::Live(values) = Record::deserialize(&bytes, &schema)? {
                    rows.push(((page_id.0, slot_idx as u16), record_to_row(&values, &schema)));
                }
            }
        }
        Ok(rows)
    }

    fn insert_row(&self, table: &str, row: &Row) -> Result<RowId> {
        let (schema, tablespace) = self.schema_for(table)?;
        let values = row_to_record_values(row, &schema)?;
        let bytes = Record::serialize(&values, &schema)?;
        let txn_id = self.current_txn()?;

        let (page_id, is_new) = self.page_for_insert(table, &tablespace, bytes.len())?;

        let slot_idx = self.mutate_page_transactional(txn_id, &tablespace, page_id, |page| {
            if is_new {
                page.set_header(&PageHeader::new_empty(PAGE_SIZE));
            }
            if page.add_data_to_page(&bytes)? {
                Ok(page.header().record_count - 1)
            } else {
                Err(Error::Corrupt(format!(
                    "page {} unexpectedly out of room for insert into '{table}'",
                    page_id.0
                )))
            }
        })?;

        Ok((page_id.0, slot_idx))
    }

    fn update_row(&self, table: &str, row_id: RowId, row: &Row) -> Result<()> {
        let (schema, tablespace) = self.schema_for(table)?;
        let values = row_to_record_values(row, &schema)?;
        let bytes = Record::serialize(&values, &schema)?;
        let txn_id = self.current_txn()?;
        let page_id = PageId::new(row_id.0);
        let slot_idx = row_id.1 as usize;

        self.mutate_page_transactional(txn_id, &tablespace, page_id, |page| {
            if page.overwrite_slot(slot_idx, &bytes)? {
                Ok(())
            } else {
                Err(Error::Corrupt(format!(
                    "update: slot {slot_idx} out of range on page {}",
                    page_id.0
                )))
            }
        })
    }

    fn delete_row(&self, table: &str, row_id: RowId) -> Result<()> {
        let (_, tablespace) = self.schema_for(table)?;
        let txn_id = self.current_txn()?;
        let page_id = PageId::new(row_id.0);
        let slot_idx = row_id.1 as usize;
        let tombstone = Record::serialize_tombstone();

        // In-place tombstoning, not `remove_data_from_page`: a batch
        // DELETE collects every matching `RowId` from one `scan_table`
        // call up front, then mutates them one at a time. Physical
        // removal repacks the page and shifts every later slot down by
        // one, which would invalidate the remaining `RowId`s in that
        // same batch.
        self.mutate_page_transactional(txn_id, &tablespace, page_id, |page| {
            if page.overwrite_slot(slot_idx, &tombstone)? {
                Ok(())
            } else {
                Err(Error::Corrupt(format!(
                    "delete: slot {slot_idx} out of range on page {}",
                    page_id.0
                )))
            }
        })
    }

    fn create_table(&self, table: &str, tablespace: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.tablespaces.get_file_path(tablespace).is_none() {
            state.tablespaces.create(tablespace)?;
        }
        ensure_tablespace_loaded(&mut state, &self.config, tablespace)?;
        state.wal.log_ddl(LogRecordType::TableCreate, table)?;
        Ok(())
    }

    fn drop_table(&self, table: &str) -> Result<()> {
        let mut state = self.state.lock();

        let tablespace = match state.table_storage.tablespace_for(table) {
            Ok(ts) => ts.to_string(),
            Err(_) => {
                // Created but never had a row inserted: nothing physical
                // to reclaim.
                state.wal.log_ddl(LogRecordType::TableDrop, table)?;
                return Ok(());
            }
        };
        let pages = state.table_storage.pages_for(table)?;

        if let Some(bpm) = state.buffer_pools.get(&tablespace) {
            for page_id in &pages {
                let _ = bpm.delete_page(*page_id);
                bpm.with_disk_manager(|dm| match state.extents.get_mut(&tablespace) {
                    Some(extents) => {
                        let _ = extents.deallocate_page_smart(dm, *page_id);
                    }
                    None => {
                        let _ = dm.deallocate(*page_id);
                    }
                });
            }
        }

        state.table_storage.drop_table(table)?;
        state.wal.log_ddl(LogRecordType::TableDrop, table)?;
        Ok(())
    }
}
