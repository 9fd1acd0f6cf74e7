//! Single-writer / multi-reader access to the roster store.
//!
//! [`AccessCoordinator`] exclusively owns the store's connections:
//! - one writer connection behind a mutex, so at most one `write` runs at a time
//! - an idle pool of read-only reader connections, so `read`s run concurrently
//!
//! File-backed stores run in WAL mode: every `read` sees the last committed
//! snapshot and never waits on the writer. In-memory stores share one
//! database through a shared-cache URI and gate reads with a readers/writer
//! lock instead, which gives the same atomicity at the cost of reads waiting
//! for an in-progress write.
//!
//! Migrations run inside [`AccessCoordinator::open`], so a coordinator that
//! exists is always serving a fully migrated schema.

use crate::config::{StoreConfig, StoreLocation};
use crate::error::Result;
use crate::storage::dispatch::{ChangeEpoch, ChangeObserver, Dispatcher};
use crate::storage::migrations::{MigrationReport, MigrationRegistry};
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::{debug, info};

/// Context for a write, handed to the write closure.
///
/// Records which rows the write touched so observers can tell what moved.
/// A non-empty list must name every table the write changed: observers of
/// other tables skip re-fetching. Leave it empty to have every observer
/// re-check.
#[derive(Debug)]
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// `(table, id)` pairs changed by this write.
    pub changes: Vec<(&'static str, i64)>,
}

impl MutationContext {
    #[must_use]
    pub fn new(op_name: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            changes: Vec::new(),
        }
    }

    /// Record a changed row.
    pub fn record_change(&mut self, table: &'static str, id: i64) {
        self.changes.push((table, id));
    }
}

/// Owner of the store; cheap to clone.
#[derive(Clone)]
pub struct AccessCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    target: String,
    config: StoreConfig,
    /// Reads take this shared, writes exclusive. Only used for in-memory stores.
    gate: Option<RwLock<()>>,
    writer: Mutex<Connection>,
    readers: Mutex<Vec<Connection>>,
    epoch: AtomicU64,
    dispatcher: Dispatcher,
}

impl std::fmt::Debug for AccessCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessCoordinator")
            .field("target", &self.inner.target)
            .field("epoch", &self.epoch())
            .finish_non_exhaustive()
    }
}

impl AccessCoordinator {
    /// Open a store and bring its schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened, or
    /// [`Error::Migration`](crate::Error::Migration) naming the failed step.
    /// No coordinator is returned for a partially migrated store.
    pub fn open(config: StoreConfig, registry: &MigrationRegistry) -> Result<Self> {
        let (target, gate) = match &config.location {
            StoreLocation::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                (path.to_string_lossy().to_string(), None)
            }
            StoreLocation::Memory => (
                format!("file:roster-{}?mode=memory&cache=shared", uuid::Uuid::new_v4()),
                Some(RwLock::new(())),
            ),
        };

        let mut writer = open_connection(&target, &config)?;
        if matches!(config.location, StoreLocation::File(_)) {
            let mode: String =
                writer.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!(journal_mode = %mode, "Journal mode set");
        }

        let report = registry.apply(&mut writer)?;
        info!(
            target = %target,
            applied = report.applied.len(),
            "Store opened"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                target,
                config,
                gate,
                writer: Mutex::new(writer),
                readers: Mutex::new(Vec::new()),
                epoch: AtomicU64::new(0),
                dispatcher: Dispatcher::spawn()?,
            }),
        })
    }

    /// Open a file-backed store with default tuning.
    ///
    /// # Errors
    ///
    /// See [`AccessCoordinator::open`].
    pub fn open_path(path: &Path, registry: &MigrationRegistry) -> Result<Self> {
        Self::open(StoreConfig::file(path), registry)
    }

    /// Open a private in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// See [`AccessCoordinator::open`].
    pub fn open_memory(registry: &MigrationRegistry) -> Result<Self> {
        Self::open(StoreConfig::memory(), registry)
    }

    /// Run `f` against a consistent snapshot of the store.
    ///
    /// Reads run concurrently with each other and never observe part of a
    /// write: `f` runs inside one deferred transaction, so every statement it
    /// issues sees the same committed state.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or a database error if no snapshot can be taken.
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let _gate = self.read_gate();
        let mut conn = self.checkout_reader()?;

        let result = match conn.transaction() {
            // Dropping the transaction rolls it back; reads have nothing to commit
            Ok(tx) => f(&tx),
            Err(e) => Err(e.into()),
        };

        self.checkin_reader(conn);
        result
    }

    /// Execute a mutation as a single transaction.
    ///
    /// This method:
    /// 1. Waits for exclusive write access
    /// 2. Begins an IMMEDIATE transaction
    /// 3. Executes the mutation closure
    /// 4. Commits (or rolls back on error)
    /// 5. Publishes a change epoch to observers
    ///
    /// Observers run on the dispatcher thread after this returns control of
    /// the writer, so a slow observer never delays the next write.
    ///
    /// # Errors
    ///
    /// Returns the closure's error or a database error. The transaction is
    /// rolled back on error and nothing is published.
    pub fn write<T, F>(&self, op: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>, &mut MutationContext) -> Result<T>,
    {
        let mut writer = self.lock_writer();
        let _gate = self.write_gate();

        let tx = writer.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut ctx = MutationContext::new(op);

        let result = f(&tx, &mut ctx)?;
        tx.commit()?;

        // Published under the writer lock so sequence order is commit order
        let seq = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(seq, op, changes = ctx.changes.len(), "Write committed");
        self.inner.dispatcher.publish(ChangeEpoch {
            seq,
            op: ctx.op_name,
            changes: ctx.changes,
        });

        Ok(result)
    }

    /// Apply a registry's pending migrations to the open store.
    ///
    /// Safe to call repeatedly; a fully applied registry changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Migration`](crate::Error::Migration) naming the failed step.
    pub fn apply_migrations(&self, registry: &MigrationRegistry) -> Result<MigrationReport> {
        let mut writer = self.lock_writer();
        let _gate = self.write_gate();

        let report = registry.apply(&mut writer)?;
        if report.any() {
            let seq = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            self.inner.dispatcher.publish(ChangeEpoch {
                seq,
                op: "migrate".to_string(),
                changes: Vec::new(),
            });
        }
        Ok(report)
    }

    /// Async variant of [`read`](Self::read) on the blocking pool.
    ///
    /// # Errors
    ///
    /// See [`read`](Self::read); also fails if the blocking task panics.
    pub async fn read_async<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.read(f)).await?
    }

    /// Async variant of [`write`](Self::write) on the blocking pool.
    ///
    /// # Errors
    ///
    /// See [`write`](Self::write); also fails if the blocking task panics.
    pub async fn write_async<T, F>(&self, op: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>, &mut MutationContext) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let this = self.clone();
        let op = op.to_string();
        tokio::task::spawn_blocking(move || this.write(&op, f)).await?
    }

    /// Sequence number of the last committed write.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    /// Block until every change published so far has reached observers.
    pub fn flush_notifications(&self) {
        self.inner.dispatcher.flush();
    }

    /// Register an observer for post-commit change epochs.
    pub fn observe(&self, observer: Weak<dyn ChangeObserver>) {
        self.inner.dispatcher.register(observer);
    }

    /// Ask observers to re-check current state without a write.
    pub(crate) fn request_refresh(&self, reason: &str) {
        self.inner.dispatcher.publish(ChangeEpoch {
            seq: self.epoch(),
            op: reason.to_string(),
            changes: Vec::new(),
        });
    }

    /// Number of live observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.dispatcher.observer_count()
    }

    /// Reader connections currently idle in the pool.
    #[must_use]
    pub fn idle_readers(&self) -> usize {
        self.inner
            .readers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn lock_writer(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-write unwinds through the transaction's drop, which rolls back
        self.inner.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_gate(&self) -> Option<RwLockReadGuard<'_, ()>> {
        self.inner
            .gate
            .as_ref()
            .map(|g| g.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write_gate(&self) -> Option<RwLockWriteGuard<'_, ()>> {
        self.inner
            .gate
            .as_ref()
            .map(|g| g.write().unwrap_or_else(PoisonError::into_inner))
    }

    fn checkout_reader(&self) -> Result<Connection> {
        let idle = self
            .inner
            .readers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        if let Some(conn) = idle {
            return Ok(conn);
        }

        let conn = open_connection(&self.inner.target, &self.inner.config)?;
        conn.pragma_update(None, "query_only", true)?;
        Ok(conn)
    }

    fn checkin_reader(&self, conn: Connection) {
        let mut readers = self.inner.readers.lock().unwrap_or_else(PoisonError::into_inner);
        if readers.len() < self.inner.config.max_idle_readers {
            readers.push(conn);
        }
    }
}

fn open_connection(target: &str, config: &StoreConfig) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        target,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(config.busy_timeout)?;
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::Person;
    use crate::storage::record::{self, Record};
    use crate::storage::schema::default_registry;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn memory() -> AccessCoordinator {
        AccessCoordinator::open_memory(&default_registry()).unwrap()
    }

    fn insert(coord: &AccessCoordinator, name: &str, age: i64) -> i64 {
        coord
            .write("insert", |tx, ctx| {
                let mut person = Person::new(name, age);
                let id = record::insert(tx, &mut person)?;
                ctx.record_change(Person::TABLE, id);
                Ok(id)
            })
            .unwrap()
    }

    fn count(coord: &AccessCoordinator) -> i64 {
        coord.read(|conn| record::count::<Person>(conn)).unwrap()
    }

    #[test]
    fn test_open_memory_is_migrated() {
        let coord = memory();
        let applied = coord.read(|conn| MigrationRegistry::applied(conn)).unwrap();
        assert!(applied.contains("Create people"));
        assert!(applied.contains("Add house"));
        assert_eq!(count(&coord), 0);
    }

    #[test]
    fn test_memory_stores_are_private() {
        let a = memory();
        let b = memory();
        insert(&a, "Harry", 30);
        assert_eq!(count(&a), 1);
        assert_eq!(count(&b), 0);
    }

    #[test]
    fn test_write_commits_and_advances_epoch() {
        let coord = memory();
        assert_eq!(coord.epoch(), 0);
        insert(&coord, "Harry", 30);
        insert(&coord, "Ron", 30);
        assert_eq!(coord.epoch(), 2);
        assert_eq!(count(&coord), 2);
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let coord = memory();
        let result: Result<()> = coord.write("partial", |tx, _ctx| {
            record::insert(tx, &mut Person::new("Harry", 30))?;
            record::insert(tx, &mut Person::new("Ron", 30))?;
            Err(Error::Other("abort".to_string()))
        });

        assert!(matches!(result, Err(Error::Other(_))));
        assert_eq!(count(&coord), 0);
        assert_eq!(coord.epoch(), 0);
    }

    #[test]
    fn test_reads_run_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let coord = AccessCoordinator::open_path(&dir.path().join("r.db"), &default_registry()).unwrap();
        insert(&coord, "Harry", 30);

        // Both readers must be inside `read` at once to pass the barrier
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let coord = coord.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    coord
                        .read(|conn| {
                            barrier.wait();
                            record::count::<Person>(conn)
                        })
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
        assert!(coord.idle_readers() >= 1);
    }

    #[test]
    fn test_wal_read_not_blocked_by_write() {
        let dir = tempfile::tempdir().unwrap();
        let coord = AccessCoordinator::open_path(&dir.path().join("w.db"), &default_registry()).unwrap();
        insert(&coord, "Harry", 30);

        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let writer = {
            let coord = coord.clone();
            thread::spawn(move || {
                coord
                    .write("slow", |tx, _ctx| {
                        record::insert(tx, &mut Person::new("Ron", 30))?;
                        started_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        Ok(())
                    })
                    .unwrap();
            })
        };

        started_rx.recv().unwrap();
        // The write is open and uncommitted: the reader sees the prior snapshot
        assert_eq!(count(&coord), 1);
        release_tx.send(()).unwrap();
        writer.join().unwrap();
        assert_eq!(count(&coord), 2);
    }

    #[test]
    fn test_no_torn_reads() {
        let coord = memory();
        let writer = {
            let coord = coord.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    coord
                        .write("pair", |tx, _ctx| {
                            record::insert(tx, &mut Person::new("A", 1))?;
                            thread::sleep(Duration::from_micros(200));
                            record::insert(tx, &mut Person::new("B", 2))?;
                            Ok(())
                        })
                        .unwrap();
                }
            })
        };

        // Every write inserts two rows; an odd count would be a torn read
        for _ in 0..200 {
            assert_eq!(count(&coord) % 2, 0);
        }
        writer.join().unwrap();
        assert_eq!(count(&coord), 100);
    }

    #[test]
    fn test_writes_are_serialized() {
        let coord = memory();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let coord = coord.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        coord
                            .write("bump", |tx, _ctx| {
                                let n = record::count::<Person>(tx)?;
                                record::insert(tx, &mut Person::new(format!("p{n}"), n))?;
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Each write saw the previous one's count, so no age repeats
        let ages: std::collections::HashSet<i64> = coord
            .read(|conn| Ok(record::fetch_all::<Person>(conn)?.into_iter().map(|p| p.age).collect()))
            .unwrap();
        assert_eq!(ages.len(), 100);
        assert_eq!(coord.epoch(), 100);
    }

    #[test]
    fn test_apply_migrations_idempotent() {
        let coord = memory();
        let report = coord.apply_migrations(&default_registry()).unwrap();
        assert!(!report.any());
        assert_eq!(report.skipped, 2);
        assert_eq!(coord.epoch(), 0);
    }

    #[test]
    fn test_failed_migration_prevents_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.db");
        let mut registry = default_registry();
        registry.register_sql("Broken", "ALTER TABLE nowhere ADD COLUMN x TEXT").unwrap();

        let err = AccessCoordinator::open_path(&path, &registry).unwrap_err();
        assert_eq!(err.failed_migration(), Some("Broken"));

        // Prior steps stayed applied; reopening with the good registry resumes cleanly
        let coord = AccessCoordinator::open_path(&path, &default_registry()).unwrap();
        let applied = coord.read(|conn| MigrationRegistry::applied(conn)).unwrap();
        assert_eq!(applied.len(), 2);
    }

    #[test]
    fn test_file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("p.db");
        {
            let coord = AccessCoordinator::open_path(&path, &default_registry()).unwrap();
            insert(&coord, "Harry", 30);
        }
        let coord = AccessCoordinator::open_path(&path, &default_registry()).unwrap();
        assert_eq!(count(&coord), 1);
    }

    #[tokio::test]
    async fn test_async_wrappers() {
        let coord = memory();
        let id = coord
            .write_async("insert", |tx, ctx| {
                let id = record::insert(tx, &mut Person::new("Luna", 29))?;
                ctx.record_change(Person::TABLE, id);
                Ok(id)
            })
            .await
            .unwrap();

        let person = coord
            .read_async(move |conn| record::fetch_one::<Person>(conn, id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(person.name, "Luna");
    }
}
