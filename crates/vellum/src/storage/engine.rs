//! The local database engine: named, versioned, transactional, indexed.
//!
//! Tables hold flat JSON row documents under an auto-incremented primary
//! key, with unique, non-unique, and compound secondary indexes. Writers are
//! serialized through one lock; a write transaction applies mutations
//! immediately under that lock while recording an undo log, so dropping an
//! uncommitted transaction (or a failed persist) rolls everything back and
//! readers never observe a partial write. Committed transactions publish a
//! [`CommitNotice`] on a broadcast channel; the live-query bridge subscribes
//! to it.
//!
//! Disk-backed databases persist as one JSON snapshot per database, written
//! to a temp file and renamed into place. Opening a snapshot written by a
//! newer schema version fails with `SchemaTooNew`; older snapshots migrate
//! forward by creating the missing tables and indexes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info};

use vellum_api::{Result, StoreError};

use super::schema::{IndexSpec, Schema, TableSpec};

/// A row document: a flat JSON object, field names exactly as the entities
/// serialize them.
pub type RowData = serde_json::Map<String, serde_json::Value>;

/// Separator between the component values of a compound index key. A unit
/// separator cannot appear in a uuid, so joined keys never collide.
const KEY_SEP: &str = "\u{1f}";

/// How many commit notices the broadcast channel buffers before slow
/// subscribers start lagging.
const COMMIT_CHANNEL_CAPACITY: usize = 256;

/// Build the lookup key for a compound index from its component values, in
/// declaration order.
pub fn compound_key(parts: &[&str]) -> String {
    parts.join(KEY_SEP)
}

fn unknown_table(name: &str) -> StoreError {
    StoreError::Schema {
        message: format!("unknown table: {name}"),
    }
}

fn unknown_index(table: &str, index: &str) -> StoreError {
    StoreError::Schema {
        message: format!("unknown index {index} on table {table}"),
    }
}

fn unique_violation(table: &str, key: &str) -> StoreError {
    StoreError::UniquenessViolation {
        table: table.to_string(),
        key: key.replace(KEY_SEP, "+"),
    }
}

/// Extract the index key of `row` under `spec`, or `None` when any indexed
/// field is missing or not a scalar (such rows are simply not indexed).
fn index_key(spec: &IndexSpec, row: &RowData) -> Option<String> {
    let mut parts = Vec::with_capacity(spec.fields.len());
    for field in &spec.fields {
        let part = match row.get(field) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(serde_json::Value::Bool(b)) => b.to_string(),
            _ => return None,
        };
        parts.push(part);
    }
    Some(parts.join(KEY_SEP))
}

// =============================================================================
// Index and Table - in-memory storage units
// =============================================================================

#[derive(Debug, Clone)]
struct Index {
    spec: IndexSpec,
    entries: BTreeMap<String, BTreeSet<u64>>,
}

impl Index {
    fn new(spec: IndexSpec) -> Self {
        Self {
            spec,
            entries: BTreeMap::new(),
        }
    }

    fn insert(&mut self, key: String, row_key: u64) {
        self.entries.entry(key).or_default().insert(row_key);
    }

    fn remove(&mut self, key: &str, row_key: u64) {
        if let Some(set) = self.entries.get_mut(key) {
            set.remove(&row_key);
            if set.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    /// Primary keys of the rows indexed under `key`, ascending.
    fn keys_for(&self, key: &str) -> Vec<u64> {
        self.entries
            .get(key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
struct Table {
    name: String,
    next_key: u64,
    rows: BTreeMap<u64, RowData>,
    indexes: BTreeMap<String, Index>,
}

impl Table {
    fn from_spec(spec: &TableSpec) -> Self {
        Self {
            name: spec.name.clone(),
            next_key: 1,
            rows: BTreeMap::new(),
            indexes: spec
                .indexes
                .iter()
                .map(|i| (i.name.clone(), Index::new(i.clone())))
                .collect(),
        }
    }

    fn index_row(&mut self, row_key: u64, row: &RowData) {
        for index in self.indexes.values_mut() {
            if let Some(key) = index_key(&index.spec, row) {
                index.insert(key, row_key);
            }
        }
    }

    fn unindex_row(&mut self, row_key: u64, row: &RowData) {
        for index in self.indexes.values_mut() {
            if let Some(key) = index_key(&index.spec, row) {
                index.remove(&key, row_key);
            }
        }
    }

    /// The first unique-index collision `row` would cause, ignoring
    /// `exclude` (the row being replaced), as `(index name, key)`.
    fn unique_collision(&self, row: &RowData, exclude: Option<u64>) -> Option<(String, String)> {
        for index in self.indexes.values() {
            if !index.spec.unique {
                continue;
            }
            if let Some(key) = index_key(&index.spec, row) {
                let occupied = index
                    .keys_for(&key)
                    .into_iter()
                    .any(|k| Some(k) != exclude);
                if occupied {
                    return Some((index.spec.name.clone(), key));
                }
            }
        }
        None
    }

    /// Rebuild every index from the row set. Used after loading a snapshot.
    fn rebuild_indexes(&mut self) -> Result<()> {
        let mut indexes = self.indexes.clone();
        for index in indexes.values_mut() {
            index.entries.clear();
        }
        for (&row_key, row) in &self.rows {
            for index in indexes.values_mut() {
                if let Some(key) = index_key(&index.spec, row) {
                    let set = index.entries.entry(key).or_default();
                    if index.spec.unique && !set.is_empty() {
                        return Err(StoreError::Storage {
                            message: format!(
                                "database file violates unique index {} in table {}",
                                index.spec.name, self.name
                            ),
                        });
                    }
                    set.insert(row_key);
                }
            }
        }
        self.indexes = indexes;
        Ok(())
    }
}

// =============================================================================
// Store - the shared mutable state behind the writer lock
// =============================================================================

#[derive(Debug)]
struct Store {
    version: u32,
    commit_seq: u64,
    tables: BTreeMap<String, Table>,
}

impl Store {
    fn fresh(schema: &Schema) -> Self {
        Self {
            version: schema.latest_version(),
            commit_seq: 0,
            tables: schema
                .tables()
                .iter()
                .map(|(name, spec)| (name.clone(), Table::from_spec(spec)))
                .collect(),
        }
    }

    fn from_persisted(mut persisted: PersistedDb, schema: &Schema) -> Result<Self> {
        let supported = schema.latest_version();
        if persisted.schema_version > supported {
            return Err(StoreError::SchemaTooNew {
                on_disk: persisted.schema_version,
                supported,
            });
        }
        let mut tables: BTreeMap<String, Table> = BTreeMap::new();
        for (name, spec) in schema.tables() {
            let mut table = Table::from_spec(spec);
            if let Some(pt) = persisted.tables.remove(name) {
                table.rows = pt.rows.into_iter().map(|r| (r.key, r.doc)).collect();
                let max_key = table.rows.keys().next_back().copied().unwrap_or(0);
                table.next_key = pt.next_key.max(max_key + 1);
                table.rebuild_indexes()?;
            }
            tables.insert(name.clone(), table);
        }
        // Tables present in the file but absent from the declared schema are
        // carried along untouched. The additive schema history should make
        // this unreachable, but a snapshot is user data and is never dropped.
        for (name, pt) in persisted.tables {
            debug!(table = %name, "keeping undeclared table from snapshot");
            let mut table = Table::from_spec(&TableSpec::new(name.clone()));
            table.rows = pt.rows.into_iter().map(|r| (r.key, r.doc)).collect();
            let max_key = table.rows.keys().next_back().copied().unwrap_or(0);
            table.next_key = pt.next_key.max(max_key + 1);
            tables.insert(name, table);
        }
        if persisted.schema_version < supported {
            info!(
                from = persisted.schema_version,
                to = supported,
                "migrating database schema"
            );
        }
        Ok(Self {
            version: supported,
            commit_seq: persisted.commit_seq,
            tables,
        })
    }

    fn to_persisted(&self) -> PersistedDb {
        PersistedDb {
            schema_version: self.version,
            commit_seq: self.commit_seq,
            tables: self
                .tables
                .iter()
                .map(|(name, table)| {
                    (
                        name.clone(),
                        PersistedTable {
                            next_key: table.next_key,
                            rows: table
                                .rows
                                .iter()
                                .map(|(&key, doc)| PersistedRow {
                                    key,
                                    doc: doc.clone(),
                                })
                                .collect(),
                        },
                    )
                })
                .collect(),
        }
    }
}

// =============================================================================
// Snapshot persistence
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct PersistedDb {
    schema_version: u32,
    commit_seq: u64,
    tables: BTreeMap<String, PersistedTable>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedTable {
    next_key: u64,
    rows: Vec<PersistedRow>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedRow {
    key: u64,
    doc: RowData,
}

#[derive(Debug)]
struct PersistTarget {
    path: PathBuf,
    tmp_path: PathBuf,
}

/// Write the snapshot atomically: temp file first, then rename over the
/// real path, so a crash mid-write leaves the previous snapshot intact.
async fn write_snapshot(target: &PersistTarget, bytes: Vec<u8>) -> Result<()> {
    tokio::fs::write(&target.tmp_path, &bytes)
        .await
        .map_err(|e| StoreError::Storage {
            message: format!("write {}: {e}", target.tmp_path.display()),
        })?;
    tokio::fs::rename(&target.tmp_path, &target.path)
        .await
        .map_err(|e| StoreError::Storage {
            message: format!("rename into {}: {e}", target.path.display()),
        })?;
    Ok(())
}

// =============================================================================
// CommitNotice - the change feed payload
// =============================================================================

/// Published on the commit broadcast channel after every committed write
/// transaction that actually changed something.
#[derive(Debug, Clone)]
pub struct CommitNotice {
    /// Monotonically increasing data version of the database.
    pub seq: u64,
    /// Names of the tables the transaction wrote to.
    pub tables: BTreeSet<String>,
}

impl CommitNotice {
    /// True when the notice touches any of the given tables.
    pub fn touches(&self, tables: &BTreeSet<String>) -> bool {
        self.tables.iter().any(|t| tables.contains(t))
    }
}

// =============================================================================
// Database handle
// =============================================================================

/// Handle to one named local database. Cheap to clone; every clone shares
/// the same store, writer lock, and commit feed.
#[derive(Clone)]
pub struct Database {
    name: String,
    store: Arc<RwLock<Store>>,
    commits: broadcast::Sender<CommitNotice>,
    persist: Option<Arc<PersistTarget>>,
}

impl Database {
    /// Open (or create) the disk-backed database `<dir>/<name>.json`.
    ///
    /// An existing snapshot is loaded and migrated forward to the latest
    /// declared schema version; a snapshot written by a newer version fails
    /// with [`StoreError::SchemaTooNew`]. The migrated (or fresh) snapshot
    /// is written back before the handle is returned.
    pub async fn open(dir: impl AsRef<Path>, name: &str, schema: Schema) -> Result<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StoreError::Storage {
                message: format!("create {}: {e}", dir.display()),
            })?;
        let path = dir.join(format!("{name}.json"));
        let tmp_path = dir.join(format!("{name}.json.tmp"));
        let store = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let persisted: PersistedDb =
                    serde_json::from_slice(&bytes).map_err(|e| StoreError::Storage {
                        message: format!("corrupt database file {}: {e}", path.display()),
                    })?;
                Store::from_persisted(persisted, &schema)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    database = name,
                    version = schema.latest_version(),
                    "creating fresh database"
                );
                Store::fresh(&schema)
            }
            Err(e) => {
                return Err(StoreError::Storage {
                    message: format!("read {}: {e}", path.display()),
                });
            }
        };
        let (commits, _) = broadcast::channel(COMMIT_CHANNEL_CAPACITY);
        let db = Self {
            name: name.to_string(),
            store: Arc::new(RwLock::new(store)),
            commits,
            persist: Some(Arc::new(PersistTarget { path, tmp_path })),
        };
        db.persist_current().await?;
        Ok(db)
    }

    /// Open a database that lives purely in memory. Used by tests and by
    /// callers that manage persistence themselves.
    pub fn open_in_memory(name: &str, schema: Schema) -> Self {
        let (commits, _) = broadcast::channel(COMMIT_CHANNEL_CAPACITY);
        Self {
            name: name.to_string(),
            store: Arc::new(RwLock::new(Store::fresh(&schema))),
            commits,
            persist: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Begin a read transaction: a consistent snapshot view of the whole
    /// database, held until the value is dropped.
    pub async fn begin_read(&self) -> ReadTxn {
        ReadTxn {
            guard: self.store.clone().read_owned().await,
        }
    }

    /// Begin a write transaction. Writers are serialized; the lock is held
    /// until commit or drop.
    pub async fn begin_write(&self) -> WriteTxn {
        WriteTxn {
            guard: self.store.clone().write_owned().await,
            commits: self.commits.clone(),
            persist: self.persist.clone(),
            undo: Vec::new(),
            touched: BTreeSet::new(),
            finished: false,
        }
    }

    /// The current data version: the sequence number of the last commit.
    pub async fn commit_seq(&self) -> u64 {
        self.store.read().await.commit_seq
    }

    /// The schema version the store is running at.
    pub async fn schema_version(&self) -> u32 {
        self.store.read().await.version
    }

    /// Subscribe to the commit feed.
    pub fn subscribe_commits(&self) -> broadcast::Receiver<CommitNotice> {
        self.commits.subscribe()
    }

    async fn persist_current(&self) -> Result<()> {
        let Some(target) = &self.persist else {
            return Ok(());
        };
        let bytes = {
            let store = self.store.read().await;
            serde_json::to_vec_pretty(&store.to_persisted())?
        };
        write_snapshot(target, bytes).await
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("persistent", &self.persist.is_some())
            .finish()
    }
}

// =============================================================================
// Read side - ReadTxn, TableRead, Selection
// =============================================================================

/// A read transaction over a consistent snapshot of the database.
pub struct ReadTxn {
    guard: OwnedRwLockReadGuard<Store>,
}

impl ReadTxn {
    pub fn table(&self, name: &str) -> Result<TableRead<'_>> {
        let table = self.guard.tables.get(name).ok_or_else(|| unknown_table(name))?;
        Ok(TableRead { table })
    }

    pub fn commit_seq(&self) -> u64 {
        self.guard.commit_seq
    }
}

/// Read access to one table within a transaction.
pub struct TableRead<'a> {
    table: &'a Table,
}

impl<'a> TableRead<'a> {
    /// Every row, in primary-key (insertion) order.
    pub fn all(&self) -> Vec<RowData> {
        self.table.rows.values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.table.rows.len()
    }

    /// The rows whose indexed value equals `key`. Compound index lookups
    /// take a [`compound_key`].
    pub fn where_eq(&self, index: &str, key: &str) -> Result<Selection<'a>> {
        let idx = self
            .table
            .indexes
            .get(index)
            .ok_or_else(|| unknown_index(&self.table.name, index))?;
        Ok(Selection {
            table: self.table,
            keys: idx.keys_for(key),
        })
    }
}

/// The rows matched by an index lookup, in primary-key order.
pub struct Selection<'a> {
    table: &'a Table,
    keys: Vec<u64>,
}

impl Selection<'_> {
    pub fn first(&self) -> Option<RowData> {
        self.keys
            .first()
            .and_then(|k| self.table.rows.get(k))
            .cloned()
    }

    pub fn to_vec(&self) -> Vec<RowData> {
        self.keys
            .iter()
            .filter_map(|k| self.table.rows.get(k))
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// =============================================================================
// Write side - WriteTxn with undo-log rollback
// =============================================================================

#[derive(Debug)]
enum UndoOp {
    Insert {
        table: String,
        key: u64,
        prev_next_key: u64,
    },
    Replace {
        table: String,
        key: u64,
        prev: RowData,
    },
    Remove {
        table: String,
        key: u64,
        prev: RowData,
    },
}

/// A write transaction. Mutations apply to the shared store immediately
/// (under the writer lock) and are recorded in an undo log; dropping the
/// transaction without committing rolls every mutation back, so readers
/// only ever observe fully committed state.
pub struct WriteTxn {
    guard: OwnedRwLockWriteGuard<Store>,
    commits: broadcast::Sender<CommitNotice>,
    persist: Option<Arc<PersistTarget>>,
    undo: Vec<UndoOp>,
    touched: BTreeSet<String>,
    finished: bool,
}

impl WriteTxn {
    /// Read access to a table, seeing the transaction's own staged writes.
    pub fn table(&self, name: &str) -> Result<TableRead<'_>> {
        let table = self.guard.tables.get(name).ok_or_else(|| unknown_table(name))?;
        Ok(TableRead { table })
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.guard
            .tables
            .get_mut(name)
            .ok_or_else(|| unknown_table(name))
    }

    fn resolve_keys(&self, table: &str, index: &str, key: &str) -> Result<Vec<u64>> {
        let t = self
            .guard
            .tables
            .get(table)
            .ok_or_else(|| unknown_table(table))?;
        let idx = t
            .indexes
            .get(index)
            .ok_or_else(|| unknown_index(table, index))?;
        Ok(idx.keys_for(key))
    }

    /// Insert a new row under a fresh primary key. Fails on a unique-index
    /// collision without touching the table.
    pub fn add(&mut self, table: &str, row: RowData) -> Result<u64> {
        let t = self.table_mut(table)?;
        if let Some((_, key)) = t.unique_collision(&row, None) {
            return Err(unique_violation(table, &key));
        }
        let prev_next_key = t.next_key;
        let key = t.next_key;
        t.next_key += 1;
        t.index_row(key, &row);
        t.rows.insert(key, row);
        self.undo.push(UndoOp::Insert {
            table: table.to_string(),
            key,
            prev_next_key,
        });
        self.touched.insert(table.to_string());
        Ok(key)
    }

    /// Upsert by the row's `uuid` field: replace the row with the same uuid
    /// (preserving its primary key), or insert a fresh one.
    pub fn put(&mut self, table: &str, row: RowData) -> Result<u64> {
        let uuid = row
            .get("uuid")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| StoreError::Schema {
                message: format!("put into {table} requires a uuid field"),
            })?;
        let existing = {
            let t = self
                .guard
                .tables
                .get(table)
                .ok_or_else(|| unknown_table(table))?;
            let idx = t
                .indexes
                .get("uuid")
                .ok_or_else(|| unknown_index(table, "uuid"))?;
            idx.keys_for(&uuid).first().copied()
        };
        match existing {
            Some(key) => {
                self.replace_row(table, key, row)?;
                Ok(key)
            }
            None => self.add(table, row),
        }
    }

    fn replace_row(&mut self, table: &str, key: u64, row: RowData) -> Result<()> {
        let t = self.table_mut(table)?;
        if let Some((_, ukey)) = t.unique_collision(&row, Some(key)) {
            return Err(unique_violation(table, &ukey));
        }
        let prev = match t.rows.get(&key) {
            Some(r) => r.clone(),
            None => {
                return Err(StoreError::Storage {
                    message: format!("table {table} index references missing row {key}"),
                });
            }
        };
        t.unindex_row(key, &prev);
        t.index_row(key, &row);
        t.rows.insert(key, row);
        self.undo.push(UndoOp::Replace {
            table: table.to_string(),
            key,
            prev,
        });
        self.touched.insert(table.to_string());
        Ok(())
    }

    /// Merge `patch` into every row matched by the index lookup, leaving
    /// fields absent from the patch untouched. Returns the matched count.
    pub fn update_where(
        &mut self,
        table: &str,
        index: &str,
        key: &str,
        patch: &RowData,
    ) -> Result<usize> {
        let keys = self.resolve_keys(table, index, key)?;
        for row_key in &keys {
            let t = self.table_mut(table)?;
            let prev = match t.rows.get(row_key) {
                Some(r) => r.clone(),
                None => continue,
            };
            let mut next = prev.clone();
            for (field, value) in patch {
                next.insert(field.clone(), value.clone());
            }
            if let Some((_, ukey)) = t.unique_collision(&next, Some(*row_key)) {
                return Err(unique_violation(table, &ukey));
            }
            t.unindex_row(*row_key, &prev);
            t.index_row(*row_key, &next);
            t.rows.insert(*row_key, next);
            self.undo.push(UndoOp::Replace {
                table: table.to_string(),
                key: *row_key,
                prev,
            });
        }
        if !keys.is_empty() {
            self.touched.insert(table.to_string());
        }
        Ok(keys.len())
    }

    /// Delete every row matched by the index lookup. Returns the count.
    pub fn delete_where(&mut self, table: &str, index: &str, key: &str) -> Result<usize> {
        let keys = self.resolve_keys(table, index, key)?;
        for row_key in &keys {
            let t = self.table_mut(table)?;
            if let Some(prev) = t.rows.remove(row_key) {
                t.unindex_row(*row_key, &prev);
                self.undo.push(UndoOp::Remove {
                    table: table.to_string(),
                    key: *row_key,
                    prev,
                });
            }
        }
        if !keys.is_empty() {
            self.touched.insert(table.to_string());
        }
        Ok(keys.len())
    }

    /// Commit the transaction: persist the snapshot, then publish a
    /// [`CommitNotice`]. A persist failure rolls every staged mutation back
    /// and returns the error; readers never observe the aborted state.
    ///
    /// Returns the commit sequence number (unchanged if the transaction
    /// staged no mutations).
    pub async fn commit(mut self) -> Result<u64> {
        if self.undo.is_empty() {
            self.finished = true;
            return Ok(self.guard.commit_seq);
        }
        self.guard.commit_seq += 1;
        let seq = self.guard.commit_seq;
        if let Some(target) = self.persist.clone() {
            let bytes = match serde_json::to_vec_pretty(&self.guard.to_persisted()) {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.guard.commit_seq -= 1;
                    self.rollback();
                    self.finished = true;
                    return Err(e.into());
                }
            };
            if let Err(err) = write_snapshot(&target, bytes).await {
                self.guard.commit_seq -= 1;
                self.rollback();
                self.finished = true;
                return Err(err);
            }
        }
        let notice = CommitNotice {
            seq,
            tables: std::mem::take(&mut self.touched),
        };
        debug!(seq, tables = ?notice.tables, "commit");
        // No subscribers is fine.
        let _ = self.commits.send(notice);
        self.undo.clear();
        self.finished = true;
        Ok(seq)
    }

    fn rollback(&mut self) {
        while let Some(op) = self.undo.pop() {
            match op {
                UndoOp::Insert {
                    table,
                    key,
                    prev_next_key,
                } => {
                    if let Some(t) = self.guard.tables.get_mut(&table) {
                        if let Some(row) = t.rows.remove(&key) {
                            t.unindex_row(key, &row);
                        }
                        t.next_key = prev_next_key;
                    }
                }
                UndoOp::Replace { table, key, prev } => {
                    if let Some(t) = self.guard.tables.get_mut(&table) {
                        if let Some(curr) = t.rows.remove(&key) {
                            t.unindex_row(key, &curr);
                        }
                        t.index_row(key, &prev);
                        t.rows.insert(key, prev);
                    }
                }
                UndoOp::Remove { table, key, prev } => {
                    if let Some(t) = self.guard.tables.get_mut(&table) {
                        t.index_row(key, &prev);
                        t.rows.insert(key, prev);
                    }
                }
            }
        }
    }
}

impl Drop for WriteTxn {
    fn drop(&mut self) {
        if !self.finished && !self.undo.is_empty() {
            debug!(ops = self.undo.len(), "rolling back uncommitted write transaction");
            self.rollback();
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod engine_tests;
