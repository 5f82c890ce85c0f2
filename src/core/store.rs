//! One durable store per (scope, owner) pair.
//!
//! A `ScopedStore` owns its SQLite file, its mutation buffer, its
//! unpushed-change bookkeeping, and its subscriber registry. Writes go
//! exclusively through the reconciler's commit pass; reads open
//! short-lived connections and never take the write boundary (WAL read
//! consistency applies).

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::core::buffer::MutationBuffer;
use crate::core::db;
use crate::core::error::{CacheError, CacheResult};
use crate::core::notify::{ChangeCallback, NotificationToken, SubscriberRegistry};
use crate::core::reconciler;
use crate::core::record::{FieldValue, Record, SchemaRegistry};
use crate::core::schemas;
use crate::core::scope::{RecordId, ScopeKind, UserId, UserScope, ZoneId};
use crate::core::zone::Zone;

/// Ids changed or deleted locally but not yet confirmed pushed to the
/// remote service. Consumed and cleared by the external sync collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpushedSets {
    pub zone_changes: HashSet<ZoneId>,
    pub zone_deletions: HashSet<ZoneId>,
    pub record_changes: HashSet<RecordId>,
    pub record_deletions: HashSet<RecordId>,
}

impl UnpushedSets {
    pub fn is_empty(&self) -> bool {
        self.zone_changes.is_empty()
            && self.zone_deletions.is_empty()
            && self.record_changes.is_empty()
            && self.record_deletions.is_empty()
    }

    pub(crate) fn merge(&mut self, other: UnpushedSets) {
        self.zone_changes.extend(other.zone_changes);
        self.zone_deletions.extend(other.zone_deletions);
        self.record_changes.extend(other.record_changes);
        self.record_deletions.extend(other.record_deletions);
    }
}

pub struct ScopedStore {
    scope: ScopeKind,
    owner: Option<UserId>,
    path: PathBuf,
    write_conn: Mutex<Connection>,
    buffer: Mutex<MutationBuffer>,
    unpushed: Mutex<UnpushedSets>,
    subscribers: Arc<Mutex<SubscriberRegistry>>,
}

impl ScopedStore {
    /// The process-wide Public store.
    pub fn public(root: &Path) -> CacheResult<ScopedStore> {
        ScopedStore::open(ScopeKind::Public, None, root)
    }

    /// A Private or Shared store keyed by its owning user. The scope
    /// parameter makes an owner-less user store unrepresentable.
    pub fn for_user(scope: UserScope, owner: &str, root: &Path) -> CacheResult<ScopedStore> {
        if owner.is_empty() {
            return Err(CacheError::Configuration(format!(
                "cannot construct a {} store without an owner identity",
                scope.kind()
            )));
        }
        // Owner ids become zone owner names and store file names, both of
        // which treat '+' as a separator.
        if owner.contains('+') {
            return Err(CacheError::Configuration(format!(
                "owner identity {:?} must not contain '+'",
                owner
            )));
        }
        ScopedStore::open(scope.kind(), Some(owner.to_string()), root)
    }

    fn open(scope: ScopeKind, owner: Option<UserId>, root: &Path) -> CacheResult<ScopedStore> {
        std::fs::create_dir_all(root)?;
        let path = root.join(schemas::store_file_name(scope, owner.as_deref()));
        let conn = db::db_connect(&path)?;
        db::initialize_store_db(&conn)?;
        debug!(scope = %scope, path = %path.display(), "opened scoped store");
        Ok(ScopedStore {
            scope,
            owner,
            path,
            write_conn: Mutex::new(conn),
            buffer: Mutex::new(MutationBuffer::new()),
            unpushed: Mutex::new(UnpushedSets::default()),
            subscribers: Arc::new(Mutex::new(SubscriberRegistry::default())),
        })
    }

    pub fn scope(&self) -> ScopeKind {
        self.scope
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // --- Buffering -------------------------------------------------------

    pub fn add_zone(&self, zone: Zone) {
        self.buffer.lock().unwrap().buffer_zone_upsert(zone);
    }

    pub fn remove_zone(&self, zone: &Zone) {
        self.buffer.lock().unwrap().buffer_zone_deletion(zone);
    }

    pub fn add_record(&self, record: Record) {
        self.buffer.lock().unwrap().buffer_record_upsert(record);
    }

    pub fn remove_record(&self, record_id: RecordId) {
        self.buffer.lock().unwrap().buffer_record_deletion(record_id);
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.buffer.lock().unwrap().is_empty()
    }

    // --- Committing ------------------------------------------------------

    /// Drain the mutation buffer into the durable store in one
    /// transaction. Returns whether anything was applied. On failure the
    /// buffers and unpushed sets are left untouched for a retry.
    ///
    /// Subscribers are notified after the boundary and the transaction are
    /// both released.
    pub fn commit(&self, registry: &SchemaRegistry) -> CacheResult<bool> {
        let applied = self.apply_buffered(registry)?;
        if applied {
            self.notify_subscribers();
        }
        Ok(applied)
    }

    /// The commit pass without subscriber notification. For callers that
    /// hold a directory lock and must not run callbacks under it.
    pub(crate) fn apply_buffered(&self, registry: &SchemaRegistry) -> CacheResult<bool> {
        let mut buffer = self.buffer.lock().unwrap();
        if buffer.is_empty() {
            return Ok(false);
        }
        let mut conn = self.write_conn.lock().unwrap();
        let outcome = reconciler::apply(
            &mut conn,
            self.scope,
            self.owner.as_deref(),
            &buffer,
            registry,
        )?;
        buffer.clear();
        self.unpushed.lock().unwrap().merge(outcome);
        Ok(true)
    }

    // --- Reading ---------------------------------------------------------

    fn read_conn(&self) -> CacheResult<Connection> {
        db::db_connect(&self.path)
    }

    pub fn fetch(&self, record_type: &str, id: &str) -> CacheResult<Option<Record>> {
        let conn = self.read_conn()?;
        let row = conn
            .query_row(
                "SELECT id, record_type, scope, parent_id, zone_id, fields
                 FROM records WHERE id = ?1 AND record_type = ?2",
                params![id, record_type],
                record_row,
            )
            .optional()?;
        row.map(decode_record).transpose()
    }

    pub fn fetch_all(&self, record_type: &str) -> CacheResult<Vec<Record>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, record_type, scope, parent_id, zone_id, fields
             FROM records WHERE record_type = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![record_type], record_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(decode_record(row?)?);
        }
        Ok(records)
    }

    pub fn find<F>(&self, record_type: &str, predicate: F) -> CacheResult<Vec<Record>>
    where
        F: Fn(&Record) -> bool,
    {
        let mut records = self.fetch_all(record_type)?;
        records.retain(|record| predicate(record));
        Ok(records)
    }

    /// Every record in the store regardless of type. Used by the cache
    /// directory when merging and purging stores.
    pub fn all_records(&self) -> CacheResult<Vec<Record>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, record_type, scope, parent_id, zone_id, fields
             FROM records ORDER BY id",
        )?;
        let rows = stmt.query_map([], record_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(decode_record(row?)?);
        }
        Ok(records)
    }

    pub fn record_exists(&self, id: &str) -> CacheResult<bool> {
        let conn = self.read_conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM records WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn zones(&self) -> CacheResult<Vec<Zone>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT zone_name, owner_name, scope FROM zones ORDER BY combined_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut zones = Vec::new();
        for row in rows {
            let (name, owner, scope_name) = row?;
            let scope = ScopeKind::from_name(&scope_name).ok_or_else(|| {
                CacheError::Invariant(format!("unknown scope in zones table: {}", scope_name))
            })?;
            zones.push(Zone::new(name, owner, scope)?);
        }
        Ok(zones)
    }

    pub fn zone(&self, combined_id: &str) -> CacheResult<Option<Zone>> {
        let conn = self.read_conn()?;
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT zone_name, owner_name, scope FROM zones WHERE combined_id = ?1",
                params![combined_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        match row {
            None => Ok(None),
            Some((name, owner, scope_name)) => {
                let scope = ScopeKind::from_name(&scope_name).ok_or_else(|| {
                    CacheError::Invariant(format!("unknown scope in zones table: {}", scope_name))
                })?;
                Ok(Some(Zone::new(name, owner, scope)?))
            }
        }
    }

    // --- Sync bookkeeping ------------------------------------------------

    /// Snapshot of the unpushed sets for the external sync pass.
    pub fn unpushed(&self) -> UnpushedSets {
        self.unpushed.lock().unwrap().clone()
    }

    pub fn mark_records_pushed(&self, ids: &[RecordId]) {
        let mut unpushed = self.unpushed.lock().unwrap();
        for id in ids {
            unpushed.record_changes.remove(id);
        }
    }

    pub fn mark_record_deletions_pushed(&self, ids: &[RecordId]) {
        let mut unpushed = self.unpushed.lock().unwrap();
        for id in ids {
            unpushed.record_deletions.remove(id);
        }
    }

    pub fn mark_zones_pushed(&self, ids: &[ZoneId]) {
        let mut unpushed = self.unpushed.lock().unwrap();
        for id in ids {
            unpushed.zone_changes.remove(id);
        }
    }

    pub fn mark_zone_deletions_pushed(&self, ids: &[ZoneId]) {
        let mut unpushed = self.unpushed.lock().unwrap();
        for id in ids {
            unpushed.zone_deletions.remove(id);
        }
    }

    // --- Subscriptions ---------------------------------------------------

    pub fn subscribe(
        &self,
        callback: impl Fn(ScopeKind) + Send + Sync + 'static,
    ) -> NotificationToken {
        let callback: Arc<ChangeCallback> = Arc::new(callback);
        let id = self.subscribers.lock().unwrap().insert(callback);
        NotificationToken::new(id, Arc::downgrade(&self.subscribers))
    }

    fn notify_subscribers(&self) {
        let callbacks = self.subscribers.lock().unwrap().snapshot();
        for callback in callbacks {
            callback(self.scope);
        }
    }

    // --- Lifecycle helpers (cache directory only) ------------------------

    /// Remove every record except the keeper (the outgoing user's identity
    /// record), then every zone left without records. Runs on logout,
    /// outside the reconciler: the wiped data is not unpushed local work.
    pub(crate) fn purge_except(&self, keep_record_id: &str) -> CacheResult<()> {
        let conn = self.write_conn.lock().unwrap();
        conn.execute("DELETE FROM records WHERE id != ?1", params![keep_record_id])?;
        conn.execute(
            "DELETE FROM zones WHERE combined_id NOT IN
                 (SELECT DISTINCT zone_id FROM records)",
            [],
        )?;
        debug!(scope = %self.scope, "purged store contents on logout");
        Ok(())
    }

    /// Delete the store's files from disk. Only valid once the directory
    /// has stopped handing the store out.
    pub(crate) fn delete_files(&self) -> CacheResult<()> {
        for suffix in ["", "-wal", "-shm"] {
            let mut os_path = self.path.clone().into_os_string();
            os_path.push(suffix);
            let path = PathBuf::from(os_path);
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

type RecordRow = (String, String, String, Option<String>, String, String);

fn record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn decode_record(row: RecordRow) -> CacheResult<Record> {
    let (id, record_type, scope_name, parent_id, zone_id, fields_json) = row;
    let scope = ScopeKind::from_name(&scope_name).ok_or_else(|| {
        CacheError::Invariant(format!("unknown scope in records table: {}", scope_name))
    })?;
    let fields: BTreeMap<String, FieldValue> = serde_json::from_str(&fields_json)?;
    Ok(Record::from_parts(
        id,
        record_type,
        scope,
        parent_id,
        Some(zone_id),
        fields,
    ))
}
