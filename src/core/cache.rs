//! The client-facing cache handle.
//!
//! `Cache` is an explicit application context: it owns the cache
//! directory, the schema registry, and the persisted configuration, and is
//! passed to every entry point instead of living in process globals.
//! Client code creates, mutates, and deletes records entirely against this
//! handle; `write` (or `flush`) is the transaction boundary that folds the
//! buffered mutations into durable storage.

use std::path::PathBuf;

use crate::core::directory::CacheDirectory;
use crate::core::error::CacheResult;
use crate::core::notify::NotificationToken;
use crate::core::record::{Record, SchemaRegistry};
use crate::core::scope::{RecordId, ScopeKind, UserId, ZoneId};
use crate::core::store::UnpushedSets;
use crate::core::zone::Zone;

pub struct CacheConfig {
    /// Directory holding the store files and `config.db`.
    pub root: PathBuf,
}

pub struct Cache {
    directory: CacheDirectory,
    schemas: SchemaRegistry,
}

impl Cache {
    pub fn open(config: CacheConfig, schemas: SchemaRegistry) -> CacheResult<Cache> {
        let directory = CacheDirectory::open(&config.root)?;
        Ok(Cache { directory, schemas })
    }

    // --- Fetching and finding ---------------------------------------------

    pub fn fetch(
        &self,
        record_type: &str,
        id: &str,
        scope: ScopeKind,
    ) -> CacheResult<Option<Record>> {
        self.directory.store_for(scope).fetch(record_type, id)
    }

    pub fn fetch_all(&self, record_type: &str, scope: ScopeKind) -> CacheResult<Vec<Record>> {
        self.directory.store_for(scope).fetch_all(record_type)
    }

    pub fn find<F>(
        &self,
        record_type: &str,
        scope: ScopeKind,
        predicate: F,
    ) -> CacheResult<Vec<Record>>
    where
        F: Fn(&Record) -> bool,
    {
        self.directory.store_for(scope).find(record_type, predicate)
    }

    pub fn zones(&self, scope: ScopeKind) -> CacheResult<Vec<Zone>> {
        self.directory.store_for(scope).zones()
    }

    // --- Buffered mutations -------------------------------------------------

    /// Buffer a record for upsert. Takes effect at the next `write`/`flush`.
    pub fn add(&self, record: Record) {
        self.directory.store_for(record.scope()).add_record(record);
    }

    pub fn add_all(&self, records: impl IntoIterator<Item = Record>) {
        for record in records {
            self.add(record);
        }
    }

    /// Buffer a record deletion. Deleting an absent record is a no-op.
    pub fn remove(&self, record: &Record) {
        self.directory
            .store_for(record.scope())
            .remove_record(record.id().clone());
    }

    pub fn remove_all<'a>(&self, records: impl IntoIterator<Item = &'a Record>) {
        for record in records {
            self.remove(record);
        }
    }

    pub fn add_zone(&self, zone: Zone) {
        self.directory.store_for(zone.scope()).add_zone(zone);
    }

    pub fn remove_zone(&self, zone: &Zone) {
        self.directory.store_for(zone.scope()).remove_zone(zone);
    }

    // --- Committing -----------------------------------------------------------

    /// Run a batch of mutations, then commit every store that received
    /// any. The batch is applied all-or-nothing per store; a failed store
    /// commit keeps its buffers for retry and surfaces the error.
    pub fn write<F>(&self, body: F) -> CacheResult<()>
    where
        F: FnOnce(&Cache) -> CacheResult<()>,
    {
        body(self)?;
        self.flush()
    }

    /// Commit all stores with pending mutations. Safe to call periodically.
    pub fn flush(&self) -> CacheResult<()> {
        for scope in ScopeKind::all() {
            self.directory.store_for(scope).commit(&self.schemas)?;
        }
        Ok(())
    }

    // --- Subscriptions ----------------------------------------------------------

    /// Subscribe to post-commit notifications for one scope. The
    /// subscription ends when the returned token is dropped.
    pub fn subscribe(
        &self,
        scope: ScopeKind,
        callback: impl Fn(ScopeKind) + Send + Sync + 'static,
    ) -> NotificationToken {
        self.directory.store_for(scope).subscribe(callback)
    }

    // --- User identity -----------------------------------------------------------

    pub fn current_user(&self) -> CacheResult<Option<UserId>> {
        self.directory.current_user()
    }

    /// `Some(user)` on login or account switch, `None` on logout.
    pub fn set_current_user(&self, user: Option<&str>) -> CacheResult<()> {
        self.directory.set_current_user(user, &self.schemas)
    }

    // --- Remote-sync surface -------------------------------------------------------

    /// Snapshot of the ids awaiting push for one scope.
    pub fn unpushed(&self, scope: ScopeKind) -> UnpushedSets {
        self.directory.store_for(scope).unpushed()
    }

    pub fn mark_records_pushed(&self, scope: ScopeKind, ids: &[RecordId]) {
        self.directory.store_for(scope).mark_records_pushed(ids);
    }

    pub fn mark_record_deletions_pushed(&self, scope: ScopeKind, ids: &[RecordId]) {
        self.directory
            .store_for(scope)
            .mark_record_deletions_pushed(ids);
    }

    pub fn mark_zones_pushed(&self, scope: ScopeKind, ids: &[ZoneId]) {
        self.directory.store_for(scope).mark_zones_pushed(ids);
    }

    pub fn mark_zone_deletions_pushed(&self, scope: ScopeKind, ids: &[ZoneId]) {
        self.directory
            .store_for(scope)
            .mark_zone_deletions_pushed(ids);
    }

    pub fn server_change_token(&self, scope: ScopeKind) -> CacheResult<Option<String>> {
        self.directory.config().server_change_token(scope)
    }

    pub fn set_server_change_token(
        &self,
        scope: ScopeKind,
        token: Option<&str>,
    ) -> CacheResult<()> {
        self.directory.config().set_server_change_token(scope, token)
    }

    pub fn zone_change_token(&self, zone_id: &ZoneId) -> CacheResult<Option<String>> {
        self.directory.config().zone_change_token(zone_id)
    }

    pub fn set_zone_change_token(&self, zone_id: &ZoneId, token: Option<&str>) -> CacheResult<()> {
        self.directory.config().set_zone_change_token(zone_id, token)
    }

    pub fn store_association_id(&self, scope: ScopeKind) -> CacheResult<Option<String>> {
        self.directory.config().store_association_id(scope)
    }
}
