//! The top-level registry of live stores, and the owning-user state machine.
//!
//! Exactly one live store exists per scope at all times. Before a user has
//! authenticated, the Private and Shared stores are keyed by a placeholder
//! identity; on login the placeholder stores' content is merged into the
//! real user's stores, on logout the outgoing user's data is wiped (except
//! their identity record) and fresh placeholder stores take over.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::info;
use ulid::Ulid;

use crate::core::config_storage::ConfigStorage;
use crate::core::error::{CacheError, CacheResult};
use crate::core::record::SchemaRegistry;
use crate::core::schemas;
use crate::core::scope::{ScopeKind, UserId, UserScope};
use crate::core::store::ScopedStore;
use crate::core::zone::Zone;

/// Store key used while no user is authenticated.
pub const TEMPORARY_USER_ID: &str = "temporary-user";

pub struct CacheDirectory {
    root: PathBuf,
    config: ConfigStorage,
    public: Arc<ScopedStore>,
    private: Mutex<Arc<ScopedStore>>,
    shared: Mutex<Arc<ScopedStore>>,
}

impl CacheDirectory {
    pub fn open(root: &Path) -> CacheResult<CacheDirectory> {
        let config = ConfigStorage::open(root)?;
        let owner = match config.current_user_id()? {
            Some(user) => user,
            None => {
                config.set_current_user_id(Some(TEMPORARY_USER_ID))?;
                TEMPORARY_USER_ID.to_string()
            }
        };

        let public = Arc::new(ScopedStore::public(root)?);
        let private = Arc::new(ScopedStore::for_user(UserScope::Private, &owner, root)?);
        let shared = Arc::new(ScopedStore::for_user(UserScope::Shared, &owner, root)?);

        for scope in ScopeKind::all() {
            ensure_association_id(&config, scope)?;
        }

        info!(root = %root.display(), owner = %owner, "opened cache directory");
        Ok(CacheDirectory {
            root: root.to_path_buf(),
            config,
            public,
            private: Mutex::new(private),
            shared: Mutex::new(shared),
        })
    }

    pub fn store_for(&self, scope: ScopeKind) -> Arc<ScopedStore> {
        match scope {
            ScopeKind::Public => Arc::clone(&self.public),
            ScopeKind::Private => Arc::clone(&self.private.lock().unwrap()),
            ScopeKind::Shared => Arc::clone(&self.shared.lock().unwrap()),
        }
    }

    pub(crate) fn config(&self) -> &ConfigStorage {
        &self.config
    }

    /// The authenticated user, or `None` while running on the placeholder.
    pub fn current_user(&self) -> CacheResult<Option<UserId>> {
        Ok(self
            .config
            .current_user_id()?
            .filter(|user| user != TEMPORARY_USER_ID))
    }

    /// Drive the owning-user state machine. `Some(user)` is a login or an
    /// account switch, `None` is a logout. A no-op when the identity is
    /// unchanged.
    pub fn set_current_user(
        &self,
        user: Option<&str>,
        registry: &SchemaRegistry,
    ) -> CacheResult<()> {
        if user == Some(TEMPORARY_USER_ID) {
            return Err(CacheError::Configuration(format!(
                "{} is reserved for the unauthenticated placeholder",
                TEMPORARY_USER_ID
            )));
        }

        let outgoing = self
            .config
            .current_user_id()?
            .unwrap_or_else(|| TEMPORARY_USER_ID.to_string());
        let incoming = user.unwrap_or(TEMPORARY_USER_ID);
        if outgoing == incoming {
            return Ok(());
        }

        let was_placeholder = outgoing == TEMPORARY_USER_ID;
        match (was_placeholder, user) {
            // Login: provision stores for the real user and fold the
            // placeholder stores' content into them.
            (true, Some(user)) => self.login(user, registry)?,
            // Logout: wipe the outgoing user's data, keep their identity
            // record, and fall back to fresh placeholder stores.
            (false, None) => self.logout(&outgoing)?,
            // Account switch: logout-style cleanup, then login-style
            // provisioning. Nothing to merge: the placeholder was not in
            // use.
            (false, Some(user)) => {
                self.logout(&outgoing)?;
                self.login_without_merge(user)?;
            }
            // Placeholder -> placeholder is the no-op case above.
            (true, None) => unreachable!("placeholder to placeholder is identity-unchanged"),
        }
        Ok(())
    }

    fn login(&self, user: &str, registry: &SchemaRegistry) -> CacheResult<()> {
        for scope in UserScope::both() {
            let new_store = Arc::new(ScopedStore::for_user(scope, user, &self.root)?);
            // The slot stays locked across flush, merge, and swap so no
            // mutation can land on the placeholder store mid-hand-off. No
            // subscriber callbacks run while it is held.
            let slot = self.slot(scope);
            let mut guard = slot.lock().unwrap();
            let temp_store = Arc::clone(&guard);

            temp_store.apply_buffered(registry)?;
            merge_store(&temp_store, &new_store, user, registry)?;

            *guard = new_store;
            drop(guard);
            temp_store.delete_files()?;
        }
        self.config.set_current_user_id(Some(user))?;
        info!(user = %user, "merged placeholder stores and switched to authenticated user");
        Ok(())
    }

    fn login_without_merge(&self, user: &str) -> CacheResult<()> {
        for scope in UserScope::both() {
            let new_store = Arc::new(ScopedStore::for_user(scope, user, &self.root)?);
            *self.slot(scope).lock().unwrap() = new_store;
        }
        self.config.set_current_user_id(Some(user))?;
        info!(user = %user, "switched to authenticated user");
        Ok(())
    }

    fn logout(&self, outgoing: &str) -> CacheResult<()> {
        for scope in UserScope::both() {
            // A stale placeholder file from an earlier session must not
            // leak into the new unauthenticated state.
            remove_store_files(&self.root, scope.kind(), TEMPORARY_USER_ID)?;
            let temp_store = Arc::new(ScopedStore::for_user(scope, TEMPORARY_USER_ID, &self.root)?);

            // Slot locked across purge and swap, as in `login`.
            let slot = self.slot(scope);
            let mut guard = slot.lock().unwrap();
            guard.purge_except(outgoing)?;
            *guard = temp_store;
        }
        self.config.set_current_user_id(Some(TEMPORARY_USER_ID))?;
        info!(user = %outgoing, "logged out and reverted to placeholder stores");
        Ok(())
    }

    fn slot(&self, scope: UserScope) -> &Mutex<Arc<ScopedStore>> {
        match scope {
            UserScope::Private => &self.private,
            UserScope::Shared => &self.shared,
        }
    }
}

/// Fold the placeholder store's content into the new user's store. The
/// caller flushes the source's buffer first, so durable content is the
/// whole of it.
///
/// Merge policy: content-preserving, target wins. Every zone and record of
/// the source is re-buffered into the destination unless the destination
/// already has the id; zone ownership is rewritten from the placeholder to
/// the new user so combined identifiers stay consistent. One commit applies
/// the whole merge, which also marks the merged entities as unpushed under
/// the new identity. Runs under the directory's slot lock, so the
/// destination is committed without subscriber callbacks.
fn merge_store(
    src: &ScopedStore,
    dst: &ScopedStore,
    new_owner: &str,
    registry: &SchemaRegistry,
) -> CacheResult<()> {
    for zone in src.zones()? {
        let mut zone = zone;
        if zone.owner_name() == TEMPORARY_USER_ID {
            zone.set_owner_name(new_owner)?;
        }
        if dst.zone(&zone.combined_identifier())?.is_none() {
            dst.add_zone(zone);
        }
    }

    for record in src.all_records()? {
        if dst.record_exists(record.id())? {
            continue;
        }
        let mut record = record;
        if let Some(combined) = record.zone_combined_id() {
            let mut zone = Zone::parse_combined(combined)?;
            if zone.owner_name() == TEMPORARY_USER_ID {
                zone.set_owner_name(new_owner)?;
            }
            record.set_zone_combined_id(Some(zone.combined_identifier()));
        }
        dst.add_record(record);
    }

    dst.apply_buffered(registry)?;
    Ok(())
}

fn ensure_association_id(config: &ConfigStorage, scope: ScopeKind) -> CacheResult<()> {
    if config.store_association_id(scope)?.is_none() {
        config.set_store_association_id(scope, Some(&Ulid::new().to_string()))?;
    }
    Ok(())
}

fn remove_store_files(root: &Path, scope: ScopeKind, owner: &str) -> CacheResult<()> {
    let base = root.join(schemas::store_file_name(scope, Some(owner)));
    for suffix in ["", "-wal", "-shm"] {
        let mut os_path = base.clone().into_os_string();
        os_path.push(suffix);
        let path = PathBuf::from(os_path);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
    }
    Ok(())
}
