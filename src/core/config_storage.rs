//! Persisted key-value area for cross-store state.
//!
//! Holds the currently-authenticated user id, per-scope and per-zone
//! server change tokens consumed on pull, and the per-scope ids
//! associating local stores with their remote counterparts. Lives in its
//! own `config.db` next to the store files.

use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;

use crate::core::db;
use crate::core::error::CacheResult;
use crate::core::schemas;
use crate::core::scope::{ScopeKind, UserId, ZoneId};

pub struct ConfigStorage {
    conn: Mutex<Connection>,
}

impl ConfigStorage {
    pub fn open(root: &Path) -> CacheResult<ConfigStorage> {
        std::fs::create_dir_all(root)?;
        let conn = db::db_connect(&root.join(schemas::CONFIG_DB_NAME))?;
        conn.execute(schemas::CONFIG_KV_SCHEMA, [])?;
        Ok(ConfigStorage {
            conn: Mutex::new(conn),
        })
    }

    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT value FROM config_kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set(&self, key: &str, value: Option<&str>) -> CacheResult<()> {
        let conn = self.conn.lock().unwrap();
        match value {
            Some(value) => {
                conn.execute(
                    "INSERT INTO config_kv (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key, value],
                )?;
            }
            None => {
                conn.execute("DELETE FROM config_kv WHERE key = ?1", params![key])?;
            }
        }
        Ok(())
    }

    // --- Current user ------------------------------------------------------

    pub fn current_user_id(&self) -> CacheResult<Option<UserId>> {
        self.get("current_user_id")
    }

    pub fn set_current_user_id(&self, user_id: Option<&str>) -> CacheResult<()> {
        self.set("current_user_id", user_id)
    }

    // --- Server change tokens ------------------------------------------------

    pub fn server_change_token(&self, scope: ScopeKind) -> CacheResult<Option<String>> {
        self.get(&scope_token_key(scope))
    }

    pub fn set_server_change_token(
        &self,
        scope: ScopeKind,
        token: Option<&str>,
    ) -> CacheResult<()> {
        self.set(&scope_token_key(scope), token)
    }

    pub fn zone_change_token(&self, zone_id: &ZoneId) -> CacheResult<Option<String>> {
        self.get(&zone_token_key(zone_id))
    }

    pub fn set_zone_change_token(&self, zone_id: &ZoneId, token: Option<&str>) -> CacheResult<()> {
        self.set(&zone_token_key(zone_id), token)
    }

    // --- Local-store/remote-store association -------------------------------

    pub fn store_association_id(&self, scope: ScopeKind) -> CacheResult<Option<String>> {
        self.get(&association_key(scope))
    }

    pub fn set_store_association_id(&self, scope: ScopeKind, id: Option<&str>) -> CacheResult<()> {
        self.set(&association_key(scope), id)
    }
}

fn scope_token_key(scope: ScopeKind) -> String {
    format!("scope.{}.server_change_token", scope.name())
}

fn zone_token_key(zone_id: &ZoneId) -> String {
    format!("zone.{}.server_change_token", zone_id)
}

fn association_key(scope: ScopeKind) -> String {
    format!("scope.{}.store_association_id", scope.name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_persist_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();

        {
            let config = ConfigStorage::open(tmp.path()).unwrap();
            config.set_current_user_id(Some("alice")).unwrap();
            config
                .set_server_change_token(ScopeKind::Private, Some("token-1"))
                .unwrap();
            config
                .set_zone_change_token(&"inbox+alice".to_string(), Some("token-2"))
                .unwrap();
        }

        let config = ConfigStorage::open(tmp.path()).unwrap();
        assert_eq!(config.current_user_id().unwrap().as_deref(), Some("alice"));
        assert_eq!(
            config
                .server_change_token(ScopeKind::Private)
                .unwrap()
                .as_deref(),
            Some("token-1")
        );
        assert_eq!(
            config
                .zone_change_token(&"inbox+alice".to_string())
                .unwrap()
                .as_deref(),
            Some("token-2")
        );
        assert_eq!(config.server_change_token(ScopeKind::Shared).unwrap(), None);
    }

    #[test]
    fn test_setting_none_removes_the_key() {
        let tmp = tempfile::tempdir().unwrap();
        let config = ConfigStorage::open(tmp.path()).unwrap();

        config.set_current_user_id(Some("alice")).unwrap();
        config.set_current_user_id(None).unwrap();
        assert_eq!(config.current_user_id().unwrap(), None);
    }
}
