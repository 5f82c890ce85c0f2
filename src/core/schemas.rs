//! Durable layout shared by every scoped store file.
//!
//! Each (scope, owner) pair gets its own SQLite file holding a `zones` and
//! a `records` table. A separate `config.db` in the cache root carries the
//! small key-value area (current user, server change tokens, store
//! association ids).

use crate::core::scope::ScopeKind;

pub const ZONES_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS zones (
        combined_id TEXT PRIMARY KEY,
        zone_name TEXT NOT NULL,
        owner_name TEXT NOT NULL,
        scope TEXT NOT NULL
    )
";

pub const RECORDS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS records (
        id TEXT PRIMARY KEY,
        record_type TEXT NOT NULL,
        scope TEXT NOT NULL,
        parent_id TEXT,
        zone_id TEXT NOT NULL REFERENCES zones(combined_id),
        fields TEXT NOT NULL
    )
";

pub const RECORDS_PARENT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_records_parent ON records(parent_id)";

pub const RECORDS_ZONE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_records_zone ON records(zone_id)";

pub const CONFIG_KV_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS config_kv (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

pub const CONFIG_DB_NAME: &str = "config.db";

/// Deterministic store file name for a (scope, owner) pair.
/// Public has no owner; user-scoped stores embed the owner id.
pub fn store_file_name(scope: ScopeKind, owner: Option<&str>) -> String {
    match owner {
        Some(owner) => format!("{}+{}.db", scope.name(), owner),
        None => format!("{}.db", scope.name()),
    }
}
