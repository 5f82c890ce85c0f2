use rusqlite::Connection;
use std::path::Path;

use crate::core::error::CacheResult;
use crate::core::schemas;

pub fn db_connect(db_path: &Path) -> CacheResult<Connection> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    conn.execute("PRAGMA foreign_keys=ON;", [])?;
    Ok(conn)
}

/// Create the zones/records tables and indexes in a freshly opened store.
pub fn initialize_store_db(conn: &Connection) -> CacheResult<()> {
    conn.execute(schemas::ZONES_SCHEMA, [])?;
    conn.execute(schemas::RECORDS_SCHEMA, [])?;
    conn.execute(schemas::RECORDS_PARENT_INDEX, [])?;
    conn.execute(schemas::RECORDS_ZONE_INDEX, [])?;
    Ok(())
}
