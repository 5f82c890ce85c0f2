//! The transactional commit pass.
//!
//! One pass drains a store's mutation buffer into its SQLite file inside a
//! single transaction, in a fixed order: zone deletions, zone upserts, the
//! default-zone guarantee, record deletions, record upserts. The fixed
//! order is what resolves a batch that deletes a zone and adds a record to
//! it: the zone is recreated during the record-upsert step instead of the
//! record failing.
//!
//! The pass is all-or-nothing. Any error rolls the transaction back and
//! the caller leaves the buffers untouched so the same commit can be
//! retried.

use std::collections::{HashMap, HashSet};

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use tracing::debug;

use crate::core::buffer::MutationBuffer;
use crate::core::error::{CacheError, CacheResult};
use crate::core::record::{Record, SchemaRegistry};
use crate::core::scope::{RecordId, ScopeKind};
use crate::core::store::UnpushedSets;
use crate::core::zone::Zone;

/// Apply one buffered batch. Returns the unpushed-set additions for the
/// caller to merge once the buffers have been cleared.
pub(crate) fn apply(
    conn: &mut Connection,
    scope: ScopeKind,
    owner: Option<&str>,
    buffer: &MutationBuffer,
    registry: &SchemaRegistry,
) -> CacheResult<UnpushedSets> {
    // Validate what can be validated in memory before the transaction
    // opens, so the write boundary is never held on a batch that was
    // doomed from the start.
    for record in buffer.record_upserts().values() {
        registry.require(record.record_type())?;
        if record.scope() != scope {
            return Err(CacheError::Invariant(format!(
                "record {} has scope {} but was buffered on the {} store",
                record.id(),
                record.scope(),
                scope
            )));
        }
    }

    let tx = conn.transaction()?;
    let mut pushlog = UnpushedSets::default();

    // 1. Zone deletions: cascade to every contained record, then the zone.
    for zone_id in buffer.zone_deletions() {
        let combined = format!("{}+{}", scope.name(), zone_id);
        if zone_exists(&tx, &combined)? {
            tx.execute("DELETE FROM records WHERE zone_id = ?1", params![combined])?;
            tx.execute("DELETE FROM zones WHERE combined_id = ?1", params![combined])?;
            pushlog.zone_deletions.insert(zone_id.clone());
        }
    }

    // 2. Zone upserts: find-or-create by combined identifier.
    for zone in buffer.zone_upserts() {
        upsert_zone(&tx, zone)?;
        pushlog.zone_changes.insert(zone.zone_id());
    }

    // 3. Default-zone guarantee for the Public store.
    if scope == ScopeKind::Public {
        ensure_zone(&tx, &Zone::default_zone(scope))?;
    }

    // 4. Record deletions: descendants first, then the record, then the
    //    record's zone if it is now empty and not the default.
    for record_id in buffer.record_deletions() {
        let Some(zone_combined) = record_zone(&tx, record_id)? else {
            // Already absent. The goal state is satisfied.
            continue;
        };
        delete_subtree(&tx, record_id, &mut pushlog)?;
        let zone_is_default = match zone_row(&tx, &zone_combined)? {
            Some(zone) => zone.is_default(),
            None => continue,
        };
        if !zone_is_default && records_in_zone(&tx, &zone_combined)? == 0 {
            tx.execute(
                "DELETE FROM zones WHERE combined_id = ?1",
                params![zone_combined],
            )?;
        }
    }

    // 5. Record upserts: resolve zones root-first, then persist declared
    //    fields.
    let pending = buffer.record_upserts();
    let mut assigned: HashMap<RecordId, String> = HashMap::new();
    for record in pending.values() {
        let zone_combined = resolve_zone(
            &tx,
            scope,
            owner,
            record.id(),
            pending,
            &mut assigned,
            &mut HashSet::new(),
            &mut pushlog,
        )?;
        let schema = registry.require(record.record_type())?;
        let fields = schema.project_fields(record.fields())?;
        let fields_json = serde_json::to_string(&fields)?;
        tx.execute(
            "INSERT INTO records (id, record_type, scope, parent_id, zone_id, fields)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 record_type = excluded.record_type,
                 scope = excluded.scope,
                 parent_id = excluded.parent_id,
                 zone_id = excluded.zone_id,
                 fields = excluded.fields",
            params![
                record.id(),
                record.record_type(),
                scope.name(),
                record.parent_id(),
                zone_combined,
                fields_json
            ],
        )?;
        pushlog.record_changes.insert(record.id().clone());
    }

    tx.commit()?;

    debug!(
        scope = %scope,
        zone_changes = pushlog.zone_changes.len(),
        zone_deletions = pushlog.zone_deletions.len(),
        record_changes = pushlog.record_changes.len(),
        record_deletions = pushlog.record_deletions.len(),
        "committed buffered mutations"
    );
    Ok(pushlog)
}

/// Resolve (creating if necessary) the zone for one record, walking the
/// parent chain to the root first. Every record of a tree ends up in the
/// root's zone.
#[allow(clippy::too_many_arguments)]
fn resolve_zone(
    tx: &Transaction<'_>,
    scope: ScopeKind,
    owner: Option<&str>,
    record_id: &RecordId,
    pending: &HashMap<RecordId, Record>,
    assigned: &mut HashMap<RecordId, String>,
    in_progress: &mut HashSet<RecordId>,
    pushlog: &mut UnpushedSets,
) -> CacheResult<String> {
    if let Some(combined) = assigned.get(record_id) {
        return Ok(combined.clone());
    }
    if !in_progress.insert(record_id.clone()) {
        return Err(CacheError::Invariant(format!(
            "parent cycle detected while resolving the zone of record {}",
            record_id
        )));
    }

    let combined = match pending.get(record_id) {
        None => {
            // Not part of this batch: the durable row is authoritative.
            record_zone(tx, record_id)?.ok_or_else(|| {
                CacheError::Invariant(format!(
                    "record {} is referenced as a parent but exists neither durably nor in this batch",
                    record_id
                ))
            })?
        }
        Some(record) => match record.parent_id() {
            Some(parent_id) => resolve_zone(
                tx, scope, owner, parent_id, pending, assigned, in_progress, pushlog,
            )?,
            None => match record.zone_combined_id() {
                Some(combined) => {
                    // The record already knows its zone. If that zone was
                    // deleted earlier in this very batch, recreate it.
                    if !zone_exists(tx, combined)? {
                        let zone = Zone::parse_combined(combined)?;
                        upsert_zone(tx, &zone)?;
                        pushlog.zone_changes.insert(zone.zone_id());
                    }
                    combined.to_string()
                }
                None => {
                    let zone = fresh_root_zone(scope, owner, record_id)?;
                    if ensure_zone(tx, &zone)? && !zone.is_default() {
                        pushlog.zone_changes.insert(zone.zone_id());
                    }
                    zone.combined_identifier()
                }
            },
        },
    };

    in_progress.remove(record_id);
    assigned.insert(record_id.clone(), combined.clone());
    Ok(combined)
}

/// The zone a root record with no zone gets: the default zone for Public,
/// a fresh uniquely named zone owned by the store's user otherwise.
fn fresh_root_zone(
    scope: ScopeKind,
    owner: Option<&str>,
    record_id: &RecordId,
) -> CacheResult<Zone> {
    match scope {
        ScopeKind::Public => Ok(Zone::default_zone(scope)),
        ScopeKind::Private | ScopeKind::Shared => {
            let owner = owner.ok_or_else(|| {
                CacheError::Invariant(format!(
                    "{} store has no owner while resolving a zone for record {}",
                    scope, record_id
                ))
            })?;
            Zone::fresh(owner, scope)
        }
    }
}

/// Delete a record and its descendant subtree, children before parents,
/// recording every deleted id.
fn delete_subtree(
    tx: &Transaction<'_>,
    record_id: &RecordId,
    pushlog: &mut UnpushedSets,
) -> CacheResult<()> {
    let children: Vec<RecordId> = {
        let mut stmt = tx.prepare("SELECT id FROM records WHERE parent_id = ?1")?;
        let rows = stmt.query_map(params![record_id], |row| row.get(0))?;
        rows.collect::<Result<_, _>>()?
    };
    for child in &children {
        delete_subtree(tx, child, pushlog)?;
    }
    tx.execute("DELETE FROM records WHERE id = ?1", params![record_id])?;
    pushlog.record_deletions.insert(record_id.clone());
    Ok(())
}

fn zone_exists(tx: &Transaction<'_>, combined: &str) -> CacheResult<bool> {
    let found: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM zones WHERE combined_id = ?1",
            params![combined],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn zone_row(tx: &Transaction<'_>, combined: &str) -> CacheResult<Option<Zone>> {
    let row: Option<(String, String, String)> = tx
        .query_row(
            "SELECT zone_name, owner_name, scope FROM zones WHERE combined_id = ?1",
            params![combined],
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

fn upsert_zone(tx: &Transaction<'_>, zone: &Zone) -> CacheResult<()> {
    tx.execute(
        "INSERT INTO zones (combined_id, zone_name, owner_name, scope)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(combined_id) DO UPDATE SET
             zone_name = excluded.zone_name,
             owner_name = excluded.owner_name",
        params![
            zone.combined_identifier(),
            zone.name(),
            zone.owner_name(),
            zone.scope().name()
        ],
    )?;
    Ok(())
}

/// Insert the zone if absent. Returns whether a row was created.
fn ensure_zone(tx: &Transaction<'_>, zone: &Zone) -> CacheResult<bool> {
    let created = tx.execute(
        "INSERT OR IGNORE INTO zones (combined_id, zone_name, owner_name, scope)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            zone.combined_identifier(),
            zone.name(),
            zone.owner_name(),
            zone.scope().name()
        ],
    )?;
    Ok(created > 0)
}

fn record_zone(tx: &Transaction<'_>, record_id: &str) -> CacheResult<Option<String>> {
    Ok(tx
        .query_row(
            "SELECT zone_id FROM records WHERE id = ?1",
            params![record_id],
            |row| row.get(0),
        )
        .optional()?)
}

fn records_in_zone(tx: &Transaction<'_>, combined: &str) -> CacheResult<i64> {
    Ok(tx.query_row(
        "SELECT COUNT(*) FROM records WHERE zone_id = ?1",
        params![combined],
        |row| row.get(0),
    )?)
}
