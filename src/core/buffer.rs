//! Per-store mutation buffers.
//!
//! Buffering accumulates intended changes without touching durable storage
//! so many logical operations batch into one transaction. All operations
//! here are infallible and I/O-free; illegal states (a record with an
//! unresolvable zone, an unregistered record type) are caught later, at
//! commit time.
//!
//! Zone and record mutations share this one structure, guarded by a single
//! mutex in `ScopedStore`. Splitting them across two boundaries would let a
//! record upsert referencing a concurrently-deleted zone slip between two
//! commit passes, so they are deliberately unified.

use std::collections::{HashMap, HashSet};

use crate::core::record::Record;
use crate::core::scope::{RecordId, ZoneId};
use crate::core::zone::Zone;

#[derive(Debug, Default)]
pub struct MutationBuffer {
    /// Pending zone upserts, keyed by combined identifier.
    zone_upserts: HashMap<String, Zone>,
    /// Pending zone deletions, by zone id.
    zone_deletions: HashSet<ZoneId>,
    /// Pending record upserts, keyed by record id.
    record_upserts: HashMap<RecordId, Record>,
    /// Pending record deletions, by record id.
    record_deletions: HashSet<RecordId>,
}

impl MutationBuffer {
    pub fn new() -> MutationBuffer {
        MutationBuffer::default()
    }

    /// An upsert issued after a deletion was already buffered for the same
    /// zone is dropped: the delete wins.
    pub fn buffer_zone_upsert(&mut self, zone: Zone) {
        if self.zone_deletions.contains(&zone.zone_id()) {
            return;
        }
        self.zone_upserts.insert(zone.combined_identifier(), zone);
    }

    /// Buffer a zone deletion. Any pending upsert for the same zone is
    /// withdrawn, as are pending record upserts targeting it; the records
    /// durably contained in the zone fall to the cascade at commit time.
    pub fn buffer_zone_deletion(&mut self, zone: &Zone) {
        let zone_id = zone.zone_id();
        let combined = zone.combined_identifier();
        self.zone_upserts.remove(&combined);
        self.record_upserts
            .retain(|_, record| record.zone_combined_id() != Some(combined.as_str()));
        self.zone_deletions.insert(zone_id);
    }

    /// Same delete-wins guard as for zones.
    pub fn buffer_record_upsert(&mut self, record: Record) {
        if self.record_deletions.contains(record.id()) {
            return;
        }
        self.record_upserts.insert(record.id().clone(), record);
    }

    pub fn buffer_record_deletion(&mut self, record_id: RecordId) {
        self.record_upserts.remove(&record_id);
        self.record_deletions.insert(record_id);
    }

    pub fn is_empty(&self) -> bool {
        self.zone_upserts.is_empty()
            && self.zone_deletions.is_empty()
            && self.record_upserts.is_empty()
            && self.record_deletions.is_empty()
    }

    pub fn zone_upserts(&self) -> impl Iterator<Item = &Zone> {
        self.zone_upserts.values()
    }

    pub fn zone_deletions(&self) -> impl Iterator<Item = &ZoneId> {
        self.zone_deletions.iter()
    }

    pub fn record_upserts(&self) -> &HashMap<RecordId, Record> {
        &self.record_upserts
    }

    pub fn record_deletions(&self) -> impl Iterator<Item = &RecordId> {
        self.record_deletions.iter()
    }

    /// Called by the reconciler only after its transaction has committed.
    /// A failed commit leaves the buffers untouched so a retry can run.
    pub fn clear(&mut self) {
        self.zone_upserts.clear();
        self.zone_deletions.clear();
        self.record_upserts.clear();
        self.record_deletions.clear();
    }
}
