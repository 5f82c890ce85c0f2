//! Commit-pass behavior: zone assignment, cascades, cleanup, atomicity.

use cumulus::{
    Cache, CacheConfig, FieldKind, FieldValue, Record, RecordSchema, SchemaRegistry, ScopeKind,
    ScopedStore, Zone,
};

fn schemas() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry.register(
        RecordSchema::new("todos")
            .with_field("title", FieldKind::Text)
            .with_field("done", FieldKind::Bool),
    );
    registry
}

fn open_cache(root: &std::path::Path) -> Cache {
    Cache::open(
        CacheConfig {
            root: root.to_path_buf(),
        },
        schemas(),
    )
    .unwrap()
}

#[test]
fn test_public_root_lands_in_default_zone() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = open_cache(tmp.path());

    let record = Record::root("todos", ScopeKind::Public).unwrap();
    let id = record.id().clone();
    cache.add(record);
    cache.flush().unwrap();

    let fetched = cache.fetch("todos", &id, ScopeKind::Public).unwrap().unwrap();
    let default_combined = Zone::default_zone(ScopeKind::Public).combined_identifier();
    assert_eq!(fetched.zone_combined_id(), Some(default_combined.as_str()));

    let zones = cache.zones(ScopeKind::Public).unwrap();
    assert_eq!(zones.len(), 1);
    assert!(zones[0].is_default());
}

#[test]
fn test_private_roots_get_fresh_unique_zones() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = open_cache(tmp.path());

    let a = Record::root("todos", ScopeKind::Private).unwrap();
    let b = Record::root("todos", ScopeKind::Private).unwrap();
    let (a_id, b_id) = (a.id().clone(), b.id().clone());
    cache.add_all([a, b]);
    cache.flush().unwrap();

    let a = cache.fetch("todos", &a_id, ScopeKind::Private).unwrap().unwrap();
    let b = cache.fetch("todos", &b_id, ScopeKind::Private).unwrap().unwrap();
    assert!(a.zone_combined_id().is_some());
    assert_ne!(a.zone_combined_id(), b.zone_combined_id());

    let zones = cache.zones(ScopeKind::Private).unwrap();
    assert_eq!(zones.len(), 2);
    assert!(zones.iter().all(|zone| !zone.is_default()));
}

#[test]
fn test_tree_shares_root_zone_across_batches() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = open_cache(tmp.path());

    let root = Record::root("todos", ScopeKind::Private).unwrap();
    let child = Record::child_of("todos", &root);
    let (root_id, child_id) = (root.id().clone(), child.id().clone());
    cache.add_all([root, child]);
    cache.flush().unwrap();

    let root = cache.fetch("todos", &root_id, ScopeKind::Private).unwrap().unwrap();
    let child = cache.fetch("todos", &child_id, ScopeKind::Private).unwrap().unwrap();
    assert_eq!(root.zone_combined_id(), child.zone_combined_id());

    // A child added in a later batch joins the durable parent's zone.
    let late_child = Record::child_of("todos", &root);
    let late_id = late_child.id().clone();
    cache.add(late_child);
    cache.flush().unwrap();

    let late_child = cache.fetch("todos", &late_id, ScopeKind::Private).unwrap().unwrap();
    assert_eq!(late_child.zone_combined_id(), root.zone_combined_id());
}

#[test]
fn test_cascading_delete_removes_whole_subtree() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = open_cache(tmp.path());

    let root = Record::root("todos", ScopeKind::Public).unwrap();
    let c1 = Record::child_of("todos", &root);
    let c2 = Record::child_of("todos", &root);
    let g1 = Record::child_of("todos", &c1);
    let ids = [
        root.id().clone(),
        c1.id().clone(),
        c2.id().clone(),
        g1.id().clone(),
    ];
    cache.add_all([root.clone(), c1, c2, g1]);
    cache.flush().unwrap();

    cache.remove(&root);
    cache.flush().unwrap();

    for id in &ids {
        assert!(cache.fetch("todos", id, ScopeKind::Public).unwrap().is_none());
    }
    for id in &ids {
        assert!(cache.unpushed(ScopeKind::Public).record_deletions.contains(id));
    }

    // The default zone survives even when emptied.
    let zones = cache.zones(ScopeKind::Public).unwrap();
    assert_eq!(zones.len(), 1);
    assert!(zones[0].is_default());
}

#[test]
fn test_empty_zone_cleanup_for_non_public_scopes() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = open_cache(tmp.path());

    let record = Record::root("todos", ScopeKind::Private).unwrap();
    cache.add(record.clone());
    cache.flush().unwrap();
    assert_eq!(cache.zones(ScopeKind::Private).unwrap().len(), 1);

    cache.remove(&record);
    cache.flush().unwrap();
    assert!(cache.zones(ScopeKind::Private).unwrap().is_empty());
}

#[test]
fn test_deleting_absent_record_is_a_no_op() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = open_cache(tmp.path());

    let never_committed = Record::root("todos", ScopeKind::Private).unwrap();
    cache.remove(&never_committed);
    cache.flush().unwrap();

    assert!(cache.fetch_all("todos", ScopeKind::Private).unwrap().is_empty());
    assert!(cache.unpushed(ScopeKind::Private).is_empty());
}

#[test]
fn test_delete_wins_when_same_id_is_removed_then_added() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = open_cache(tmp.path());

    let record = Record::root("todos", ScopeKind::Private).unwrap();
    cache.add(record.clone());
    cache.flush().unwrap();

    cache.remove(&record);
    cache.add(record.clone());
    cache.flush().unwrap();

    assert!(
        cache
            .fetch("todos", record.id(), ScopeKind::Private)
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_zone_deleted_and_retargeted_in_one_batch_is_recreated() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = open_cache(tmp.path());

    let record = Record::root("todos", ScopeKind::Private).unwrap();
    cache.add(record.clone());
    cache.flush().unwrap();

    let zone = cache.zones(ScopeKind::Private).unwrap().remove(0);
    let committed = cache
        .fetch("todos", record.id(), ScopeKind::Private)
        .unwrap()
        .unwrap();

    // Same batch: delete the zone, then re-add a record that points at it.
    cache.remove_zone(&zone);
    cache.add(committed.clone());
    cache.flush().unwrap();

    let fetched = cache
        .fetch("todos", committed.id(), ScopeKind::Private)
        .unwrap()
        .unwrap();
    assert_eq!(
        fetched.zone_combined_id(),
        Some(zone.combined_identifier().as_str())
    );
    assert_eq!(cache.zones(ScopeKind::Private).unwrap().len(), 1);
}

#[test]
fn test_explicit_zone_deletion_cascades_and_is_tracked() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = open_cache(tmp.path());

    let root = Record::root("todos", ScopeKind::Private).unwrap();
    let child = Record::child_of("todos", &root);
    let child_id = child.id().clone();
    cache.add_all([root.clone(), child]);
    cache.flush().unwrap();

    let zone = cache.zones(ScopeKind::Private).unwrap().remove(0);
    cache.remove_zone(&zone);
    cache.flush().unwrap();

    assert!(cache.fetch("todos", root.id(), ScopeKind::Private).unwrap().is_none());
    assert!(cache.fetch("todos", &child_id, ScopeKind::Private).unwrap().is_none());
    assert!(cache.zones(ScopeKind::Private).unwrap().is_empty());
    assert!(
        cache
            .unpushed(ScopeKind::Private)
            .zone_deletions
            .contains(&zone.zone_id())
    );
}

#[test]
fn test_failed_commit_is_atomic_and_keeps_buffers_for_retry() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = open_cache(tmp.path());

    // Build a parent cycle: a -> b -> a. The batch also carries an
    // innocent bystander that must not slip through on its own.
    let mut a = Record::root("todos", ScopeKind::Private).unwrap();
    let b = Record::child_of("todos", &a);
    a.set_parent(&b);
    let bystander = Record::root("todos", ScopeKind::Private).unwrap();

    cache.add_all([a.clone(), b.clone(), bystander.clone()]);
    assert!(cache.flush().is_err());

    // All-or-nothing: nothing from the failed batch is durable.
    assert!(cache.fetch_all("todos", ScopeKind::Private).unwrap().is_empty());
    assert!(cache.unpushed(ScopeKind::Private).is_empty());

    // The buffers survived; fixing the bad record and retrying commits
    // the entire original batch.
    a.clear_parent();
    cache.add(a.clone());
    cache.flush().unwrap();

    for id in [a.id(), b.id(), bystander.id()] {
        assert!(cache.fetch("todos", id, ScopeKind::Private).unwrap().is_some());
    }
}

#[test]
fn test_unregistered_record_type_fails_the_commit() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = open_cache(tmp.path());

    cache.add(Record::root("ghosts", ScopeKind::Public).unwrap());
    assert!(cache.flush().is_err());
}

#[test]
fn test_unpushed_bookkeeping_and_clearing() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = open_cache(tmp.path());

    let mut record = Record::root("todos", ScopeKind::Private).unwrap();
    record.set_field("title", FieldValue::Text("push me".to_string()));
    cache.add(record.clone());
    cache.flush().unwrap();

    let unpushed = cache.unpushed(ScopeKind::Private);
    assert!(unpushed.record_changes.contains(record.id()));
    // The freshly created zone needs pushing too.
    assert_eq!(unpushed.zone_changes.len(), 1);

    cache.mark_records_pushed(ScopeKind::Private, &[record.id().clone()]);
    let zone_ids: Vec<_> = unpushed.zone_changes.iter().cloned().collect();
    cache.mark_zones_pushed(ScopeKind::Private, &zone_ids);
    assert!(cache.unpushed(ScopeKind::Private).is_empty());

    cache.remove(&record);
    cache.flush().unwrap();
    let unpushed = cache.unpushed(ScopeKind::Private);
    assert!(unpushed.record_deletions.contains(record.id()));

    cache.mark_record_deletions_pushed(ScopeKind::Private, &[record.id().clone()]);
    assert!(cache.unpushed(ScopeKind::Private).is_empty());
}

#[test]
fn test_zone_lookup_by_combined_identifier() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ScopedStore::public(tmp.path()).unwrap();
    store.add_record(Record::root("todos", ScopeKind::Public).unwrap());
    store.commit(&schemas()).unwrap();

    let combined = Zone::default_zone(ScopeKind::Public).combined_identifier();
    let zone = store.zone(&combined).unwrap().unwrap();
    assert!(zone.is_default());
    assert_eq!(zone.combined_identifier(), combined);

    assert!(store.zone("public+nope+nobody").unwrap().is_none());
}

#[test]
fn test_declared_fields_round_trip_and_undeclared_are_dropped() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = open_cache(tmp.path());

    let mut record = Record::root("todos", ScopeKind::Public).unwrap();
    record.set_field("title", FieldValue::Text("buy milk".to_string()));
    record.set_field("done", FieldValue::Bool(false));
    record.set_field("undeclared", FieldValue::Int(42));
    cache.add(record.clone());
    cache.flush().unwrap();

    let fetched = cache
        .fetch("todos", record.id(), ScopeKind::Public)
        .unwrap()
        .unwrap();
    assert_eq!(
        fetched.field("title"),
        Some(&FieldValue::Text("buy milk".to_string()))
    );
    assert_eq!(fetched.field("done"), Some(&FieldValue::Bool(false)));
    assert_eq!(fetched.field("undeclared"), None);
}
