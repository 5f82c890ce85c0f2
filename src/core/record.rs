//! Records: tree-shaped domain entities, and the per-type field schemas
//! the reconciler copies from.
//!
//! A record's `parent_id` is a weak back-reference, not an ownership edge;
//! the descendant set is derived by the reconciler when it cascades.
//! Field copy is schema-driven: each record type declares its field names
//! and kinds up front, and the commit pass copies exactly the declared
//! fields onto the durable row. Undeclared keys never reach storage.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::core::error::{CacheError, CacheResult};
use crate::core::scope::{RecordId, ScopeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    Text,
    /// Unix-epoch seconds.
    Timestamp,
    Bytes,
    /// Reference to another record by id.
    Reference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(i64),
    Bytes(Vec<u8>),
    Reference(RecordId),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::Int(_) => FieldKind::Int,
            FieldValue::Float(_) => FieldKind::Float,
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Timestamp(_) => FieldKind::Timestamp,
            FieldValue::Bytes(_) => FieldKind::Bytes,
            FieldValue::Reference(_) => FieldKind::Reference,
        }
    }
}

/// Declared shape of one record type: field name -> kind.
#[derive(Debug, Clone)]
pub struct RecordSchema {
    record_type: String,
    fields: Vec<(String, FieldKind)>,
}

impl RecordSchema {
    pub fn new(record_type: impl Into<String>) -> RecordSchema {
        RecordSchema {
            record_type: record_type.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> RecordSchema {
        self.fields.push((name.into(), kind));
        self
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    pub fn field_kind(&self, name: &str) -> Option<FieldKind> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, k)| *k)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Project the declared fields of a pending record into the map that
    /// gets persisted. A set field whose kind contradicts the declaration
    /// fails the whole commit.
    pub fn project_fields(
        &self,
        pending: &BTreeMap<String, FieldValue>,
    ) -> CacheResult<BTreeMap<String, FieldValue>> {
        let mut out = BTreeMap::new();
        for (name, kind) in &self.fields {
            if let Some(value) = pending.get(name) {
                if value.kind() != *kind {
                    return Err(CacheError::Invariant(format!(
                        "record type {}: field {} declared {:?} but set as {:?}",
                        self.record_type,
                        name,
                        kind,
                        value.kind()
                    )));
                }
                out.insert(name.clone(), value.clone());
            }
        }
        Ok(out)
    }
}

/// All record schemas known to one cache instance, registered at startup.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, RecordSchema>,
}

impl SchemaRegistry {
    pub fn new() -> SchemaRegistry {
        SchemaRegistry::default()
    }

    pub fn register(&mut self, schema: RecordSchema) {
        self.schemas.insert(schema.record_type().to_string(), schema);
    }

    pub fn get(&self, record_type: &str) -> Option<&RecordSchema> {
        self.schemas.get(record_type)
    }

    /// The schema for a record that is about to be persisted. A record of
    /// an unregistered type reaching a commit is a programming error.
    pub fn require(&self, record_type: &str) -> CacheResult<&RecordSchema> {
        self.get(record_type).ok_or_else(|| {
            CacheError::Invariant(format!(
                "no schema registered for record type {}",
                record_type
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: RecordId,
    record_type: String,
    scope: ScopeKind,
    parent_id: Option<RecordId>,
    zone_combined_id: Option<String>,
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// A new root record. Roots cannot live in the Shared scope: shared
    /// data always hangs off a record owned by someone else.
    pub fn root(record_type: impl Into<String>, scope: ScopeKind) -> CacheResult<Record> {
        if scope == ScopeKind::Shared {
            return Err(CacheError::Configuration(
                "root records cannot be created in the shared scope".to_string(),
            ));
        }
        Ok(Record {
            id: Ulid::new().to_string(),
            record_type: record_type.into(),
            scope,
            parent_id: None,
            zone_combined_id: None,
            fields: BTreeMap::new(),
        })
    }

    /// A new child of an existing record. Scope and zone follow the parent.
    pub fn child_of(record_type: impl Into<String>, parent: &Record) -> Record {
        Record {
            id: Ulid::new().to_string(),
            record_type: record_type.into(),
            scope: parent.scope,
            parent_id: Some(parent.id.clone()),
            zone_combined_id: parent.zone_combined_id.clone(),
            fields: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    pub fn scope(&self) -> ScopeKind {
        self.scope
    }

    pub fn parent_id(&self) -> Option<&RecordId> {
        self.parent_id.as_ref()
    }

    /// Combined identifier of the zone this record belongs to. `None` until
    /// the record has been through a commit pass (or inherited a zone from
    /// its parent at creation).
    pub fn zone_combined_id(&self) -> Option<&str> {
        self.zone_combined_id.as_deref()
    }

    /// Reparent this record. The zone follows the new parent; the commit
    /// pass re-resolves it for the whole tree.
    pub fn set_parent(&mut self, parent: &Record) {
        self.parent_id = Some(parent.id.clone());
        self.zone_combined_id = parent.zone_combined_id.clone();
    }

    /// Detach this record from its parent, making it a root. Its zone is
    /// re-resolved at the next commit.
    pub fn clear_parent(&mut self) {
        self.parent_id = None;
        self.zone_combined_id = None;
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn clear_field(&mut self, name: &str) {
        self.fields.remove(name);
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub(crate) fn set_zone_combined_id(&mut self, combined: Option<String>) {
        self.zone_combined_id = combined;
    }

    pub(crate) fn from_parts(
        id: RecordId,
        record_type: String,
        scope: ScopeKind,
        parent_id: Option<RecordId>,
        zone_combined_id: Option<String>,
        fields: BTreeMap<String, FieldValue>,
    ) -> Record {
        Record {
            id,
            record_type,
            scope,
            parent_id,
            zone_combined_id,
            fields,
        }
    }
}
