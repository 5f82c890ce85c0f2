//! Zones: named partitions of records within one scope.
//!
//! A zone's primary key in the durable store is its *combined identifier*
//! `"<scope>+<name>+<owner>"`. The combined identifier is derived from the
//! zone's current fields on every call, never cached, so a renamed or
//! re-owned zone can never be looked up under a stale key.

use ulid::Ulid;

use crate::core::error::{CacheError, CacheResult};
use crate::core::scope::{ScopeKind, ZoneId};

/// Name of the one zone every Public store is guaranteed to have.
/// It holds all root Public records and is never deleted, even when empty.
pub const DEFAULT_ZONE_NAME: &str = "default";

/// Owner name used for zones that belong to no particular user,
/// i.e. the Public store's default zone.
pub const DEFAULT_OWNER_NAME: &str = "default-owner";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Zone {
    name: String,
    owner_name: String,
    scope: ScopeKind,
}

impl Zone {
    /// Zone names and owner names must not contain `+`, the separator
    /// inside zone ids and combined identifiers: two zones whose
    /// concatenated parts read the same would otherwise alias one
    /// durable primary key.
    pub fn new(
        name: impl Into<String>,
        owner_name: impl Into<String>,
        scope: ScopeKind,
    ) -> CacheResult<Zone> {
        let name = name.into();
        let owner_name = owner_name.into();
        validate_component("zone name", &name)?;
        validate_component("zone owner name", &owner_name)?;
        Ok(Zone {
            name,
            owner_name,
            scope,
        })
    }

    /// A fresh, uniquely named zone. Created alongside every non-public
    /// root record.
    pub fn fresh(owner_name: impl Into<String>, scope: ScopeKind) -> CacheResult<Zone> {
        Zone::new(Ulid::new().to_string(), owner_name, scope)
    }

    /// The default zone for a scope. Only the Public store actually
    /// guarantees its existence.
    pub fn default_zone(scope: ScopeKind) -> Zone {
        Zone {
            name: DEFAULT_ZONE_NAME.to_string(),
            owner_name: DEFAULT_OWNER_NAME.to_string(),
            scope,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner_name(&self) -> &str {
        &self.owner_name
    }

    pub fn scope(&self) -> ScopeKind {
        self.scope
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> CacheResult<()> {
        let name = name.into();
        validate_component("zone name", &name)?;
        self.name = name;
        Ok(())
    }

    pub fn set_owner_name(&mut self, owner_name: impl Into<String>) -> CacheResult<()> {
        let owner_name = owner_name.into();
        validate_component("zone owner name", &owner_name)?;
        self.owner_name = owner_name;
        Ok(())
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_ZONE_NAME
    }

    /// Remote-facing zone id, the value tracked in the unpushed sets.
    pub fn zone_id(&self) -> ZoneId {
        format!("{}+{}", self.name, self.owner_name)
    }

    /// Durable primary key. Recomputed from the current fields on every call.
    pub fn combined_identifier(&self) -> String {
        format!("{}+{}+{}", self.scope.name(), self.name, self.owner_name)
    }

    /// Rebuild a zone from a combined identifier. Used when a record still
    /// references a zone that no longer exists durably and must be
    /// recreated during a commit pass.
    pub fn parse_combined(combined: &str) -> CacheResult<Zone> {
        let parts: Vec<&str> = combined.split('+').collect();
        let [scope_name, name, owner] = parts.as_slice() else {
            return Err(CacheError::Invariant(format!(
                "malformed combined zone identifier: {}",
                combined
            )));
        };
        let scope = ScopeKind::from_name(scope_name).ok_or_else(|| {
            CacheError::Invariant(format!(
                "unknown scope in combined zone identifier: {}",
                combined
            ))
        })?;
        Zone::new(*name, *owner, scope)
    }
}

fn validate_component(what: &str, value: &str) -> CacheResult<()> {
    if value.contains('+') {
        return Err(CacheError::Configuration(format!(
            "{} {:?} must not contain '+'",
            what, value
        )));
    }
    Ok(())
}
