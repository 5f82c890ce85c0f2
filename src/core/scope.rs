//! Scope tags for the cache's top-level partitions.
//!
//! The cache maintains one durable store per scope: a single process-wide
//! Public store, and per-user Private and Shared stores. `UserScope` exists
//! so that constructing a user-keyed Public store is unrepresentable.

use serde::{Deserialize, Serialize};

/// Stable string identifier for a record. ULID in canonical form.
pub type RecordId = String;

/// Stable string identifier for a zone: `"<zone name>+<owner name>"`.
/// This is the remote-facing id recorded in the unpushed sets.
pub type ZoneId = String;

/// Identifier of the locally-known owning user.
pub type UserId = String;

/// Top-level partition of the whole cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    /// Process-wide, single-instance, not keyed by user.
    Public,
    /// Per-user data owned by the current user.
    Private,
    /// Per-user data shared with the current user by others.
    Shared,
}

impl ScopeKind {
    pub fn name(&self) -> &'static str {
        match self {
            ScopeKind::Public => "public",
            ScopeKind::Private => "private",
            ScopeKind::Shared => "shared",
        }
    }

    pub fn from_name(name: &str) -> Option<ScopeKind> {
        match name {
            "public" => Some(ScopeKind::Public),
            "private" => Some(ScopeKind::Private),
            "shared" => Some(ScopeKind::Shared),
            _ => None,
        }
    }

    pub fn all() -> [ScopeKind; 3] {
        [ScopeKind::Public, ScopeKind::Private, ScopeKind::Shared]
    }

    pub fn is_user_scoped(&self) -> bool {
        !matches!(self, ScopeKind::Public)
    }
}

impl std::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The two scopes whose stores are keyed by a user identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserScope {
    Private,
    Shared,
}

impl UserScope {
    pub fn kind(&self) -> ScopeKind {
        match self {
            UserScope::Private => ScopeKind::Private,
            UserScope::Shared => ScopeKind::Shared,
        }
    }

    pub fn both() -> [UserScope; 2] {
        [UserScope::Private, UserScope::Shared]
    }
}
