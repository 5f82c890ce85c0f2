//! Cumulus: a local, multi-scope record cache.
//!
//! Cumulus sits in front of a remote record-sync service. Client code
//! creates, mutates, and deletes tree-shaped records entirely against the
//! local cache; a commit pass folds the buffered mutations into durable
//! SQLite storage, enforces the structural invariants, and tracks which
//! entities still need to be pushed to (or were deleted ahead of) the
//! remote service.
//!
//! # Model
//!
//! - Three scopes partition the cache: **Public** (process-wide),
//!   **Private** and **Shared** (both keyed by the current user).
//! - Every record belongs to exactly one **zone**; all records of one
//!   parent/child tree share their root's zone.
//! - The Public store always has a `default` zone holding its root
//!   records; non-public roots get a fresh, uniquely named zone.
//! - Deleting a record cascades to its descendants; deleting a zone
//!   cascades to its records; a non-default zone left empty is cleaned up.
//!
//! # Usage
//!
//! Register a schema per record type, open a [`Cache`], and batch
//! mutations through [`Cache::write`]:
//!
//! ```no_run
//! use cumulus::{Cache, CacheConfig, FieldKind, FieldValue, Record, RecordSchema,
//!               SchemaRegistry, ScopeKind};
//!
//! # fn main() -> cumulus::CacheResult<()> {
//! let mut schemas = SchemaRegistry::new();
//! schemas.register(
//!     RecordSchema::new("todos")
//!         .with_field("title", FieldKind::Text)
//!         .with_field("done", FieldKind::Bool),
//! );
//!
//! let cache = Cache::open(CacheConfig { root: "/tmp/cumulus".into() }, schemas)?;
//!
//! let mut todo = Record::root("todos", ScopeKind::Private)?;
//! todo.set_field("title", FieldValue::Text("buy milk".into()));
//! cache.write(|cache| {
//!     cache.add(todo);
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! The remote push/pull protocol is an external collaborator: it consumes
//! the per-store unpushed sets ([`Cache::unpushed`]) and clears them once
//! pushed, and stores its server change tokens through the cache's
//! persisted configuration.

pub mod core;

pub use crate::core::cache::{Cache, CacheConfig};
pub use crate::core::directory::TEMPORARY_USER_ID;
pub use crate::core::error::{CacheError, CacheResult};
pub use crate::core::notify::NotificationToken;
pub use crate::core::record::{FieldKind, FieldValue, Record, RecordSchema, SchemaRegistry};
pub use crate::core::scope::{RecordId, ScopeKind, UserId, UserScope, ZoneId};
pub use crate::core::store::{ScopedStore, UnpushedSets};
pub use crate::core::zone::{DEFAULT_ZONE_NAME, Zone};
