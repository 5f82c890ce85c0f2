//! Core modules of the cumulus cache engine.
//!
//! The reconciler and the scoped store are the heart of the crate; the
//! rest is the data model, the mutation buffers feeding the reconciler,
//! and the directory that keys stores by scope and owning user.

pub mod buffer;
pub mod cache;
pub mod config_storage;
pub mod db;
pub mod directory;
pub mod error;
pub mod notify;
pub mod reconciler;
pub mod record;
pub mod schemas;
pub mod scope;
pub mod store;
pub mod zone;
