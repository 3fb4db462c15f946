//! Fingerprint and media record datastore.
//!
//! Fingerprints are the only state the scanner keeps between scans: one per
//! `(user, path)`, recording the content hash, size and modification time
//! seen last time, so that unchanged files can be skipped. Each fingerprint
//! may link to the [`MediaRecord`](omni_extract::models::MediaRecord)
//! extracted from the file.
//!
//! The scanner depends on the [`Datastore`] trait only. [`Repository`] is
//! the SQLite implementation; [`MemoryStore`] (feature `mock`) keeps
//! everything in memory and can inject failures.

mod db;
pub mod error;
#[cfg(feature = "mock")]
mod memory;
pub mod models;
mod repo;
mod store;

pub use crate::db::Database;
#[cfg(feature = "mock")]
pub use crate::memory::MemoryStore;
pub use crate::repo::Repository;
pub use crate::store::Datastore;
