//! Filesystem access for media libraries.
//!
//! The [`StorageBackend`] trait is the only way the scanner touches files: it
//! walks a library root lazily (see [`StorageBackend::walk`]) and hands out
//! blocking readers for hashing and metadata extraction. [`LocalBackend`]
//! reads the real filesystem; [`MockBackend`] (feature `mock`) keeps
//! everything in memory for tests.
//!
//! [`LocalBackend`]: crate::backend::LocalBackend
//! [`MockBackend`]: crate::backend::MockBackend

pub mod backend;
pub mod error;
pub mod file;
mod filter;
mod path;

pub use crate::backend::{ReadSeek, StorageBackend, WalkEntry, WalkOptions, WalkWarning, WarningKind};
pub use crate::file::FileInfo;
pub use crate::filter::is_denied;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
