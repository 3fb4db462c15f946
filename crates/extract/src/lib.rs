//! Metadata extraction for media files.
//!
//! Two halves: [`classify`] looks only at a path and works out what kind of
//! media it names, while the [`Registry`] of [`Extractor`]s reads the file
//! itself (container headers, ID3, EXIF). [`extract`] joins both into a
//! [`MediaRecord`](models::MediaRecord).

mod classify;
mod consts;
pub mod error;
pub mod extractors;
pub mod models;
mod registry;

use std::path::Path;

use tracing::instrument;

pub use crate::classify::classify;
use crate::error::Result;
pub use crate::extractors::{Extractor, Source};
use crate::models::MediaRecord;
pub use crate::registry::Registry;

/// Easy, top-level entrypoint: classify `path` and extract its contents from
/// `source` in one go.
///
/// Blocking. `size` is the size of the file behind `source`; a size of zero
/// fails with [`CorruptFile`](error::ErrorKind::CorruptFile).
///
/// # Errors
///
/// [`UnsupportedFormat`](error::ErrorKind::UnsupportedFormat) if the path has
/// no media extension, or if the contents don't match it.
#[instrument(skip(registry, source), fields(path = %path.display()))]
pub fn extract(registry: &Registry, path: &Path, source: &mut dyn Source, size: u64) -> Result<MediaRecord> {
    registry.extract(classify(path)?, source, size)
}
