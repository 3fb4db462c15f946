//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which provides a unified
//! interface for walking and reading a media library.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::Result;
use crate::file::FileInfo;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::collections::HashSet;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::pin::Pin;

pub type WalkStream<'a> = Pin<Box<dyn Stream<Item = Result<WalkEntry>> + Send + 'a>>;

/// Blocking, seekable reader handed to hashing and extraction code.
pub trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

pub type BoxReader = Box<dyn ReadSeek + 'static>;

/// Include rules for a walk.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Only yield files with one of these (lowercase) extensions. `None`
    /// yields every file that survives the denylist.
    pub extensions: Option<HashSet<String>>,
    /// Directory to walk, absolute or relative to the root. `None` walks
    /// the whole library.
    pub start: Option<PathBuf>,
}
impl Default for WalkOptions {
    fn default() -> Self {
        Self { recursive: true, extensions: None, start: None }
    }
}
impl WalkOptions {
    /// Walk only the directory at `dir` (and, if recursive, below it).
    pub fn from(mut self, dir: impl Into<PathBuf>) -> Self {
        self.start = Some(dir.into());
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = Some(extensions.into_iter().map(|e| e.into().to_ascii_lowercase()).collect());
        self
    }

    /// Whether a file's extension passes the include rules.
    pub fn includes(&self, extension: Option<&str>) -> bool {
        match (&self.extensions, extension) {
            (None, _) => true,
            (Some(allowed), Some(ext)) => allowed.contains(ext),
            (Some(_), None) => false,
        }
    }
}

/// Something the walk could not descend into or yield, but which does not
/// stop the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkWarning {
    pub path: PathBuf,
    pub kind: WarningKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    /// A directory symlink resolves to a directory already visited in this
    /// walk; following it would loop.
    SymlinkCycle,
    /// A symlink whose target does not exist.
    BrokenSymlink,
    /// A subdirectory or entry could not be read.
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEntry {
    File(FileInfo),
    Warning(WalkWarning),
}

/// Unified interface for reading a media library.
///
/// All paths handed out by a backend are absolute. Every method that accepts
/// a path also accepts one relative to [`root()`](Self::root); either form is
/// resolved so that it can never escape the root.
///
/// # Examples
///
/// ```
/// use futures::TryStreamExt;
/// use omni_storage::{StorageBackend, WalkEntry, WalkOptions, error::Result};
///
/// async fn count_videos(backend: &dyn StorageBackend) -> Result<usize> {
///     backend.check_root().await?;
///     let options = WalkOptions::default().extensions(["mkv", "mp4"]);
///     let mut files = 0;
///     let mut walk = backend.walk(options);
///     while let Some(entry) = walk.try_next().await? {
///         if let WalkEntry::File(_) = entry {
///             files += 1;
///         }
///     }
///     Ok(files)
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// Absolute root directory of the library.
    fn root(&self) -> &Path;

    /// Confirm the root exists, is a directory, and can be listed.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound),
    /// [`PermissionDenied`](crate::error::ErrorKind::PermissionDenied) or
    /// [`InvalidPath`](crate::error::ErrorKind::InvalidPath) (root is not a
    /// directory). A walk over a root that fails this check yields nothing,
    /// so callers must check first rather than treat an empty walk as an
    /// empty library.
    async fn check_root(&self) -> Result<()> {
        self.check_dir(self.root()).await
    }

    /// [`check_root()`](Self::check_root) for a directory inside the
    /// library, absolute or relative to the root. The root itself is
    /// accepted too.
    async fn check_dir(&self, dir: &Path) -> Result<()>;

    /// Lazily walk the library (or the directory named by
    /// [`WalkOptions::start`]), yielding files and non-fatal warnings as the
    /// tree is traversed.
    ///
    /// The denylist ([`is_denied`](crate::is_denied)) is applied to every
    /// file and directory name, and `options` to every file. Entries that
    /// can't be read are yielded as [`WalkEntry::Warning`]; an `Err` is only
    /// yielded when the starting directory itself can't be listed, and ends
    /// the walk.
    fn walk<'a>(&'a self, options: WalkOptions) -> WalkStream<'a>;

    /// Collect every file from [`walk()`](Self::walk), discarding warnings.
    async fn list(&self, options: WalkOptions) -> Result<Vec<FileInfo>> {
        self.walk(options)
            .try_filter_map(|entry| async move {
                Ok(match entry {
                    WalkEntry::File(file) => Some(file),
                    WalkEntry::Warning(_) => None,
                })
            })
            .try_collect()
            .await
    }

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Read only the first N bytes (for magic byte detection).
    ///
    /// If the file is smaller than `bytes`, returns the entire file.
    async fn read_head(&self, path: &Path, bytes: usize) -> Result<Vec<u8>>;

    /// Open a file for blocking, seekable reads.
    ///
    /// Returns a `'static` boxed reader suitable for use inside
    /// [`spawn_blocking`](tokio::task::spawn_blocking). The async setup
    /// (opening the file) happens before returning.
    async fn reader(&self, path: &Path) -> Result<BoxReader>;

    /// Get file metadata without reading contents.
    async fn stat(&self, path: &Path) -> Result<FileInfo>;
}
