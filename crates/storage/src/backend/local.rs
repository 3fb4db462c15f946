//! Local filesystem storage backend.
//!
//! Walks a directory on the local filesystem using `tokio::fs` for async I/O,
//! and hands out `std::fs::File` readers for blocking work.

use crate::backend::{BoxReader, WalkStream};
use crate::error::ErrorKind;
use crate::filter::is_denied;
use crate::path::relative_to;
use crate::{FileInfo, StorageBackend, WalkEntry, WalkOptions, WalkWarning, WarningKind, error::Result};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};
use tokio::io::AsyncReadExt;

enum Visit {
    File(FileInfo),
    Descend(PathBuf),
    Warn(WalkWarning),
    Skip,
}

/// Local filesystem storage backend.
///
/// # Examples
///
/// ```no_run
/// use omni_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("home", "/srv/media")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    /// Root directory for the library
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// The root must be absolute. Its existence is **not** checked here; see
    /// [`StorageBackend::check_root`].
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self { name: name.into(), root })
    }

    /// Like [`absolute_path()`](Self::absolute_path), but also accepts the
    /// root itself.
    fn directory(&self, dir: &Path) -> Result<PathBuf> {
        if dir == self.root || dir.as_os_str().is_empty() {
            return Ok(self.root.clone());
        }
        self.absolute_path(dir)
    }

    /// Get the absolute path for an absolute or root-relative path.
    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = relative_to(&self.root, path.as_ref())?;
        Ok(self.root.join(validated))
    }

    /// Re-use same data collection from file metadata for both walk and stat functions
    fn file_info(path: PathBuf, metadata: &Metadata) -> std::io::Result<FileInfo> {
        let modified = metadata.modified()?.into();
        Ok(FileInfo::new(path, metadata.len(), modified))
    }

    fn unreadable(path: PathBuf, e: std::io::Error) -> Visit {
        Visit::Warn(WalkWarning { path, kind: WarningKind::Unreadable(e.to_string()) })
    }

    /// Classify a single directory entry. Keeps the stream loop free of the
    /// error plumbing that can't use `?` inside `stream!`.
    async fn visit(&self, entry: DirEntry, options: &WalkOptions, visited: &mut HashSet<PathBuf>) -> Visit {
        if is_denied(&entry.file_name()) {
            return Visit::Skip;
        }
        let path = entry.path();
        let file_type = match entry.file_type().await {
            Ok(file_type) => file_type,
            Err(e) => return Self::unreadable(path, e),
        };
        let metadata = if file_type.is_symlink() {
            match fs::metadata(&path).await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Visit::Warn(WalkWarning { path, kind: WarningKind::BrokenSymlink });
                },
                Err(e) => return Self::unreadable(path, e),
            }
        } else {
            match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => return Self::unreadable(path, e),
            }
        };

        if metadata.is_dir() {
            if !options.recursive {
                return Visit::Skip;
            }
            let canonical = match fs::canonicalize(&path).await {
                Ok(canonical) => canonical,
                Err(e) => return Self::unreadable(path, e),
            };
            if !visited.insert(canonical) {
                return Visit::Warn(WalkWarning { path, kind: WarningKind::SymlinkCycle });
            }
            return Visit::Descend(path);
        }
        if metadata.is_file() {
            let file = match Self::file_info(path.clone(), &metadata) {
                Ok(file) => file,
                Err(e) => return Self::unreadable(path, e),
            };
            if !options.includes(file.extension.as_deref()) {
                return Visit::Skip;
            }
            return Visit::File(file);
        }
        // Sockets, FIFOs, devices.
        Visit::Skip
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn root(&self) -> &Path {
        &self.root
    }

    async fn check_dir(&self, dir: &Path) -> Result<()> {
        let dir = self.directory(dir)?;
        let metadata = fs::metadata(&dir).await.map_err(|e| ErrorKind::from_io(e, &dir))?;
        if !metadata.is_dir() {
            exn::bail!(ErrorKind::InvalidPath(dir));
        }
        // Metadata can be readable while listing is not (directory without
        // the execute/read bits).
        fs::read_dir(&dir).await.map_err(|e| ErrorKind::from_io(e, &dir))?;
        Ok(())
    }

    fn walk<'a>(&'a self, options: WalkOptions) -> WalkStream<'a> {
        Box::pin(stream! {
            // Canonical paths of every directory entered so far; a directory
            // symlink that resolves into this set would loop forever.
            let start = match options.start.as_deref().map(|dir| self.directory(dir)).transpose() {
                Ok(start) => start.unwrap_or_else(|| self.root.clone()),
                Err(err) => {
                    yield Err(err);
                    return;
                },
            };
            let mut visited = HashSet::new();
            match fs::canonicalize(&start).await {
                Ok(canonical) => { visited.insert(canonical); },
                Err(e) => {
                    yield Err(exn::Exn::from(ErrorKind::from_io(e, &start)));
                    return;
                },
            }
            let mut stack = vec![start.clone()];

            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    Err(e) if current == start => {
                        yield Err(exn::Exn::from(ErrorKind::from_io(e, &current)));
                        return;
                    },
                    Err(e) => {
                        tracing::debug!(path = %current.display(), error = %e, "Skipping unreadable directory");
                        yield Ok(WalkEntry::Warning(WalkWarning { path: current, kind: WarningKind::Unreadable(e.to_string()) }));
                        continue 'dirs;
                    },
                };

                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => {
                            yield Ok(WalkEntry::Warning(WalkWarning { path: current.clone(), kind: WarningKind::Unreadable(e.to_string()) }));
                            break 'entries;
                        },
                    };
                    match self.visit(entry, &options, &mut visited).await {
                        Visit::File(file) => yield Ok(WalkEntry::File(file)),
                        Visit::Descend(dir) => stack.push(dir),
                        Visit::Warn(warning) => yield Ok(WalkEntry::Warning(warning)),
                        Visit::Skip => {},
                    }
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| ErrorKind::from_io(e, &abs_path))?)
    }

    async fn read_head(&self, path: &Path, bytes: usize) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        let file = fs::File::open(&abs_path).await.map_err(|e| ErrorKind::from_io(e, &abs_path))?;
        let mut buffer = Vec::with_capacity(bytes);
        file.take(bytes as u64).read_to_end(&mut buffer).await.map_err(ErrorKind::Io)?;
        Ok(buffer)
    }

    async fn reader(&self, path: &Path) -> Result<BoxReader> {
        let abs_path = self.absolute_path(path)?;
        let file = fs::File::open(&abs_path).await.map_err(|e| ErrorKind::from_io(e, &abs_path))?;
        Ok(Box::new(file.into_std().await))
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let abs_path = self.absolute_path(path)?;
        let metadata = fs::metadata(&abs_path).await.map_err(|e| ErrorKind::from_io(e, &abs_path))?;
        if !metadata.is_file() {
            exn::bail!(ErrorKind::InvalidPath(abs_path));
        }
        Ok(Self::file_info(abs_path, &metadata).map_err(ErrorKind::Io)?)
    }
}
