//! In-memory storage backend for testing.

use super::{BoxReader, WalkStream};
use crate::error::{ErrorKind, Result};
use crate::file::FileInfo;
use crate::filter::is_denied;
use crate::path::relative_to;
use crate::{StorageBackend, WalkEntry, WalkOptions};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use time::UtcDateTime;
use tokio::sync::RwLock;

const MOCK_ROOT: &str = "/mock";

struct MockFile {
    modified: UtcDateTime,
    data: Vec<u8>,
}

/// In-memory storage backend for testing.
///
/// Files are stored (relative to a fake root of `/mock`) in a map behind a
/// [`RwLock`], so the test can mutate the library between scans while a
/// scanner holds the backend. Individual files can be made unreadable, and
/// the root can be made to disappear, to exercise error paths.
///
/// # Examples
///
/// ```
/// use omni_storage::backend::MockBackend;
/// use omni_storage::StorageBackend;
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([
///     ("Shows/Show.S01E01.mkv", b"...".to_vec()),
/// ]);
/// assert!(backend.exists(Path::new("Shows/Show.S01E01.mkv")).await?);
/// assert!(backend.exists(Path::new("/mock/Shows/Show.S01E01.mkv")).await?);
///
/// backend.write(Path::new("Shows/Show.S01E02.mkv"), b"data...").await?;
/// assert!(backend.exists(Path::new("Shows/Show.S01E02.mkv")).await?);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    root: PathBuf,
    missing_root: bool,
    storage: RwLock<BTreeMap<PathBuf, MockFile>>,
    unreadable: RwLock<HashSet<PathBuf>>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let root = PathBuf::from(MOCK_ROOT);
        let mut map = BTreeMap::new();
        let now = UtcDateTime::now();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = relative_to(&root, &path) else {
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, MockFile { modified: now, data: data.into() });
        }
        Self {
            name: "mock".to_string(),
            root,
            missing_root: false,
            storage: RwLock::new(map),
            unreadable: RwLock::new(HashSet::new()),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Pretend the root directory does not exist.
    pub fn with_missing_root(mut self) -> Self {
        self.missing_root = true;
        self
    }

    /// Create or replace a file, stamping it with the current time.
    pub async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.write_with_modified(path, data, UtcDateTime::now()).await
    }

    /// Create or replace a file with an explicit modification time.
    ///
    /// Rewriting a file with same-sized content and its old timestamp
    /// produces a change that only a content hash can see.
    pub async fn write_with_modified(&self, path: &Path, data: &[u8], modified: UtcDateTime) -> Result<()> {
        let path = relative_to(&self.root, path)?;
        self.storage.write().await.insert(path, MockFile { modified, data: data.to_vec() });
        Ok(())
    }

    pub async fn remove(&self, path: &Path) -> Result<()> {
        let path = relative_to(&self.root, path)?;
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }

    /// Make subsequent reads of `path` fail with `PermissionDenied`. The file
    /// still shows up in walks.
    pub async fn deny_read(&self, path: &Path) -> Result<()> {
        let path = relative_to(&self.root, path)?;
        self.unreadable.write().await.insert(path);
        Ok(())
    }

    async fn contents(&self, path: &Path) -> Result<Vec<u8>> {
        let relative = relative_to(&self.root, path)?;
        if self.unreadable.read().await.contains(&relative) {
            exn::bail!(ErrorKind::PermissionDenied(self.root.join(relative)));
        }
        let guard = self.storage.read().await;
        let file = guard.get(&relative).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(self.root.join(&relative))))?;
        Ok(file.data.clone())
    }

    /// Root-relative form of a directory; empty for the root itself.
    fn directory(&self, dir: &Path) -> Result<PathBuf> {
        if dir == self.root || dir.as_os_str().is_empty() {
            return Ok(PathBuf::new());
        }
        relative_to(&self.root, dir)
    }

    fn visible(relative: &Path, start: &Path, options: &WalkOptions) -> bool {
        let Ok(inside) = relative.strip_prefix(start) else {
            return false;
        };
        if !options.recursive && inside.components().count() > 1 {
            return false;
        }
        relative.iter().all(|component| !is_denied(component))
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &[u8]); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn root(&self) -> &Path {
        &self.root
    }

    async fn check_dir(&self, dir: &Path) -> Result<()> {
        if self.missing_root {
            exn::bail!(ErrorKind::NotFound(self.root.join(dir)));
        }
        let dir = self.directory(dir)?;
        if dir.as_os_str().is_empty() {
            return Ok(());
        }
        let guard = self.storage.read().await;
        if guard.contains_key(&dir) {
            exn::bail!(ErrorKind::InvalidPath(self.root.join(dir)));
        }
        // Directories only exist through the files in them.
        if !guard.keys().any(|path| path.starts_with(&dir)) {
            exn::bail!(ErrorKind::NotFound(self.root.join(dir)));
        }
        Ok(())
    }

    fn walk<'a>(&'a self, options: WalkOptions) -> WalkStream<'a> {
        Box::pin(stream! {
            let start = options.start.clone().unwrap_or_else(|| self.root.clone());
            if let Err(err) = self.check_dir(&start).await {
                yield Err(err);
                return;
            }
            let start = match self.directory(&start) {
                Ok(start) => start,
                Err(err) => {
                    yield Err(err);
                    return;
                },
            };
            // Snapshot matching entries under the read lock, then drop it
            // before yielding to avoid holding the lock across yield points.
            let entries: Vec<FileInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| Self::visible(path, &start, &options))
                    .map(|(path, file)| FileInfo::new(self.root.join(path), file.data.len() as u64, file.modified))
                    .filter(|info| options.includes(info.extension.as_deref()))
                    .collect()
            };
            for file in entries {
                yield Ok(WalkEntry::File(file));
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = relative_to(&self.root, path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.contents(path).await
    }

    async fn read_head(&self, path: &Path, bytes: usize) -> Result<Vec<u8>> {
        let mut data = self.contents(path).await?;
        data.truncate(bytes);
        Ok(data)
    }

    async fn reader(&self, path: &Path) -> Result<BoxReader> {
        Ok(Box::new(Cursor::new(self.contents(path).await?)))
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let relative = relative_to(&self.root, path)?;
        let guard = self.storage.read().await;
        let file = guard.get(&relative).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(self.root.join(&relative))))?;
        Ok(FileInfo::new(self.root.join(&relative), file.data.len() as u64, file.modified))
    }
}
