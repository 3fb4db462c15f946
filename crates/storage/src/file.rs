//! File metadata as discovered by a walk, and as fingerprinted by a scan.

use std::fmt;
use std::{ops::Deref, path::Path, path::PathBuf};
use time::UtcDateTime;

// Typestate: a file starts out `Discovered` (walker output, no content read)
// and becomes `Hashed` once the change detector has read its bytes. Mixed
// collections deref to `FileMeta`.

/// File metadata returned by storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// Absolute path of the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: UtcDateTime,
    /// Lowercase file extension, without the leading dot
    pub extension: Option<String>,
}
impl FileMeta {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: UtcDateTime) -> Self {
        let path = path.into();
        let extension = extension_of(&path);
        Self { path, size, modified, extension }
    }

    pub fn with_hash(self, hash: ContentHash) -> FileInfo<Hashed> {
        FileInfo { meta: self, hash }
    }
}

/// Lowercase extension of `path`, if it has one.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase)
}

/// How a [`ContentHash`] was computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKind {
    /// BLAKE3 over every byte of the file.
    Full,
    /// BLAKE3 over the file size and fixed windows at the head, middle and
    /// tail of the file.
    Sampled,
}
impl HashKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Sampled => "sampled",
        }
    }
}
impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
impl std::str::FromStr for HashKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "sampled" => Ok(Self::Sampled),
            other => Err(format!("unknown hash kind: {other}")),
        }
    }
}

/// Hex-encoded content hash together with the method that produced it.
///
/// Two hashes are only comparable when their kinds match; a full hash never
/// equals a sampled one, even over identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash {
    pub kind: HashKind,
    pub value: String,
}
impl ContentHash {
    pub fn new(kind: HashKind, value: impl Into<String>) -> Self {
        Self { kind, value: value.into() }
    }
}
impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

mod sealed {
    pub trait Sealed {}
}
pub trait HashState: sealed::Sealed {
    type Hash;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discovered;
impl sealed::Sealed for Discovered {}
impl HashState for Discovered {
    type Hash = ();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hashed;
impl sealed::Sealed for Hashed {}
impl HashState for Hashed {
    type Hash = ContentHash;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo<S: HashState = Discovered> {
    meta: FileMeta,
    pub hash: S::Hash,
}
impl<S: HashState> FileInfo<S> {
    // Explicit version of self.as_deref()
    pub fn meta(&self) -> &FileMeta {
        &self.meta
    }

    pub fn into_meta(self) -> FileMeta {
        self.meta
    }
}
impl<S: HashState> Deref for FileInfo<S> {
    type Target = FileMeta;
    fn deref(&self) -> &FileMeta {
        &self.meta
    }
}

impl FileInfo {
    /// Create a new FileInfo from a walk (no hash yet).
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: UtcDateTime) -> Self {
        FileMeta::new(path, size, modified).into()
    }

    pub fn with_hash(self, hash: ContentHash) -> FileInfo<Hashed> {
        FileInfo { meta: self.meta, hash }
    }
}
impl From<FileMeta> for FileInfo<Discovered> {
    fn from(meta: FileMeta) -> Self {
        Self { meta, hash: () }
    }
}
