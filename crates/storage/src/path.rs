//! Resolving caller-supplied paths against a library root.
//!
//! Backends accept either an absolute path (as yielded by a walk) or one
//! relative to the library root. Both forms go through [`validate`], which
//! resolves `.` and `..` lexically and refuses anything that would land
//! outside the root.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Lexically resolve `path` into a non-empty path relative to the library
/// root.
///
/// Leading `/` and `.` segments are ignored and `..` pops the previous
/// segment. Fails with [`InvalidPath`](ErrorKind::InvalidPath) when a `..`
/// would climb above the root, when a segment contains a NUL byte, on a
/// Windows drive prefix, or when nothing is left after resolution.
///
/// Symlinks are not resolved; that is the walker's job.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use omni_storage::validate_path;
///
/// assert!(validate_path("Shows/Show.S01E01.mkv").is_ok());
/// assert!(validate_path("Music/../Films/clip.mp4").is_ok());
///
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("Music/../../b").is_err());
/// assert!(validate_path("a\0b").is_err());
///
/// assert_eq!(
///     validate_path("Films//./tmp/../Heat (1995)/heat.mkv/").unwrap(),
///     Path::new("Films/Heat (1995)/heat.mkv"),
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || exn::Exn::from(ErrorKind::InvalidPath(original.to_path_buf()));

    let mut segments: Vec<&OsStr> = Vec::new();
    for component in original.components() {
        match component {
            Component::RootDir | Component::CurDir => continue,
            Component::Prefix(_) => return Err(invalid()),
            Component::ParentDir => {
                segments.pop().ok_or_else(invalid)?;
            },
            // NUL survives `components()` but truncates the path at the
            // syscall boundary.
            Component::Normal(segment) if segment.as_encoded_bytes().contains(&0) => return Err(invalid()),
            Component::Normal(segment) => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return Err(invalid());
    }
    Ok(segments.iter().collect())
}

/// Resolve `path` to a validated path relative to `root`.
///
/// Absolute paths must lie lexically within `root`; relative paths are taken
/// as already relative to it.
pub(crate) fn relative_to(root: &Path, path: &Path) -> Result<PathBuf> {
    let relative = match path.strip_prefix(root) {
        Ok(inside) => inside,
        Err(_) if path.is_absolute() => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
        Err(_) => path,
    };
    validate(relative)
}
