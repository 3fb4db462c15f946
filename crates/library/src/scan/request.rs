use omni_config::MAX_CONCURRENCY;
use omni_extract::models::MediaType;
use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::ScanProgress;
use crate::error::{ErrorKind, Result};

/// Receives throttled progress snapshots while a scan runs.
pub type ProgressCallback = Arc<dyn Fn(ScanProgress) + Send + Sync>;

/// What to scan, and for whom. Immutable once the scan starts.
///
/// ```
/// use omni_extract::models::MediaType;
/// use omni_library::ScanRequest;
///
/// let request = ScanRequest::new("/media/tv", "user-1", "tv")
///     .parallel(8)
///     .media_types([MediaType::Video])
///     .on_progress(|progress| println!("{} files seen", progress.total));
/// assert_eq!(request.concurrency(4), 8);
/// ```
#[derive(Clone)]
pub struct ScanRequest {
    pub root: PathBuf,
    pub user_id: String,
    pub category_id: String,
    pub recursive: bool,
    parallel: Option<usize>,
    pub(crate) on_progress: Option<ProgressCallback>,
    pub media_types: Option<HashSet<MediaType>>,
    pub verify_hashes: Option<bool>,
}

impl ScanRequest {
    pub fn new(root: impl Into<PathBuf>, user_id: impl Into<String>, category_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            user_id: user_id.into(),
            category_id: category_id.into(),
            recursive: true,
            parallel: None,
            on_progress: None,
            media_types: None,
            verify_hashes: None,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Number of workers. Clamped to `1..=16` when the scan starts.
    pub fn parallel(mut self, workers: usize) -> Self {
        self.parallel = Some(workers);
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(ScanProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Only scan files of these media types. Fingerprints of other types are
    /// left alone, never treated as deleted.
    pub fn media_types(mut self, types: impl IntoIterator<Item = MediaType>) -> Self {
        self.media_types = Some(types.into_iter().collect());
        self
    }

    /// Override the configured hash verification for this scan.
    pub fn verify_hashes(mut self, verify: bool) -> Self {
        self.verify_hashes = Some(verify);
        self
    }

    /// Worker count for this scan, falling back to `default`.
    pub fn concurrency(&self, default: usize) -> usize {
        self.parallel.unwrap_or(default).clamp(1, MAX_CONCURRENCY)
    }

    /// Lowercase extensions the walk should yield.
    pub(crate) fn extensions(&self) -> HashSet<String> {
        let wanted = |media_type: &MediaType| self.media_types.as_ref().is_none_or(|types| types.contains(media_type));
        MediaType::ALL
            .iter()
            .filter(|media_type| wanted(media_type))
            .flat_map(|media_type| media_type.extensions())
            .map(|ext| ext.to_string())
            .collect()
    }

    /// Whether `path` is in the scope of this scan: under the root (directly
    /// under it when not recursive) with a wanted extension.
    pub(crate) fn covers(&self, path: &Path, extensions: &HashSet<String>) -> bool {
        let under_root = match self.recursive {
            true => path.starts_with(&self.root) && path != self.root,
            false => path.parent() == Some(self.root.as_path()),
        };
        under_root && omni_storage::file::extension_of(path).is_some_and(|ext| extensions.contains(&ext))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| exn::Exn::from(ErrorKind::InvalidRequest(reason.to_string()));
        if self.root.as_os_str().is_empty() {
            return Err(invalid("root path is empty"));
        }
        if !self.root.is_absolute() {
            return Err(invalid("root path must be absolute"));
        }
        if self.root.components().any(|component| component == Component::ParentDir) {
            return Err(invalid("root path must not contain `..`"));
        }
        if self.user_id.trim().is_empty() {
            return Err(invalid("user id is empty"));
        }
        if self.category_id.trim().is_empty() {
            return Err(invalid("category id is empty"));
        }
        if self.media_types.as_ref().is_some_and(HashSet::is_empty) {
            return Err(invalid("media type filter is empty"));
        }
        Ok(())
    }
}

impl fmt::Debug for ScanRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanRequest")
            .field("root", &self.root)
            .field("user_id", &self.user_id)
            .field("category_id", &self.category_id)
            .field("recursive", &self.recursive)
            .field("parallel", &self.parallel)
            .field("on_progress", &self.on_progress.is_some())
            .field("media_types", &self.media_types)
            .field("verify_hashes", &self.verify_hashes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, 4)]
    #[case(Some(0), 1)]
    #[case(Some(7), 7)]
    #[case(Some(64), 16)]
    fn test_concurrency_is_clamped(#[case] parallel: Option<usize>, #[case] expected: usize) {
        let mut request = ScanRequest::new("/lib", "u", "c");
        request.parallel = parallel;
        assert_eq!(request.concurrency(4), expected);
    }

    #[rstest]
    #[case::empty_root(ScanRequest::new("", "u", "c"))]
    #[case::relative_root(ScanRequest::new("lib", "u", "c"))]
    #[case::no_user(ScanRequest::new("/lib", " ", "c"))]
    #[case::no_category(ScanRequest::new("/lib", "u", ""))]
    #[case::no_media_types(ScanRequest::new("/lib", "u", "c").media_types([]))]
    fn test_invalid_requests(#[case] request: ScanRequest) {
        let err = request.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidRequest(_)));
    }

    #[test]
    fn test_scope() {
        let request = ScanRequest::new("/lib", "u", "c").media_types([MediaType::Audio]);
        let extensions = request.extensions();
        assert!(extensions.contains("flac"));
        assert!(!extensions.contains("mkv"));
        assert!(request.covers(Path::new("/lib/a/b/song.flac"), &extensions));
        assert!(!request.covers(Path::new("/lib/a/b/clip.mkv"), &extensions));
        assert!(!request.covers(Path::new("/other/song.flac"), &extensions));

        let shallow = request.clone().recursive(false);
        assert!(shallow.covers(Path::new("/lib/song.flac"), &extensions));
        assert!(!shallow.covers(Path::new("/lib/a/song.flac"), &extensions));
    }
}
