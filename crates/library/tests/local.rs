//! Scans of a real directory into a real SQLite database.

mod common;

use common::{mp4, settings};
use omni_cache::{Database, Datastore, Repository};
use omni_extract::Registry;
use omni_extract::models::MediaKind;
use omni_library::{ScanRequest, ScanStatus, Scanner};
use omni_storage::backend::LocalBackend;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

struct Library {
    dir: TempDir,
    repo: Arc<Repository>,
    scanner: Scanner,
}

async fn library() -> Library {
    let dir = TempDir::new().unwrap();
    let database = Database::connect(dir.path().join("omni.db")).await.unwrap();
    let repo = Arc::new(Repository::from(&database));
    let root = dir.path().join("media");
    fs::create_dir_all(root.join("Show")).unwrap();
    let backend = Arc::new(LocalBackend::new("media", &root).unwrap());
    let scanner = Scanner::new(backend, repo.clone(), Registry::default(), settings());
    Library { dir, repo, scanner }
}

impl Library {
    fn root(&self) -> std::path::PathBuf {
        self.dir.path().join("media")
    }

    fn write(&self, relative: &str, data: &[u8]) {
        fs::write(self.root().join(relative), data).unwrap();
    }

    fn request(&self) -> ScanRequest {
        ScanRequest::new(self.root(), "user-1", "tv")
    }
}

#[tokio::test]
async fn test_scan_rescan_and_delete() {
    let library = library().await;
    library.write("Show/ShowName.S01E02.mp4", &mp4(1320));
    library.write("Show/ShowName.S01E03.mp4", &mp4(1400));
    library.write(".hidden.mp4", &mp4(1));
    library.write("Show/ShowName.S01E04.mp4.part", &mp4(1));
    library.write("notes.txt", b"not media");

    let first = library.scanner.scan(library.request()).await.unwrap();
    assert_eq!(first.status, ScanStatus::Completed);
    assert_eq!((first.total, first.processed), (2, 2));

    let path = library.root().join("Show/ShowName.S01E02.mp4");
    let fingerprint = library.repo.get_fingerprint("user-1", &path).await.unwrap().unwrap();
    let record = library.repo.get_media_record(fingerprint.id.unwrap()).await.unwrap().unwrap();
    assert_eq!(record.kind, MediaKind::TvEpisode);
    assert_eq!((record.season, record.episode), (Some(1), Some(2)));
    assert_eq!(record.technical.duration_ms, Some(1_320_000));

    let second = library.scanner.scan(library.request()).await.unwrap();
    assert_eq!((second.processed, second.skipped), (0, 2));

    fs::remove_file(library.root().join("Show/ShowName.S01E03.mp4")).unwrap();
    let third = library.scanner.scan(library.request()).await.unwrap();
    assert_eq!(third.deleted, 1);
    let remaining = library.repo.list_fingerprints("user-1", "tv").await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].path, path);
}

#[tokio::test]
async fn test_missing_directory_fails() {
    let library = library().await;
    fs::remove_dir_all(library.root()).unwrap();
    let result = library.scanner.scan(library.request()).await.unwrap();
    assert_eq!(result.status, ScanStatus::Failed);
    assert!(result.failure.is_some());
}

#[tokio::test]
async fn test_corrupt_files_are_recorded_as_errored() {
    let library = library().await;
    library.write("empty.mp4", b"");
    library.write("Show/good.mp4", &mp4(5));
    let result = library.scanner.scan(library.request()).await.unwrap();
    assert_eq!(result.status, ScanStatus::Partial);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].path, library.root().join("empty.mp4"));
    let errored = library.repo.get_fingerprint("user-1", Path::new(&library.root().join("empty.mp4"))).await.unwrap().unwrap();
    assert_eq!(errored.state, omni_cache::models::FileState::Errored);
}

#[cfg(unix)]
#[tokio::test]
async fn test_non_utf8_name_fails_only_that_file() {
    use omni_library::FileErrorKind;
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let library = library().await;
    library.write("Show/ShowName.S01E01.mp4", &mp4(60));
    library.write("Show/ShowName.S01E02.mp4", &mp4(60));
    let odd = library.root().join("Show").join(OsStr::from_bytes(b"Caf\xe9.S01E03.mp4"));
    fs::write(&odd, mp4(60)).unwrap();

    let result = library.scanner.scan(library.request()).await.unwrap();
    assert_eq!(result.status, ScanStatus::Partial);
    assert!(result.failure.is_none());
    assert_eq!((result.total, result.processed, result.errored), (3, 2, 1));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].path, odd);
    assert!(matches!(result.errors[0].reason, FileErrorKind::Unreadable(_)));
    assert_eq!(library.repo.list_fingerprints("user-1", "tv").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_subdirectory_of_library_is_scanned_alone() {
    let library = library().await;
    fs::create_dir_all(library.root().join("Other")).unwrap();
    library.write("Show/ShowName.S01E01.mp4", &mp4(60));
    library.write("Other/ShowName.S02E01.mp4", &mp4(60));

    let request = ScanRequest::new(library.root().join("Show"), "user-1", "tv");
    let result = library.scanner.scan(request).await.unwrap();
    assert_eq!(result.status, ScanStatus::Completed);
    assert_eq!((result.total, result.processed), (1, 1));

    let missing = ScanRequest::new(library.root().join("Missing"), "user-1", "tv");
    let result = library.scanner.scan(missing).await.unwrap();
    assert_eq!(result.status, ScanStatus::Failed);
    assert_eq!(result.processed, 0);
}
