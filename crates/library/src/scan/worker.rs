//! One file, end to end: detect, extract, queue the write.

use omni_cache::Datastore;
use omni_cache::models::{FileState, Fingerprint, WriteOp};
use omni_extract::Registry;
use omni_extract::models::MediaRecord;
use omni_storage::file::ContentHash;
use omni_storage::{BackendHandle, FileInfo};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::UtcDateTime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::detect::{Change, HashPolicy, detect};
use super::progress::Counters;
use super::{FileError, FileErrorKind};

/// Everything a worker needs; cloned once per worker.
#[derive(Clone)]
pub(crate) struct Worker {
    pub(crate) backend: BackendHandle,
    pub(crate) datastore: Arc<dyn Datastore>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) priors: Arc<HashMap<PathBuf, Fingerprint>>,
    pub(crate) user_id: Arc<str>,
    pub(crate) category_id: Arc<str>,
    pub(crate) policy: HashPolicy,
    pub(crate) timeout: Duration,
    pub(crate) counters: Arc<Counters>,
    pub(crate) errors: Arc<Mutex<Vec<FileError>>>,
    pub(crate) writes: mpsc::Sender<WriteOp>,
    pub(crate) stop: CancellationToken,
}

impl Worker {
    /// Take files off the shared queue until it closes or the scan stops.
    ///
    /// A file that has been taken is always seen through, so stopping only
    /// ever happens between files.
    pub(crate) async fn run(self, files: Arc<tokio::sync::Mutex<mpsc::Receiver<FileInfo>>>) {
        loop {
            if self.stop.is_cancelled() {
                break;
            }
            let next = {
                let mut files = files.lock().await;
                tokio::select! {
                    biased;
                    _ = self.stop.cancelled() => None,
                    file = files.recv() => file,
                }
            };
            let Some(file) = next else {
                break;
            };
            self.process(file).await;
        }
    }

    #[instrument(level = "debug", skip_all, fields(path = %file.path.display()))]
    async fn process(&self, file: FileInfo) {
        if file.path.to_str().is_none() {
            // The datastore keys fingerprints by UTF-8 path, so there is
            // nothing to write for this file.
            return self.record(file, FileErrorKind::Unreadable("file name is not valid UTF-8".to_string()));
        }
        let prior = self.prior(&file).await;
        let detection = match detect(&self.backend, &file, prior.as_ref(), self.policy).await {
            Ok(detection) => detection,
            Err(err) => return self.fail(file, None, FileErrorKind::from_storage(&err)).await,
        };

        if detection.change == Change::Unchanged {
            Counters::bump(&self.counters.skipped);
            // Nothing to write when the file wasn't even read; a hash match
            // refreshes the fingerprint (its modification time may have
            // moved) and keeps the stored record.
            if let Some(hash) = detection.hash {
                let fingerprint = self.fingerprint(&file, Some(hash), FileState::Ok);
                self.send(WriteOp::Upsert { fingerprint, record: None }).await;
            }
            return;
        }

        debug!(change = ?detection.change, "Extracting");
        match self.extract(&file).await {
            Ok(record) => {
                Counters::bump(&self.counters.processed);
                let fingerprint = self.fingerprint(&file, detection.hash, FileState::Ok);
                self.send(WriteOp::Upsert { fingerprint, record: Some(record) }).await;
            },
            Err(reason) => self.fail(file, detection.hash, reason).await,
        }
    }

    /// The stored fingerprint for `file`, from the preloaded set or, for a
    /// path stored under another category, from the datastore.
    async fn prior(&self, file: &FileInfo) -> Option<Fingerprint> {
        if let Some(prior) = self.priors.get(&file.path) {
            return Some(prior.clone());
        }
        match self.datastore.get_fingerprint(&self.user_id, &file.path).await {
            Ok(prior) => prior,
            Err(err) => {
                warn!(error = %err, "Fingerprint lookup failed; treating file as new");
                None
            },
        }
    }

    /// Run the extractor on the blocking pool, giving up after the timeout.
    ///
    /// A timed-out extractor can't be interrupted; its thread runs to
    /// completion in the background and the result is discarded.
    async fn extract(&self, file: &FileInfo) -> Result<MediaRecord, FileErrorKind> {
        let classification = omni_extract::classify(&file.path).map_err(|err| FileErrorKind::from_extract(&err))?;
        let mut reader = self.backend.reader(&file.path).await.map_err(|err| FileErrorKind::from_storage(&err))?;
        let registry = Arc::clone(&self.registry);
        let size = file.size;
        let task = tokio::task::spawn_blocking(move || registry.extract(classification, &mut reader, size));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(record))) => Ok(record),
            Ok(Ok(Err(err))) => Err(FileErrorKind::from_extract(&err)),
            Ok(Err(join)) => Err(FileErrorKind::CorruptFile(format!("extractor crashed: {join}"))),
            Err(_) => Err(FileErrorKind::ExtractionTimeout),
        }
    }

    async fn fail(&self, file: FileInfo, hash: Option<ContentHash>, reason: FileErrorKind) {
        let fingerprint = self.fingerprint(&file, hash, FileState::Errored);
        self.record(file, reason);
        self.send(WriteOp::Upsert { fingerprint, record: None }).await;
    }

    /// Count `file` as errored and add it to the scan's error list.
    fn record(&self, file: FileInfo, reason: FileErrorKind) {
        warn!(%reason, "Skipping file");
        Counters::bump(&self.counters.errored);
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(FileError { path: file.into_meta().path, reason });
        }
    }

    fn fingerprint(&self, file: &FileInfo, hash: Option<ContentHash>, state: FileState) -> Fingerprint {
        Fingerprint {
            id: None,
            user_id: self.user_id.to_string(),
            category_id: self.category_id.to_string(),
            path: file.path.clone(),
            hash,
            size: file.size,
            modified: file.modified,
            scanned_at: UtcDateTime::now(),
            state,
        }
    }

    async fn send(&self, op: WriteOp) {
        // A closed channel means the writer gave up; the scan is stopping.
        if self.writes.send(op).await.is_err() {
            debug!("Writer is gone; dropping result");
        }
    }
}
