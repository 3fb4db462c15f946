use futures::StreamExt;
use omni_cache::Datastore;
use omni_cache::models::{Fingerprint, WriteOp};
use omni_config::ScannerConfig;
use omni_extract::Registry;
use omni_storage::{BackendHandle, FileInfo, WalkEntry, WalkOptions};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::detect::{HashPolicy, deleted};
use super::progress::{self, Counters, ProgressSender};
use super::worker::Worker;
use super::writer::Writer;
use super::{ScanRequest, ScanResult, ScanState, ScanStatus};
use crate::error::{Error, ErrorKind, Result};

/// Runs scans of one library against one datastore.
///
/// A `Scanner` holds no per-scan state and can run any number of scans, one
/// after the other or (for different users) at the same time.
///
/// # Examples
///
/// ```no_run
/// use omni_cache::{Database, Repository};
/// use omni_config::ScannerConfig;
/// use omni_extract::Registry;
/// use omni_library::{ScanRequest, Scanner};
/// use omni_storage::backend::LocalBackend;
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = Arc::new(LocalBackend::new("media", "/srv/media")?);
/// let database = Database::connect("/var/lib/omni/omni.db").await?;
/// let scanner = Scanner::new(backend, Arc::new(Repository::from(&database)), Registry::default(), ScannerConfig::default());
///
/// let result = scanner.scan(ScanRequest::new("/srv/media", "user-1", "movies")).await?;
/// println!("{} processed, {} unchanged, {} errors", result.processed, result.skipped, result.errored);
/// # Ok(())
/// # }
/// ```
pub struct Scanner {
    backend: BackendHandle,
    datastore: Arc<dyn Datastore>,
    registry: Arc<Registry>,
    settings: ScannerConfig,
}

/// First fatal error of a scan. Raising it stops the scan.
struct Fatal {
    stop: CancellationToken,
    error: Mutex<Option<Error>>,
}

impl Fatal {
    fn raise(&self, err: Error) {
        warn!(error = %err, "Stopping scan");
        if let Ok(mut slot) = self.error.lock()
            && slot.is_none()
        {
            *slot = Some(err);
        }
        self.stop.cancel();
    }

    fn take(&self) -> Option<Error> {
        self.error.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Per-scan plumbing shared by the stages.
struct Run<'a> {
    request: &'a ScanRequest,
    counters: Arc<Counters>,
    progress: ProgressSender,
    started: Instant,
}

impl Run<'_> {
    fn enter(&self, state: ScanState) {
        info!(%state, "Scan state changed");
        self.counters.set_state(state);
        self.progress.send(self.counters.snapshot());
    }

    fn finish(&self, status: ScanStatus, failure: Option<Error>, errors: Vec<super::FileError>) -> ScanResult {
        self.enter(match status {
            ScanStatus::Completed | ScanStatus::Partial => ScanState::Completed,
            ScanStatus::Failed => ScanState::Failed,
            ScanStatus::Cancelled => ScanState::Cancelled,
        });
        let result = ScanResult {
            total: Counters::get(&self.counters.total),
            processed: Counters::get(&self.counters.processed),
            skipped: Counters::get(&self.counters.skipped),
            errored: Counters::get(&self.counters.errored),
            deleted: Counters::get(&self.counters.deleted),
            errors,
            duration: self.started.elapsed(),
            status,
            failure,
        };
        info!(
            root = %self.request.root.display(),
            %status,
            total = result.total,
            processed = result.processed,
            skipped = result.skipped,
            errored = result.errored,
            deleted = result.deleted,
            duration_ms = result.duration.as_millis(),
            "Scan finished"
        );
        result
    }
}

impl Scanner {
    pub fn new(backend: BackendHandle, datastore: Arc<dyn Datastore>, registry: Registry, settings: ScannerConfig) -> Self {
        Self { backend, datastore, registry: Arc::new(registry), settings }
    }

    /// Scan a library until it's done. See [`scan_with_cancel`](Self::scan_with_cancel).
    pub async fn scan(&self, request: ScanRequest) -> Result<ScanResult> {
        self.scan_with_cancel(request, CancellationToken::new()).await
    }

    /// Scan a library, stopping early once `cancel` is cancelled.
    ///
    /// The request's root may be the backend's root or any directory below
    /// it; a root outside the backend is an invalid request.
    ///
    /// Only a bad request is returned as an error; anything that goes wrong
    /// once the scan has started ends up in the [`ScanResult`], with status
    /// [`Failed`](ScanStatus::Failed) and the cause in
    /// [`failure`](ScanResult::failure) when it stopped the scan.
    ///
    /// On cancellation, files already taken by a worker are finished and
    /// written, and no fingerprint is removed for files the walk never got
    /// to.
    #[instrument(skip_all, fields(root = %request.root.display(), user = %request.user_id, category = %request.category_id))]
    pub async fn scan_with_cancel(&self, request: ScanRequest, cancel: CancellationToken) -> Result<ScanResult> {
        request.validate()?;
        if !request.root.starts_with(self.backend.root()) {
            exn::bail!(ErrorKind::InvalidRequest(format!(
                "root {} is outside backend {} ({})",
                request.root.display(),
                self.backend.name(),
                self.backend.root().display()
            )));
        }

        let counters = Arc::new(Counters::default());
        let (progress, forwarder) = progress::forward(request.on_progress.clone(), self.settings.progress_interval());
        let run = Run { request: &request, counters: Arc::clone(&counters), progress, started: Instant::now() };
        let result = self.execute(&run, cancel).await;
        drop(run);
        if let Some(forwarder) = forwarder
            && let Err(err) = forwarder.await
        {
            warn!(error = %err, "Progress callback panicked");
        }
        Ok(result)
    }

    async fn execute(&self, run: &Run<'_>, cancel: CancellationToken) -> ScanResult {
        let request = run.request;
        run.enter(ScanState::Walking);

        if let Err(err) = self.backend.check_dir(&request.root).await {
            let kind = root_failure(&err, &request.root);
            return run.finish(ScanStatus::Failed, Some(err.raise(kind)), Vec::new());
        }
        let priors = match self.datastore.list_fingerprints(&request.user_id, &request.category_id).await {
            Ok(priors) => priors,
            Err(err) => return run.finish(ScanStatus::Failed, Some(err.raise(ErrorKind::DatastoreUnavailable)), Vec::new()),
        };
        debug!(count = priors.len(), "Loaded fingerprints");
        let priors: Arc<HashMap<PathBuf, Fingerprint>> =
            Arc::new(priors.into_iter().map(|prior| (prior.path.clone(), prior)).collect());

        let fatal = Fatal { stop: cancel.child_token(), error: Mutex::new(None) };
        let concurrency = request.concurrency(self.settings.concurrency);
        let errors = Arc::new(Mutex::new(Vec::new()));

        let (writes, write_rx) = mpsc::channel(self.settings.batch_size.max(1).saturating_mul(2));
        let writer = Writer {
            datastore: Arc::clone(&self.datastore),
            batch_size: self.settings.batch_size,
            flush_interval: self.settings.flush_interval(),
            retries: self.settings.write_retries,
            backoff: self.settings.retry_backoff(),
            counters: Arc::clone(&run.counters),
            progress: run.progress.clone(),
        };
        let stop = fatal.stop.clone();
        let writer = tokio::spawn(async move {
            let written = writer.run(write_rx).await;
            if written.is_err() {
                stop.cancel();
            }
            written
        });

        let (files, file_rx) = mpsc::channel::<FileInfo>(concurrency * 2);
        let file_rx = Arc::new(tokio::sync::Mutex::new(file_rx));
        let worker = Worker {
            backend: Arc::clone(&self.backend),
            datastore: Arc::clone(&self.datastore),
            registry: Arc::clone(&self.registry),
            priors: Arc::clone(&priors),
            user_id: Arc::from(request.user_id.as_str()),
            category_id: Arc::from(request.category_id.as_str()),
            policy: HashPolicy::new(&self.settings, request.verify_hashes),
            timeout: self.settings.extraction_timeout(),
            counters: Arc::clone(&run.counters),
            errors: Arc::clone(&errors),
            writes: writes.clone(),
            stop: fatal.stop.clone(),
        };
        let mut workers = JoinSet::new();
        for _ in 0..concurrency {
            workers.spawn(worker.clone().run(Arc::clone(&file_rx)));
        }
        // Only workers may hold the receiver: once the last one exits, the
        // feeder's sends fail instead of waiting forever.
        drop(file_rx);
        drop(worker);
        debug!(concurrency, "Started workers");

        let extensions = request.extensions();
        let (seen, walked) = self.feed(run, &extensions, files, &fatal).await;

        run.enter(ScanState::Extracting);
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "Worker task failed");
                fatal.raise(exn::Exn::from(ErrorKind::Task));
            }
        }

        run.enter(ScanState::Flushing);
        if walked && !fatal.stop.is_cancelled() {
            let gone = deleted(priors.values(), &seen, |path| request.covers(path, &extensions));
            debug!(count = gone.len(), "Removing fingerprints of deleted files");
            for path in gone {
                let op = WriteOp::Delete { user_id: request.user_id.clone(), path };
                if writes.send(op).await.is_err() {
                    break;
                }
            }
        }
        drop(writes);
        match writer.await {
            Ok(Ok(())) => {},
            Ok(Err(err)) => fatal.raise(err),
            Err(_) => fatal.raise(exn::Exn::from(ErrorKind::Task)),
        }

        let errors = errors.lock().map(|mut errors| std::mem::take(&mut *errors)).unwrap_or_default();
        let failure = fatal.take();
        let status = match (&failure, cancel.is_cancelled(), errors.is_empty()) {
            (Some(_), _, _) => ScanStatus::Failed,
            (None, true, _) => ScanStatus::Cancelled,
            (None, false, false) => ScanStatus::Partial,
            (None, false, true) => ScanStatus::Completed,
        };
        run.finish(status, failure, errors)
    }

    /// Walk the library and queue every file in scope for the workers.
    ///
    /// Returns the paths claimed, and whether the walk reached its end.
    async fn feed(
        &self,
        run: &Run<'_>,
        extensions: &HashSet<String>,
        files: mpsc::Sender<FileInfo>,
        fatal: &Fatal,
    ) -> (HashSet<PathBuf>, bool) {
        let options = WalkOptions::default()
            .from(run.request.root.clone())
            .recursive(run.request.recursive)
            .extensions(extensions.iter().cloned());
        let mut walk = self.backend.walk(options);
        let mut seen = HashSet::new();
        loop {
            let entry = tokio::select! {
                biased;
                _ = fatal.stop.cancelled() => return (seen, false),
                entry = walk.next() => entry,
            };
            let file = match entry {
                None => return (seen, true),
                Some(Err(err)) => {
                    fatal.raise(err.raise(ErrorKind::Walk));
                    return (seen, false);
                },
                Some(Ok(WalkEntry::Warning(warning))) => {
                    warn!(path = %warning.path.display(), kind = ?warning.kind, "Skipped during walk");
                    continue;
                },
                Some(Ok(WalkEntry::File(file))) => file,
            };
            if !run.request.covers(&file.path, extensions) || !seen.insert(file.path.clone()) {
                continue;
            }
            // Count a file only once a slot for it is held, so a stop while
            // waiting can't leave it counted but never processed.
            let permit = tokio::select! {
                biased;
                _ = fatal.stop.cancelled() => return (seen, false),
                permit = files.reserve() => permit,
            };
            let Ok(permit) = permit else {
                return (seen, false);
            };
            Counters::bump(&run.counters.total);
            permit.send(file);
        }
    }
}

fn root_failure(err: &omni_storage::error::Error, root: &std::path::Path) -> ErrorKind {
    use omni_storage::error::ErrorKind as Storage;
    let root = root.to_path_buf();
    match &**err {
        Storage::NotFound(_) => ErrorKind::RootNotFound(root),
        Storage::PermissionDenied(_) => ErrorKind::RootPermissionDenied(root),
        _ => ErrorKind::RootInvalid(root),
    }
}
