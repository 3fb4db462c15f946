use derive_more::Display;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::ProgressCallback;

/// Where the coordinator is in its lifecycle.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    #[display("idle")]
    Idle,
    /// Checking the root and discovering files.
    #[display("walking")]
    Walking,
    /// The walk is done; workers are finishing the remaining files.
    #[display("extracting")]
    Extracting,
    /// Writing the last batch and removing deleted files.
    #[display("flushing")]
    Flushing,
    #[display("completed")]
    Completed,
    #[display("failed")]
    Failed,
    #[display("cancelled")]
    Cancelled,
}

/// Point-in-time view of a running scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanProgress {
    pub total: u64,
    pub processed: u64,
    pub skipped: u64,
    pub errored: u64,
    pub deleted: u64,
    /// Last file handed to the writer.
    pub current: Option<PathBuf>,
    pub state: ScanState,
}

/// Live counters shared by every task of one scan.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) total: AtomicU64,
    pub(crate) processed: AtomicU64,
    pub(crate) skipped: AtomicU64,
    pub(crate) errored: AtomicU64,
    pub(crate) deleted: AtomicU64,
    current: Mutex<Option<PathBuf>>,
    state: Mutex<ScanState>,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub(crate) fn set_current(&self, path: PathBuf) {
        if let Ok(mut current) = self.current.lock() {
            *current = Some(path);
        }
    }

    pub(crate) fn set_state(&self, state: ScanState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    pub(crate) fn state(&self) -> ScanState {
        self.state.lock().map(|state| *state).unwrap_or_default()
    }

    pub(crate) fn snapshot(&self) -> ScanProgress {
        ScanProgress {
            total: Self::get(&self.total),
            processed: Self::get(&self.processed),
            skipped: Self::get(&self.skipped),
            errored: Self::get(&self.errored),
            deleted: Self::get(&self.deleted),
            current: self.current.lock().ok().and_then(|current| current.clone()),
            state: self.state(),
        }
    }
}

/// Sending half of the progress channel. Cheap to clone; sending never
/// blocks, and silently does nothing once nobody is listening.
#[derive(Debug, Clone)]
pub(crate) struct ProgressSender(Option<mpsc::UnboundedSender<ScanProgress>>);

impl ProgressSender {
    pub(crate) fn send(&self, progress: ScanProgress) {
        if let Some(tx) = &self.0 {
            let _ = tx.send(progress);
        }
    }
}

/// Start the task that hands snapshots to `callback`, at most once per
/// `interval`.
///
/// Snapshots arriving faster than that are coalesced into the newest one,
/// which is delivered once the interval has passed or the channel closes,
/// so the final snapshot of a scan always reaches the callback. Without a
/// callback there is nothing to forward and no task is started.
pub(crate) fn forward(callback: Option<ProgressCallback>, interval: Duration) -> (ProgressSender, Option<JoinHandle<()>>) {
    let Some(callback) = callback else {
        return (ProgressSender(None), None);
    };
    let (tx, mut rx) = mpsc::unbounded_channel::<ScanProgress>();
    let handle = tokio::spawn(async move {
        let mut last_sent: Option<Instant> = None;
        let mut pending: Option<ScanProgress> = None;
        loop {
            let deadline = last_sent.map(|at| at + interval);
            let received = match (&pending, deadline) {
                (Some(_), Some(deadline)) => tokio::select! {
                    received = rx.recv() => received.map(Some),
                    _ = tokio::time::sleep_until(deadline) => Some(None),
                },
                _ => rx.recv().await.map(Some),
            };
            match received {
                Some(Some(progress)) => pending = Some(progress),
                Some(None) => {},
                None => break,
            }
            if last_sent.is_none_or(|at| at.elapsed() >= interval)
                && let Some(progress) = pending.take()
            {
                callback(progress);
                last_sent = Some(Instant::now());
            }
        }
        if let Some(progress) = pending {
            callback(progress);
        }
    });
    (ProgressSender(Some(tx)), Some(handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<ScanProgress>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |progress| sink.lock().unwrap().push(progress));
        (callback, seen)
    }

    fn at(total: u64) -> ScanProgress {
        ScanProgress { total, ..Default::default() }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bursts_are_coalesced_and_last_is_delivered() {
        let (callback, seen) = recorder();
        let (tx, handle) = forward(Some(callback), Duration::from_millis(250));
        for total in 1..=10 {
            tx.send(at(total));
        }
        drop(tx);
        handle.unwrap().await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.first().map(|p| p.total), Some(1));
        assert_eq!(seen.last().map(|p| p.total), Some(10));
        assert!(seen.len() <= 2, "{} callbacks", seen.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_snapshot_is_flushed_after_interval() {
        let (callback, seen) = recorder();
        let (tx, handle) = forward(Some(callback), Duration::from_millis(100));
        tx.send(at(1));
        tx.send(at(2));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(seen.lock().unwrap().iter().map(|p| p.total).collect::<Vec<_>>(), vec![1, 2]);
        drop(tx);
        handle.unwrap().await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_no_callback_means_no_task() {
        let (tx, handle) = forward(None, Duration::from_millis(100));
        assert!(handle.is_none());
        tx.send(at(1));
    }

    #[test]
    fn test_snapshot_reads_counters() {
        let counters = Counters::default();
        Counters::bump(&counters.total);
        Counters::bump(&counters.total);
        Counters::bump(&counters.skipped);
        counters.set_current(PathBuf::from("/lib/a.mkv"));
        counters.set_state(ScanState::Walking);
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.skipped, 1);
        assert_eq!(snapshot.current.as_deref(), Some(std::path::Path::new("/lib/a.mkv")));
        assert_eq!(snapshot.state, ScanState::Walking);
    }
}
