//! The single task that persists scan results.

use omni_cache::Datastore;
use omni_cache::models::WriteOp;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, instrument, warn};

use super::progress::{Counters, ProgressSender};
use crate::error::{ErrorKind, Result};

pub(crate) struct Writer {
    pub(crate) datastore: Arc<dyn Datastore>,
    pub(crate) batch_size: usize,
    pub(crate) flush_interval: Duration,
    pub(crate) retries: u32,
    pub(crate) backoff: Duration,
    pub(crate) counters: Arc<Counters>,
    pub(crate) progress: ProgressSender,
}

impl Writer {
    /// Collect operations from `rx` and write them in batches of
    /// `batch_size`, or whatever has arrived once `flush_interval` passes.
    ///
    /// Returns once every sender is gone and the last batch is written. On
    /// [`DatastoreUnavailable`](ErrorKind::DatastoreUnavailable) the pending
    /// batch is lost and `rx` is dropped, so senders see the channel close.
    #[instrument(level = "debug", skip_all)]
    pub(crate) async fn run(self, mut rx: mpsc::Receiver<WriteOp>) -> Result<()> {
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                op = rx.recv() => match op {
                    Some(op) => {
                        batch.push(op);
                        if batch.len() >= self.batch_size {
                            self.flush(&mut batch).await?;
                            ticker.reset();
                        }
                    },
                    None => break,
                },
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.flush(&mut batch).await?;
                    }
                },
            }
        }
        if !batch.is_empty() {
            self.flush(&mut batch).await?;
        }
        Ok(())
    }

    async fn flush(&self, batch: &mut Vec<WriteOp>) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.datastore.batch_write(batch).await {
                Ok(()) => break,
                Err(err) if err.is_retryable() && attempt < self.retries => {
                    let delay = self.backoff.saturating_mul(2u32.saturating_pow(attempt));
                    warn!(attempt = attempt + 1, ?delay, error = %err, "Batch write failed; retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(err) => {
                    error!(ops = batch.len(), attempts = attempt + 1, error = %err, "Giving up on batch write");
                    return Err(err.raise(ErrorKind::DatastoreUnavailable));
                },
            }
        }
        debug!(ops = batch.len(), "Flushed batch");
        for op in batch.iter() {
            if let WriteOp::Delete { .. } = op {
                Counters::bump(&self.counters.deleted);
            }
        }
        if let Some(last) = batch.last() {
            self.counters.set_current(last.path().to_path_buf());
        }
        batch.clear();
        self.progress.send(self.counters.snapshot());
        Ok(())
    }
}
