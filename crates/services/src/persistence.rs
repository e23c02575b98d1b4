//! Background write-through of progress snapshots.
//!
//! The engine updates memory first and hands the resulting write plan to a
//! single worker task. Commands are applied in FIFO order; a run of queued
//! full-state writes collapses into the newest one since each plan covers
//! every field.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use storage::repository::{KeyValueStore, StorageError};

use crate::config::EngineConfig;
use crate::progress_codec::WritePlan;

enum WriteCommand {
    Write(WritePlan),
    Clear,
    Flush(oneshot::Sender<()>),
}

/// Handle to the write-behind worker.
pub struct WriteBehind {
    tx: mpsc::UnboundedSender<WriteCommand>,
    handle: JoinHandle<()>,
}

impl WriteBehind {
    /// Spawn the worker on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(store: Arc<dyn KeyValueStore>, config: EngineConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_worker(store, config, rx));
        Self { tx, handle }
    }

    /// Queue a full-state write.
    pub fn write(&self, plan: WritePlan) {
        self.send(WriteCommand::Write(plan));
    }

    /// Queue removal of every stored key.
    pub fn clear(&self) {
        self.send(WriteCommand::Clear);
    }

    /// Wait until everything queued before this call has been attempted.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(WriteCommand::Flush(done_tx));
        if done_rx.await.is_err() {
            warn!("progress writer stopped before flush completed");
        }
    }

    /// Drain pending writes and stop the worker.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(err) = self.handle.await {
            warn!(error = %err, "progress writer task ended abnormally");
        }
    }

    fn send(&self, command: WriteCommand) {
        if self.tx.send(command).is_err() {
            warn!("progress writer is not running, dropping write");
        }
    }
}

async fn run_worker(
    store: Arc<dyn KeyValueStore>,
    config: EngineConfig,
    mut rx: mpsc::UnboundedReceiver<WriteCommand>,
) {
    let mut pending: Option<WriteCommand> = None;

    loop {
        let command = match pending.take() {
            Some(command) => command,
            None => match rx.recv().await {
                Some(command) => command,
                None => break,
            },
        };

        match command {
            WriteCommand::Write(mut plan) => {
                // Collapse back-to-back writes; keep the first non-write for the next turn.
                while let Ok(next) = rx.try_recv() {
                    match next {
                        WriteCommand::Write(newer) => plan = newer,
                        other => {
                            pending = Some(other);
                            break;
                        }
                    }
                }
                with_retries(&config, "write", || apply_plan(store.as_ref(), &plan)).await;
            }
            WriteCommand::Clear => {
                with_retries(&config, "clear", || store.clear()).await;
            }
            WriteCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    debug!("progress writer stopped");
}

async fn apply_plan(store: &dyn KeyValueStore, plan: &WritePlan) -> Result<(), StorageError> {
    store.set_many(&plan.set).await?;
    for key in &plan.remove {
        store.remove(key).await?;
    }
    Ok(())
}

async fn with_retries<F, Fut>(config: &EngineConfig, op: &'static str, mut attempt: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), StorageError>>,
{
    let attempts = config.write_retries.saturating_add(1);
    for n in 1..=attempts {
        match attempt().await {
            Ok(()) => {
                debug!(op, attempt = n, "progress persisted");
                return;
            }
            Err(err) if n < attempts => {
                warn!(op, attempt = n, error = %err, "progress write failed, retrying");
                tokio::time::sleep(config.retry_backoff).await;
            }
            Err(err) => {
                warn!(op, attempts, error = %err, "progress write failed, giving up");
            }
        }
    }
}
