// src/persist_worker.rs - single-writer persistence task
use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{
    NoteError, PersistOp, PersistenceFailure, PersistenceProvider, PersistenceSink, Result,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStatus {
    /// Whether the worker task is running
    pub is_running: bool,
    /// Writes the provider accepted
    pub applied: u64,
    /// Writes the provider refused
    pub failed: u64,
    /// Message of the most recent failure
    pub last_error: Option<String>,
}

#[derive(Debug)]
enum WorkerCommand {
    Apply(PersistOp),
    /// Acknowledged once every earlier write has been handled
    Flush(oneshot::Sender<()>),
    Stop,
}

/// The engine-facing end: queues writes and collects failures.
pub struct PersistenceWorker {
    command_tx: mpsc::UnboundedSender<WorkerCommand>,
    failure_rx: mpsc::UnboundedReceiver<PersistenceFailure>,
}

/// The host-facing end: flushes, reports status and stops the task.
pub struct WorkerControl {
    command_tx: mpsc::UnboundedSender<WorkerCommand>,
    task: Option<JoinHandle<()>>,
    status: Arc<Mutex<WorkerStatus>>,
}

impl PersistenceWorker {
    /// Spawns the writer task on the current tokio runtime.
    ///
    /// All writes go through this one task in submission order.
    pub fn spawn<P>(provider: P) -> (PersistenceWorker, WorkerControl)
    where
        P: PersistenceProvider + 'static,
    {
        info!("Starting persistence worker...");
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        let status = Arc::new(Mutex::new(WorkerStatus {
            is_running: true,
            ..WorkerStatus::default()
        }));

        let provider = Arc::new(provider);
        let task_status = Arc::clone(&status);
        let task = tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                match command {
                    WorkerCommand::Apply(op) => {
                        let provider = Arc::clone(&provider);
                        let pending = op.clone();
                        let outcome =
                            tokio::task::spawn_blocking(move || provider.apply(&pending)).await;
                        let result = match outcome {
                            Ok(result) => result,
                            Err(e) => Err(NoteError::persistence(format!(
                                "write task failed: {}",
                                e
                            ))),
                        };

                        let mut status = match task_status.lock() {
                            Ok(status) => status,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        match result {
                            Ok(()) => {
                                status.applied += 1;
                                debug!("Persisted change to note {}", op.note_id());
                            }
                            Err(e) => {
                                status.failed += 1;
                                status.last_error = Some(e.to_string());
                                warn!("Failed to persist change to note {}: {}", op.note_id(), e);
                                let failure = PersistenceFailure {
                                    op,
                                    message: e.to_string(),
                                };
                                if failure_tx.send(failure).is_err() {
                                    debug!("Failure receiver dropped");
                                }
                            }
                        }
                    }
                    WorkerCommand::Flush(ack) => {
                        let _ = ack.send(());
                    }
                    WorkerCommand::Stop => {
                        info!("Persistence worker stopping...");
                        break;
                    }
                }
            }
        });

        let worker = PersistenceWorker {
            command_tx: command_tx.clone(),
            failure_rx,
        };
        let control = WorkerControl {
            command_tx,
            task: Some(task),
            status,
        };
        (worker, control)
    }
}

impl PersistenceSink for PersistenceWorker {
    fn submit(&mut self, op: PersistOp) {
        let note_id = op.note_id();
        if self.command_tx.send(WorkerCommand::Apply(op)).is_err() {
            error!(
                "Persistence worker is gone; change to note {} not written",
                note_id
            );
        }
    }

    fn drain_failures(&mut self) -> Vec<PersistenceFailure> {
        let mut failures = Vec::new();
        while let Ok(failure) = self.failure_rx.try_recv() {
            failures.push(failure);
        }
        failures
    }
}

impl WorkerControl {
    /// Waits until every write submitted so far has been handled.
    pub async fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.command_tx
            .send(WorkerCommand::Flush(ack_tx))
            .map_err(|_| NoteError::persistence("persistence worker is not running"))?;
        ack_rx
            .await
            .map_err(|_| NoteError::persistence("persistence worker stopped before flushing"))
    }

    /// Stops the worker after the writes already queued.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            if let Err(e) = self.command_tx.send(WorkerCommand::Stop) {
                error!("Failed to send stop command to persistence worker: {}", e);
            }

            if let Err(e) = task.await {
                let message = format!("Failed to stop persistence worker: {}", e);
                error!("{}", message);
                return Err(NoteError::persistence(message));
            }

            if let Ok(mut status) = self.status.lock() {
                status.is_running = false;
            }
            info!("Persistence worker stopped");
        } else {
            debug!("Persistence worker is not running");
        }
        Ok(())
    }

    pub fn status(&self) -> WorkerStatus {
        match self.status.lock() {
            Ok(status) => status.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStorage, Note, NoteId};
    use chrono::{TimeZone, Utc};

    fn note(id: u64) -> Note {
        Note::new(NoteId(id), Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn writes_are_applied_in_order() {
        let storage = Arc::new(MemoryStorage::new());
        let (mut worker, mut control) = PersistenceWorker::spawn(Arc::clone(&storage));

        worker.submit(PersistOp::SaveNote(note(1)));
        worker.submit(PersistOp::SaveNote(note(2)));
        worker.submit(PersistOp::RemoveNote(NoteId(1)));
        control.flush().await.unwrap();

        assert!(storage.note(NoteId(1)).is_none());
        assert!(storage.note(NoteId(2)).is_some());
        assert_eq!(control.status().applied, 3);
        assert!(worker.drain_failures().is_empty());

        control.shutdown().await.unwrap();
        assert!(!control.status().is_running);
    }

    #[tokio::test]
    async fn failures_come_back_to_the_engine_side() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_failing(true);
        let (mut worker, mut control) = PersistenceWorker::spawn(Arc::clone(&storage));

        worker.submit(PersistOp::SaveNote(note(7)));
        control.flush().await.unwrap();

        let failures = worker.drain_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].op.note_id(), NoteId(7));
        let status = control.status();
        assert_eq!(status.failed, 1);
        assert!(status.last_error.is_some());

        control.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn flush_after_shutdown_is_an_error() {
        let (_worker, mut control) = PersistenceWorker::spawn(MemoryStorage::new());
        control.shutdown().await.unwrap();
        control.shutdown().await.unwrap();
        assert!(control.flush().await.is_err());
    }
}
