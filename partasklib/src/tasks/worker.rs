use super::partition::Partition;
use super::status::{PartitionOutcome, Update};
use crate::batch::Row;
use crate::error::{TaskError, TaskErrorKind};
use log::{debug, trace, warn};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// The user's task function with its error type erased to a message.
pub type TaskFn<V, R> = Arc<dyn Fn(&Row<'_, V>) -> Result<R, String> + Send + Sync>;
pub type UpdateSenderFor<V, R> = mpsc::UnboundedSender<Update<V, R>>;
pub type UpdateReceiverFor<V, R> = mpsc::UnboundedReceiver<Update<V, R>>;

/// Runs one partition, in order, on whichever thread calls [`Worker::run`].
pub struct Worker<V, R> {
    partition: Partition<V>,
    function: TaskFn<V, R>,
    cancelled: Arc<AtomicBool>,
    update_sender: UpdateSenderFor<V, R>,
}

impl<V, R> Worker<V, R> {
    pub fn new(
        partition: Partition<V>,
        function: TaskFn<V, R>,
        cancelled: Arc<AtomicBool>,
        update_sender: UpdateSenderFor<V, R>,
    ) -> Self {
        Self {
            partition,
            function,
            cancelled,
            update_sender,
        }
    }

    pub fn partition(&self) -> usize {
        self.partition.index
    }

    pub fn run(self) {
        let index = self.partition.index;
        trace!("Worker {index} starting on {} tasks", self.partition.len());
        let mut results = Vec::with_capacity(self.partition.len());
        let mut failure = None;
        for (local, row) in self.partition.inputs.rows().enumerate() {
            if self.cancelled.load(Ordering::SeqCst) {
                debug!("Worker {index} cancelled after {local} tasks");
                self.report(Update::Stopped { partition: index });
                return;
            }
            match self.perform(&row) {
                Ok(result) => {
                    results.push(result);
                    if !self.report(Update::TaskDone { partition: index }) {
                        return;
                    }
                }
                Err(kind) => {
                    failure = Some(self.decorate_error(kind, local));
                    break;
                }
            }
        }
        let Worker {
            partition,
            update_sender,
            ..
        } = self;
        let outcome = match failure {
            Some(error) => {
                warn!("Worker {index} abandoning its partition: {error}");
                PartitionOutcome::Failure {
                    partition: index,
                    inputs: partition.inputs,
                    error,
                }
            }
            None => {
                trace!("Worker {index} complete");
                PartitionOutcome::Success {
                    partition: index,
                    inputs: partition.inputs,
                    results,
                }
            }
        };
        if update_sender.send(Update::Finished(outcome)).is_err() {
            debug!("Worker {index} could not report its outcome, manager has gone away");
        }
    }

    fn perform(&self, row: &Row<'_, V>) -> Result<R, TaskErrorKind> {
        match catch_unwind(AssertUnwindSafe(|| (self.function)(row))) {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(message)) => Err(TaskErrorKind::Failed(message)),
            Err(panic) => Err(TaskErrorKind::Panicked(panic_message(panic.as_ref()))),
        }
    }

    fn decorate_error(&self, kind: TaskErrorKind, local: usize) -> TaskError {
        let row = self.partition.indices.get(local).copied().unwrap_or(local);
        TaskError::new(kind, self.partition.index, row)
    }

    /// Returns false once nobody is listening any more.
    fn report(&self, update: Update<V, R>) -> bool {
        if self.update_sender.send(update).is_err() {
            debug!(
                "Worker {} could not send an update, manager has gone away",
                self.partition.index
            );
            return false;
        }
        true
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
