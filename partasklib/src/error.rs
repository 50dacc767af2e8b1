use thiserror::Error;

/// Reasons a run could not be started. Nothing is spawned when `start` returns one of these.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum StartError {
    #[error("a run is already in progress")]
    AlreadyRunning,
    #[error("at least one worker is required")]
    NoWorkers,
    #[error("could not spawn thread {thread}: {message}")]
    Spawn { thread: String, message: String },
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum BatchError {
    #[error("column {key:?} has {found} rows but the batch has {expected}")]
    RaggedBatch {
        key: String,
        expected: usize,
        found: usize,
    },
    #[error("cannot merge batches with columns {found:?} into a batch with columns {expected:?}")]
    MismatchedColumns {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskErrorKind {
    /// The task function returned an error.
    Failed(String),
    /// The task function panicked.
    Panicked(String),
}

/// A single row's failure, located by the partition that ran it and its index in the original
/// batch.
#[derive(Error, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub partition: usize,
    pub row: usize,
}

impl TaskError {
    pub fn new(kind: TaskErrorKind, partition: usize, row: usize) -> Self {
        Self {
            kind,
            partition,
            row,
        }
    }

    pub fn message(&self) -> &str {
        match &self.kind {
            TaskErrorKind::Failed(message) | TaskErrorKind::Panicked(message) => message,
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self.kind, TaskErrorKind::Panicked(_))
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Debug>::fmt(self, f)
    }
}

impl std::fmt::Debug for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            TaskErrorKind::Failed(message) => write!(f, "task failed: {message}")?,
            TaskErrorKind::Panicked(message) => write!(f, "task panicked: {message}")?,
        }
        write!(f, " (row {} in partition {})", self.row, self.partition)
    }
}
