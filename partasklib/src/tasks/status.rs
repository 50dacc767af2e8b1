use crate::batch::Batch;
use crate::error::TaskError;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum WorkerState {
    /// Spawned, but has not reported anything yet.
    New,
    Running,
    Complete,
    Failure(TaskError),
    /// Stopped early because the run was cancelled.
    Cancelled,
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerState::New | WorkerState::Running)
    }
}

/// What the manager knows about one worker of the current run.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WorkerStatus {
    pub partition: usize,
    pub thread_name: String,
    pub num_tasks: usize,
    pub num_completed: usize,
    pub state: WorkerState,
}

impl WorkerStatus {
    pub fn new(partition: usize, thread_name: String, num_tasks: usize) -> Self {
        Self {
            partition,
            thread_name,
            num_tasks,
            num_completed: 0,
            state: WorkerState::New,
        }
    }
}

/// The single terminal report of a partition that ran to the end (or to its first failure).
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PartitionOutcome<V, R> {
    Success {
        partition: usize,
        inputs: Batch<V>,
        results: Vec<R>,
    },
    /// Carries the whole partition's inputs, including rows that were never attempted.
    Failure {
        partition: usize,
        inputs: Batch<V>,
        error: TaskError,
    },
}

impl<V, R> PartitionOutcome<V, R> {
    pub fn partition(&self) -> usize {
        match self {
            PartitionOutcome::Success { partition, .. }
            | PartitionOutcome::Failure { partition, .. } => *partition,
        }
    }
}

/// Messages from a worker thread to the manager.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Update<V, R> {
    TaskDone { partition: usize },
    Finished(PartitionOutcome<V, R>),
    /// The worker noticed the run was cancelled and gave up without an outcome.
    Stopped { partition: usize },
}

impl<V, R> Update<V, R> {
    pub fn partition(&self) -> usize {
        match self {
            Update::TaskDone { partition } | Update::Stopped { partition } => *partition,
            Update::Finished(outcome) => outcome.partition(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Update::TaskDone { .. })
    }
}
