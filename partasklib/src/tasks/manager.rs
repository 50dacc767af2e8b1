use super::events::{Callbacks, RunEvent, RunOutcome};
use super::partition::split_batch;
use super::status::{PartitionOutcome, Update, WorkerState, WorkerStatus};
use super::worker::{TaskFn, UpdateReceiverFor, Worker};
use crate::batch::{Batch, Row, RunResults};
use crate::error::{StartError, TaskError};
use crate::options::ManagerOptions;
use crate::Value;
use log::{debug, error, info, trace, warn};
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::{broadcast, mpsc};

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub num_tasks: usize,
    pub num_completed: usize,
    pub num_partitions: usize,
    pub num_succeeded: usize,
    pub num_failed: usize,
    pub num_cancelled: usize,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let RunStats {
            num_tasks,
            num_completed,
            num_partitions,
            num_succeeded: _,
            num_failed,
            num_cancelled,
        } = &self;
        if *num_partitions == 0 {
            return write!(f, "...");
        }
        write!(f, "{num_completed}/{num_tasks}")?;
        let items: Vec<String> = [(num_failed, "failed"), (num_cancelled, "cancelled")]
            .iter()
            .filter(|(n, _label)| **n > 0)
            .map(|(n, label)| format!("{n} {label}"))
            .collect();
        if !items.is_empty() {
            write!(f, " ({})", items.join(" "))?;
        }
        Ok(())
    }
}

/// A snapshot of a manager, taken by [`WorkerManager::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub run: u64,
    pub running: bool,
    pub stats: RunStats,
    pub workers: Vec<WorkerStatus>,
    pub errors: Vec<TaskError>,
}

/// Everything that belongs to one run. Replaced wholesale by `start`, emptied at the end of the
/// run.
#[derive(Debug)]
struct RunState<V, R> {
    run: u64,
    /// The last run whose terminal event has been fully delivered.
    settled: u64,
    running: bool,
    threads: Vec<JoinHandle<()>>,
    /// Kept until the run ends, after `threads` has been handed to the coordinator for joining.
    worker_threads: Vec<ThreadId>,
    workers: Vec<WorkerStatus>,
    coordinator: Option<(u64, JoinHandle<()>)>,
    completed: Arc<AtomicUsize>,
    cancelled: Arc<AtomicBool>,
    total: usize,
    results: RunResults<V, R>,
    failed_results: Batch<V>,
    stats: RunStats,
    errors: Vec<TaskError>,
}

impl<V, R> Default for RunState<V, R> {
    fn default() -> Self {
        Self {
            run: 0,
            settled: 0,
            running: false,
            threads: Vec::new(),
            worker_threads: Vec::new(),
            workers: Vec::new(),
            coordinator: None,
            completed: Arc::new(AtomicUsize::new(0)),
            cancelled: Arc::new(AtomicBool::new(false)),
            total: 0,
            results: RunResults::default(),
            failed_results: Batch::default(),
            stats: RunStats::default(),
            errors: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct Shared<V, R> {
    state: Mutex<RunState<V, R>>,
    settled: Condvar,
    /// How the most recently ended run ended, keyed by its run number.
    outcome: Mutex<Option<(u64, RunOutcome<V, R>)>>,
    events: broadcast::Sender<RunEvent<V, R>>,
}

impl<V: Value, R: Value> Shared<V, R> {
    fn lock(&self) -> MutexGuard<'_, RunState<V, R>> {
        // A panicking callback must not take the whole manager down with it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribers hear of an event before the callbacks do, so a run started from a callback
    /// is always announced after the event that triggered it.
    fn publish(&self, event: RunEvent<V, R>, callbacks: &mut Callbacks<V, R>) {
        if self.events.send(event.clone()).is_err() {
            trace!("No subscribers for run event");
        }
        callbacks.dispatch(&event);
    }

    fn outcome_of(&self, run: u64) -> Option<RunOutcome<V, R>> {
        let outcome = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        match &*outcome {
            Some((ended, outcome)) if *ended == run => Some(outcome.clone()),
            _ => None,
        }
    }

    fn record_outcome(&self, run: u64, outcome: RunOutcome<V, R>) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some((run, outcome));
    }

    /// Blocks until `run` has delivered its terminal event.
    fn wait_until_settled(&self, run: u64) -> MutexGuard<'_, RunState<V, R>> {
        let state = self.lock();
        self.settled
            .wait_while(state, |state| state.settled < run)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Applies a function to every row of a batch, spread round-robin over a fixed number of worker
/// threads.
///
/// A manager runs one batch at a time. `start` returns immediately; progress, failed partitions
/// and the final outcome arrive through the [`Callbacks`] given to `start` and through
/// [`WorkerManager::subscribe`].
#[derive(Debug)]
pub struct WorkerManager<V: Value, R: Value> {
    options: ManagerOptions,
    shared: Arc<Shared<V, R>>,
}

impl<V: Value, R: Value> Default for WorkerManager<V, R> {
    fn default() -> Self {
        Self::with_options(ManagerOptions::default())
    }
}

impl<V: Value, R: Value> WorkerManager<V, R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ManagerOptions) -> Self {
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        Self {
            options,
            shared: Arc::new(Shared {
                state: Mutex::new(RunState::default()),
                settled: Condvar::new(),
                outcome: Mutex::new(None),
                events,
            }),
        }
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Receives every event published from now on, for this and all later runs.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent<V, R>> {
        self.shared.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Worker threads of the current run that have not been joined yet.
    pub fn thread_count(&self) -> usize {
        self.shared.lock().threads.len()
    }

    pub fn worker_count(&self) -> usize {
        self.shared.lock().workers.len()
    }

    /// Percentage of the current (or last) run's tasks that have completed.
    pub fn progress(&self) -> f64 {
        let state = self.shared.lock();
        if state.run == 0 {
            return 0.0;
        }
        percent(state.completed.load(Ordering::SeqCst), state.total)
    }

    pub fn status(&self) -> StatusReport {
        let state = self.shared.lock();
        StatusReport {
            run: state.run,
            running: state.running,
            stats: state.stats,
            workers: state.workers.clone(),
            errors: state.errors.clone(),
        }
    }

    /// Starts applying `function` to every row of `batch` on `concurrency` worker threads.
    ///
    /// Row `i` is handled by worker `i % concurrency`. Each worker gives up on its whole
    /// partition at its first failing row, so the rows it never attempted never report progress:
    /// progress reaches 100 only when every row was attempted and succeeded. Runs with a failed
    /// partition end below 100.
    ///
    /// Fails with [`StartError::AlreadyRunning`] until the previous run's terminal event has been
    /// delivered, even once [`WorkerManager::is_running`] is false. The previous run's own
    /// `on_finished` and `on_cancelled` callbacks may start the next run.
    pub fn start<F, E>(
        &self,
        function: F,
        concurrency: usize,
        batch: Batch<V>,
        callbacks: Callbacks<V, R>,
    ) -> Result<(), StartError>
    where
        F: Fn(&Row<'_, V>) -> Result<R, E> + Send + Sync + 'static,
        E: Display,
    {
        let mut state = self.shared.lock();
        if state.running {
            debug!("Refusing to start, run {} in progress", state.run);
            return Err(StartError::AlreadyRunning);
        }
        if state.settled < state.run && !on_coordinator_thread(&state) {
            debug!("Refusing to start, run {} is still ending", state.run);
            return Err(StartError::AlreadyRunning);
        }
        if concurrency == 0 {
            return Err(StartError::NoWorkers);
        }

        let run = state.run + 1;
        let total = batch.len();
        let function: TaskFn<V, R> =
            Arc::new(move |row: &Row<'_, V>| function(row).map_err(|err| err.to_string()));
        let partitions = split_batch(&batch, concurrency);
        let completed = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();

        let mut threads = Vec::with_capacity(concurrency);
        let mut workers = Vec::with_capacity(concurrency);
        for partition in partitions {
            let thread_name = self.options.worker_thread_name(partition.index);
            workers.push(WorkerStatus::new(
                partition.index,
                thread_name.clone(),
                partition.len(),
            ));
            let worker = Worker::new(partition, function.clone(), cancelled.clone(), tx.clone());
            let spawned = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => threads.push(handle),
                Err(err) => {
                    error!("Could not spawn {thread_name}: {err}");
                    abandon(&cancelled, threads);
                    return Err(StartError::Spawn {
                        thread: thread_name,
                        message: err.to_string(),
                    });
                }
            }
        }
        // Only workers hold senders, so the coordinator notices if they all vanish.
        drop(tx);

        let coordinator_name = self.options.coordinator_thread_name();
        let shared = self.shared.clone();
        let coordinator = thread::Builder::new()
            .name(coordinator_name.clone())
            .spawn(move || coordinate(shared, rx, callbacks, run, concurrency));
        let coordinator = match coordinator {
            Ok(handle) => handle,
            Err(err) => {
                error!("Could not spawn {coordinator_name}: {err}");
                abandon(&cancelled, threads);
                return Err(StartError::Spawn {
                    thread: coordinator_name,
                    message: err.to_string(),
                });
            }
        };

        info!("Run {run}: {total} tasks on {concurrency} workers");
        let settled = state.settled;
        let worker_threads = threads.iter().map(|handle| handle.thread().id()).collect();
        // Dropping a previous run's handle detaches a coordinator that is already done.
        *state = RunState {
            run,
            settled,
            running: true,
            threads,
            worker_threads,
            workers,
            coordinator: Some((run, coordinator)),
            completed,
            cancelled,
            total,
            results: RunResults::empty_like(&batch),
            failed_results: Batch::empty_like(&batch),
            stats: RunStats {
                num_tasks: total,
                num_partitions: concurrency,
                ..RunStats::default()
            },
            errors: Vec::new(),
        };
        // Sent while still holding the state, so it always precedes the coordinator's events.
        if self
            .shared
            .events
            .send(RunEvent::Started {
                run,
                partitions: concurrency,
                tasks: total,
            })
            .is_err()
        {
            trace!("No subscribers for run {run}");
        }
        Ok(())
    }

    /// Asks every worker to stop before its next task, then waits until they all have and the
    /// `Cancelled` event has been delivered. Does nothing when no run is in progress.
    ///
    /// Called from one of this run's callbacks or task functions, it only raises the flag; the
    /// run still ends with `Cancelled` once the caller returns.
    pub fn cancel(&self) {
        let run = {
            let state = self.shared.lock();
            if !state.running {
                trace!("Nothing to cancel");
                return;
            }
            info!("Cancelling run {}", state.run);
            state.cancelled.store(true, Ordering::SeqCst);
            if on_run_thread(&state) {
                return;
            }
            state.run
        };
        self.settle(run);
    }

    /// Blocks until the current run (if any) has ended and returns how it ended.
    ///
    /// Returns `None` when no run was ever started, and when a callback of the awaited run had
    /// already started and ended a newer one. From the run's own callbacks it does not block: it
    /// returns the outcome inside `on_finished` and `on_cancelled`, and `None` before that. From
    /// a task function it returns `None`.
    pub fn wait(&self) -> Option<RunOutcome<V, R>> {
        let run = {
            let state = self.shared.lock();
            if state.run == 0 {
                return None;
            }
            if on_run_thread(&state) {
                warn!("Cannot wait for run {} from inside itself", state.run);
                let run = state.run;
                drop(state);
                return self.shared.outcome_of(run);
            }
            state.run
        };
        self.settle(run)
    }

    fn settle(&self, run: u64) -> Option<RunOutcome<V, R>> {
        let mut state = self.shared.wait_until_settled(run);
        let owns_coordinator = matches!(
            &state.coordinator,
            Some((coordinator_run, _)) if *coordinator_run == run
        );
        let coordinator = if owns_coordinator {
            state.coordinator.take()
        } else {
            None
        };
        drop(state);
        if let Some((_, handle)) = coordinator {
            if handle.join().is_err() {
                error!("Coordinator of run {run} panicked");
            }
        }
        self.shared.outcome_of(run)
    }
}

impl<V: Value, R: Value> Drop for WorkerManager<V, R> {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn on_coordinator_thread<V, R>(state: &RunState<V, R>) -> bool {
    state
        .coordinator
        .as_ref()
        .is_some_and(|(_, handle)| handle.thread().id() == thread::current().id())
}

/// True on the coordinator or any worker of the current run, where blocking on the run would
/// wait on the caller itself.
fn on_run_thread<V, R>(state: &RunState<V, R>) -> bool {
    on_coordinator_thread(state) || state.worker_threads.contains(&thread::current().id())
}

fn percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    completed as f64 / total as f64 * 100.0
}

/// Stops and reaps the workers of a run that failed to start.
fn abandon(cancelled: &AtomicBool, threads: Vec<JoinHandle<()>>) {
    cancelled.store(true, Ordering::SeqCst);
    for handle in threads {
        if handle.join().is_err() {
            error!("Worker panicked while abandoning a run");
        }
    }
}

/// The body of a run's coordinator thread: folds worker updates into the run state until every
/// worker has reported in, then ends the run.
fn coordinate<V: Value, R: Value>(
    shared: Arc<Shared<V, R>>,
    mut updates: UpdateReceiverFor<V, R>,
    mut callbacks: Callbacks<V, R>,
    run: u64,
    num_workers: usize,
) {
    let _settle = SettleOnExit {
        shared: shared.clone(),
        run,
    };
    let (completed, total) = {
        let state = shared.lock();
        (state.completed.clone(), state.total)
    };
    let mut remaining = num_workers;
    while remaining > 0 {
        let Some(update) = updates.blocking_recv() else {
            warn!("Run {run}: {remaining} workers went away without reporting");
            break;
        };
        trace!("Run {run} update: {update:?}");
        if update.is_terminal() {
            remaining -= 1;
        }
        match update {
            Update::TaskDone { partition } => {
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                {
                    let mut state = shared.lock();
                    state.stats.num_completed = done;
                    if let Some(worker) = state.workers.get_mut(partition) {
                        worker.num_completed += 1;
                        worker.state = WorkerState::Running;
                    }
                }
                shared.publish(RunEvent::Progress(percent(done, total)), &mut callbacks);
            }
            Update::Finished(PartitionOutcome::Success {
                partition,
                inputs,
                results,
            }) => {
                let mut state = shared.lock();
                state.stats.num_succeeded += 1;
                if let Some(worker) = state.workers.get_mut(partition) {
                    worker.state = WorkerState::Complete;
                }
                if let Err(err) = state.results.extend(inputs, results) {
                    error!("Run {run}: could not merge partition {partition}: {err}");
                }
            }
            Update::Finished(PartitionOutcome::Failure {
                partition,
                inputs,
                error,
            }) => {
                {
                    let mut state = shared.lock();
                    state.stats.num_failed += 1;
                    state.errors.push(error.clone());
                    if let Some(worker) = state.workers.get_mut(partition) {
                        worker.state = WorkerState::Failure(error.clone());
                    }
                    if let Err(err) = state.failed_results.extend(inputs.clone()) {
                        error!("Run {run}: could not merge failed partition {partition}: {err}");
                    }
                }
                shared.publish(RunEvent::ThreadException { inputs, error }, &mut callbacks);
            }
            Update::Stopped { partition } => {
                let mut state = shared.lock();
                state.stats.num_cancelled += 1;
                if let Some(worker) = state.workers.get_mut(partition) {
                    worker.state = WorkerState::Cancelled;
                }
            }
        }
    }

    let threads = std::mem::take(&mut shared.lock().threads);
    for handle in threads {
        if handle.join().is_err() {
            error!("Run {run}: a worker thread panicked");
        }
    }

    let outcome = {
        let mut state = shared.lock();
        if state.cancelled.load(Ordering::SeqCst) {
            RunOutcome::Cancelled
        } else {
            RunOutcome::Finished {
                results: std::mem::take(&mut state.results),
                failed_results: std::mem::take(&mut state.failed_results),
            }
        }
    };
    if total == 0 && !outcome.is_cancelled() {
        // Nothing ever reported progress, but the run is still complete.
        shared.publish(RunEvent::Progress(100.0), &mut callbacks);
    }

    shared.record_outcome(run, outcome.clone());
    {
        let mut state = shared.lock();
        state.workers.clear();
        state.worker_threads.clear();
        state.running = false;
        debug!("Run {run} ended: {}", state.stats);
    }
    shared.publish(RunEvent::from(&outcome), &mut callbacks);
}

/// Marks a run as settled when its coordinator exits, including by a panicking callback, so
/// `wait` and `cancel` never block on a run that can no longer end.
struct SettleOnExit<V: Value, R: Value> {
    shared: Arc<Shared<V, R>>,
    run: u64,
}

impl<V: Value, R: Value> Drop for SettleOnExit<V, R> {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            if state.run == self.run && state.running {
                error!("Run {} lost its coordinator", self.run);
                state.running = false;
                state.workers.clear();
                state.worker_threads.clear();
                state.threads.clear();
            }
            // A callback may already have started, and even finished, a later run.
            state.settled = state.settled.max(self.run);
        }
        self.shared.settled.notify_all();
    }
}
