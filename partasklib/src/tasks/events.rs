use crate::batch::{Batch, RunResults};
use crate::error::TaskError;
use enum_kinds::EnumKind;

/// Everything a subscriber can observe about a run, in the order the manager publishes it.
#[derive(EnumKind)]
#[enum_kind(RunEventKind, derive(Hash, Ord, PartialOrd))]
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent<V, R> {
    Started {
        run: u64,
        partitions: usize,
        tasks: usize,
    },
    /// Percentage of the run's tasks completed so far, in `0.0..=100.0`.
    Progress(f64),
    ThreadException {
        inputs: Batch<V>,
        error: TaskError,
    },
    Finished {
        results: RunResults<V, R>,
        failed_results: Batch<V>,
    },
    Cancelled,
}

impl<V, R> RunEvent<V, R> {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Finished { .. } | RunEvent::Cancelled)
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome<V, R> {
    Finished {
        results: RunResults<V, R>,
        failed_results: Batch<V>,
    },
    Cancelled,
}

impl<V, R> RunOutcome<V, R> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled)
    }

    pub fn results(&self) -> Option<&RunResults<V, R>> {
        match self {
            RunOutcome::Finished { results, .. } => Some(results),
            RunOutcome::Cancelled => None,
        }
    }

    pub fn failed_results(&self) -> Option<&Batch<V>> {
        match self {
            RunOutcome::Finished { failed_results, .. } => Some(failed_results),
            RunOutcome::Cancelled => None,
        }
    }
}

impl<V: Clone, R: Clone> From<&RunOutcome<V, R>> for RunEvent<V, R> {
    fn from(outcome: &RunOutcome<V, R>) -> Self {
        match outcome {
            RunOutcome::Finished {
                results,
                failed_results,
            } => RunEvent::Finished {
                results: results.clone(),
                failed_results: failed_results.clone(),
            },
            RunOutcome::Cancelled => RunEvent::Cancelled,
        }
    }
}

type ProgressFn = Box<dyn FnMut(f64) + Send>;
type ThreadExceptionFn<V> = Box<dyn FnMut(&Batch<V>, &TaskError) + Send>;
type FinishedFn<V, R> = Box<dyn FnMut(&RunResults<V, R>, &Batch<V>) + Send>;
type CancelledFn = Box<dyn FnMut() + Send>;

/// Per-run listeners, called from the run's coordinator thread.
pub struct Callbacks<V, R> {
    on_progress: Option<ProgressFn>,
    on_thread_exception: Option<ThreadExceptionFn<V>>,
    on_finished: Option<FinishedFn<V, R>>,
    on_cancelled: Option<CancelledFn>,
}

impl<V, R> Default for Callbacks<V, R> {
    fn default() -> Self {
        Self {
            on_progress: None,
            on_thread_exception: None,
            on_finished: None,
            on_cancelled: None,
        }
    }
}

impl<V, R> std::fmt::Debug for Callbacks<V, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_thread_exception", &self.on_thread_exception.is_some())
            .field("on_finished", &self.on_finished.is_some())
            .field("on_cancelled", &self.on_cancelled.is_some())
            .finish()
    }
}

impl<V, R> Callbacks<V, R> {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_progress(mut self, f: impl FnMut(f64) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_thread_exception(
        mut self,
        f: impl FnMut(&Batch<V>, &TaskError) + Send + 'static,
    ) -> Self {
        self.on_thread_exception = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_finished(
        mut self,
        f: impl FnMut(&RunResults<V, R>, &Batch<V>) + Send + 'static,
    ) -> Self {
        self.on_finished = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_cancelled(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_cancelled = Some(Box::new(f));
        self
    }

    /// Routes an event to the matching listener, if there is one.
    pub(crate) fn dispatch(&mut self, event: &RunEvent<V, R>) {
        match event {
            RunEvent::Started { .. } => {}
            RunEvent::Progress(percent) => {
                if let Some(f) = &mut self.on_progress {
                    f(*percent);
                }
            }
            RunEvent::ThreadException { inputs, error } => {
                if let Some(f) = &mut self.on_thread_exception {
                    f(inputs, error);
                }
            }
            RunEvent::Finished {
                results,
                failed_results,
            } => {
                if let Some(f) = &mut self.on_finished {
                    f(results, failed_results);
                }
            }
            RunEvent::Cancelled => {
                if let Some(f) = &mut self.on_cancelled {
                    f();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskErrorKind;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    #[test]
    fn dispatch_reaches_only_the_matching_listener() {
        let calls = Arc::new(Mutex::new(Vec::<String>::new()));
        let (c1, c2, c3, c4) = (calls.clone(), calls.clone(), calls.clone(), calls.clone());
        let mut callbacks = Callbacks::<i32, i32>::new()
            .on_progress(move |p| c1.lock().expect("calls").push(format!("progress {p}")))
            .on_thread_exception(move |inputs, error| {
                c2.lock()
                    .expect("calls")
                    .push(format!("exception {:?} {}", &inputs["x"], error.row))
            })
            .on_finished(move |results, failed| {
                c3.lock()
                    .expect("calls")
                    .push(format!("finished {} {}", results.len(), failed.len()))
            })
            .on_cancelled(move || c4.lock().expect("calls").push("cancelled".to_string()));

        callbacks.dispatch(&RunEvent::Started {
            run: 1,
            partitions: 2,
            tasks: 4,
        });
        callbacks.dispatch(&RunEvent::Progress(25.0));
        callbacks.dispatch(&RunEvent::ThreadException {
            inputs: Batch::single("x", vec![1, 3]),
            error: TaskError::new(TaskErrorKind::Failed("no".to_string()), 0, 2),
        });
        callbacks.dispatch(&RunEvent::Finished {
            results: RunResults::default(),
            failed_results: Batch::single("x", vec![1, 3]),
        });
        callbacks.dispatch(&RunEvent::Cancelled);

        assert_eq!(
            *calls.lock().expect("calls"),
            vec![
                "progress 25".to_string(),
                "exception [1, 3] 2".to_string(),
                "finished 0 2".to_string(),
                "cancelled".to_string(),
            ]
        );
    }

    #[test]
    fn event_kinds() {
        let event: RunEvent<i32, i32> = RunEvent::Progress(100.0);
        assert_eq!(RunEventKind::from(&event), RunEventKind::Progress);
        assert!(!event.is_terminal());
        assert!(RunEvent::<i32, i32>::Cancelled.is_terminal());
    }
}
