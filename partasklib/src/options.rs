/// Tuning knobs for a [`WorkerManager`](crate::tasks::manager::WorkerManager).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerOptions {
    /// How many events a subscriber may fall behind before it starts missing them.
    pub event_capacity: usize,
    /// Worker threads are named `{prefix}-worker-{partition}`.
    pub thread_name_prefix: String,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            event_capacity: 1024,
            thread_name_prefix: "partask".to_string(),
        }
    }
}

impl ManagerOptions {
    #[must_use]
    pub fn with_event_capacity(self, event_capacity: usize) -> Self {
        Self {
            event_capacity,
            ..self
        }
    }

    #[must_use]
    pub fn with_thread_name_prefix(self, prefix: &str) -> Self {
        Self {
            thread_name_prefix: prefix.to_owned(),
            ..self
        }
    }

    pub(crate) fn worker_thread_name(&self, partition: usize) -> String {
        format!("{}-worker-{partition}", self.thread_name_prefix)
    }

    pub(crate) fn coordinator_thread_name(&self) -> String {
        format!("{}-coordinator", self.thread_name_prefix)
    }
}
