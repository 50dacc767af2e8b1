#![deny(clippy::all)]

#[macro_use]
pub mod utils;

pub mod batch;
pub mod error;
pub mod options;
pub mod tasks;

pub use batch::{Batch, Row, RunResults};
pub use error::{BatchError, StartError, TaskError, TaskErrorKind};
pub use options::ManagerOptions;
pub use tasks::events::{Callbacks, RunEvent, RunEventKind, RunOutcome};
pub use tasks::manager::{RunStats, StatusReport, WorkerManager};
pub use tasks::partition::{partition_indices, split_batch, split_sequence, Partition};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Anything that can travel through a batch: cloned into partitions, sent between threads and
/// republished to subscribers.
pub trait Value: Clone + std::fmt::Debug + Send + Sync + 'static {}
impl<T: Clone + std::fmt::Debug + Send + Sync + 'static> Value for T {}

#[cfg(feature = "native")]
fn build_logger(default_filter: &str, finish: impl FnOnce(&mut env_logger::Builder)) {
    static LOGS_INITIALISED: std::sync::Once = std::sync::Once::new();
    LOGS_INITIALISED.call_once(|| {
        finish(
            env_logger::Builder::from_env(
                env_logger::Env::default()
                    .filter_or("RUST_LOG", default_filter)
                    .write_style_or("RUST_LOG_STYLE", "AUTO"),
            )
            .format_timestamp(None),
        );
    });
}

#[cfg(all(test, feature = "native"))]
pub fn ensure_initialized() {
    build_logger("debug", |env| {
        let _ = env.is_test(true).try_init();
    });
}

#[cfg(all(not(test), feature = "native"))]
pub fn ensure_initialized() {
    build_logger("info", |env| {
        // Another logger may already be installed by the embedding application.
        let _ = env.try_init();
    });
}

#[cfg(not(feature = "native"))]
pub fn ensure_initialized() {}
