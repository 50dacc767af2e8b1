pub mod events;
pub mod manager;
pub mod partition;
pub mod status;
pub mod worker;


pub use events::{Callbacks, RunEvent, RunEventKind, RunOutcome};
pub use manager::{RunStats, StatusReport, WorkerManager};
pub use partition::{partition_indices, split_batch, split_sequence, Partition};
pub use status::{PartitionOutcome, Update, WorkerState, WorkerStatus};

static_assertions::assert_impl_all!(WorkerManager<i64, String>: Send, Sync);
static_assertions::assert_impl_all!(RunEvent<String, Vec<u8>>: Send, Sync, Clone);
static_assertions::assert_impl_all!(Callbacks<i64, i64>: Send);
