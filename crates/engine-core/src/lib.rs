pub mod error;
pub mod event_bus;
pub mod metrics;
pub mod progress;
pub mod retry;
pub mod sink;
pub mod state;

pub use error::PipelineError;
pub use metrics::{Metrics, MetricsSnapshot};
pub use retry::{classify_adapter_errors, RetryDisposition, RetryPolicy};
pub use sink::{EventBusSink, ProgressSink};
pub use state::{Checkpoint, CheckpointStage, StateStore, WalEntry};
