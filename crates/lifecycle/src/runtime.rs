use connectors::destination::DestinationAdapter;
use connectors::source::SourceAdapter;
use engine_core::{Metrics, ProgressSink, StateStore};
use model::connector::Connector;
use model::task::{Task, TaskStatus};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use variables::GlobalVariableStore;

/// Everything the controller needs to drive one registered task: its
/// current config/status and the adapters it holds open for its whole
/// lifetime, plus the cancellation token that `stop`/`pause` trigger.
///
/// `source` is an `Arc` rather than a `Box` because `variable_store` holds
/// its own clone, needed to run `db_query`/`raw_query` global variables
/// against the same live connection the table pipelines read from.
pub struct TaskRuntime {
    pub task: Mutex<Task>,
    pub source: Arc<dyn SourceAdapter>,
    pub destination: Box<dyn DestinationAdapter>,
    pub source_connector: Connector,
    pub destination_connector: Connector,
    pub variable_store: Box<dyn GlobalVariableStore>,
    pub state: Arc<dyn StateStore>,
    pub metrics: Arc<Metrics>,
    pub sink: Arc<dyn ProgressSink>,
    pub cancel: Mutex<CancellationToken>,
}

impl TaskRuntime {
    pub fn status(&self) -> TaskStatus {
        self.task.lock().unwrap().status
    }

    pub fn set_status(&self, status: TaskStatus) {
        self.task.lock().unwrap().status = status;
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.lock().unwrap().clone()
    }

    /// Replaces the cancellation token with a fresh, uncancelled one, used
    /// by `resume` after a `pause`/`stop` triggered the previous one.
    pub fn reset_cancel_token(&self) {
        *self.cancel.lock().unwrap() = CancellationToken::new();
    }
}
