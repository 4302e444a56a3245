use thiserror::Error;

/// Errors the lifecycle controller raises directly; failures from a
/// running task's pipeline are recorded against that task's execution
/// instead of propagating here.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("task {task_id} is already running")]
    AlreadyRunning { task_id: String },

    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: model::task::TaskStatus,
        to: model::task::TaskStatus,
    },
}
