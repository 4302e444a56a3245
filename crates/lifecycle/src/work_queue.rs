/// The unit of work the lifecycle controller hands to the task executor
/// pool. The controller is the queue's sole producer — it decides when a
/// task is due for a full load or a CDC round — and the dispatcher loop
/// spawned by `LifecycleController::new` is its sole consumer.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub task_id: String,
    pub kind: WorkKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkKind {
    FullLoad,
    CdcRound,
}
