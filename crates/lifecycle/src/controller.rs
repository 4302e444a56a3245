use crate::error::ControllerError;
use crate::runtime::TaskRuntime;
use crate::work_queue::{WorkItem, WorkKind};
use engine_runtime::TaskExecutor;
use model::task::{Schedule, TaskStatus, TransferMode};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};
use variables::VariableResolver;

/// Task status state machine:
///
/// `Created` --start--> `Running` --stop--> `Stopped`
///      `Running` --pause--> `Paused` --resume--> `Running`
///      `Running` --(full load done, no CDC)--> `Completed`
///      `Running` --(unrecoverable failure)--> `Failed`
///
/// The controller is the sole producer onto the work queue; a dispatcher
/// task it spawns in `new` is the sole consumer, bounded to
/// `max_concurrent_tasks` concurrently executing full-load-or-CDC rounds
/// regardless of how many tasks are registered.
pub struct LifecycleController {
    runtimes: Arc<Mutex<HashMap<String, Arc<TaskRuntime>>>>,
    work_tx: mpsc::Sender<WorkItem>,
}

impl LifecycleController {
    pub fn new(max_concurrent_tasks: usize) -> Self {
        let (work_tx, mut work_rx) = mpsc::channel::<WorkItem>(1024);
        let runtimes: Arc<Mutex<HashMap<String, Arc<TaskRuntime>>>> = Arc::new(Mutex::new(HashMap::new()));
        let semaphore = Arc::new(Semaphore::new(max_concurrent_tasks.max(1)));

        let dispatch_runtimes = runtimes.clone();
        tokio::spawn(async move {
            while let Some(item) = work_rx.recv().await {
                let Some(runtime) = dispatch_runtimes.lock().unwrap().get(&item.task_id).cloned() else {
                    warn!(task_id = %item.task_id, "work item for unregistered task dropped");
                    continue;
                };
                if runtime.status() != TaskStatus::Running {
                    continue;
                }
                let semaphore = semaphore.clone();
                tokio::spawn(async move {
                    let _permit = semaphore.acquire().await.expect("semaphore not closed");
                    run_work_item(runtime, item.kind).await;
                });
            }
        });

        LifecycleController { runtimes, work_tx }
    }

    pub fn register(&self, task_id: impl Into<String>, runtime: TaskRuntime) {
        self.runtimes
            .lock()
            .unwrap()
            .insert(task_id.into(), Arc::new(runtime));
    }

    fn get(&self, task_id: &str) -> Result<Arc<TaskRuntime>, ControllerError> {
        self.runtimes
            .lock()
            .unwrap()
            .get(task_id)
            .cloned()
            .ok_or_else(|| ControllerError::TaskNotFound(task_id.to_string()))
    }

    /// Transitions a task to `Running` and enqueues its initial work:
    /// a full load for any table not yet fully loaded, and/or a CDC
    /// round, depending on `task.mode`.
    pub async fn start(&self, task_id: &str) -> Result<(), ControllerError> {
        let runtime = self.get(task_id)?;
        let current = runtime.status();
        if current == TaskStatus::Running {
            return Err(ControllerError::AlreadyRunning {
                task_id: task_id.to_string(),
            });
        }
        if current != TaskStatus::Created
            && current != TaskStatus::Stopped
            && current != TaskStatus::Failed
            && current != TaskStatus::Paused
        {
            return Err(ControllerError::InvalidTransition {
                from: current,
                to: TaskStatus::Running,
            });
        }
        runtime.reset_cancel_token();
        runtime.set_status(TaskStatus::Running);

        let mode = runtime.task.lock().unwrap().mode;
        match mode {
            TransferMode::FullLoad => self.enqueue(task_id, WorkKind::FullLoad).await,
            TransferMode::Cdc => self.enqueue(task_id, WorkKind::CdcRound).await,
            TransferMode::FullLoadThenCdc => self.enqueue(task_id, WorkKind::FullLoad).await,
        }
        self.spawn_scheduler_if_polling(task_id, &runtime);
        Ok(())
    }

    pub async fn stop(&self, task_id: &str) -> Result<(), ControllerError> {
        let runtime = self.get(task_id)?;
        runtime.cancel_token().cancel();
        runtime.set_status(TaskStatus::Stopped);
        Ok(())
    }

    pub async fn pause(&self, task_id: &str) -> Result<(), ControllerError> {
        let runtime = self.get(task_id)?;
        if runtime.status() != TaskStatus::Running {
            return Err(ControllerError::InvalidTransition {
                from: runtime.status(),
                to: TaskStatus::Paused,
            });
        }
        runtime.cancel_token().cancel();
        runtime.set_status(TaskStatus::Paused);
        Ok(())
    }

    pub async fn resume(&self, task_id: &str) -> Result<(), ControllerError> {
        let runtime = self.get(task_id)?;
        if runtime.status() != TaskStatus::Paused {
            return Err(ControllerError::InvalidTransition {
                from: runtime.status(),
                to: TaskStatus::Running,
            });
        }
        self.start(task_id).await
    }

    pub fn status(&self, task_id: &str) -> Result<TaskStatus, ControllerError> {
        Ok(self.get(task_id)?.status())
    }

    async fn enqueue(&self, task_id: &str, kind: WorkKind) {
        let _ = self
            .work_tx
            .send(WorkItem {
                task_id: task_id.to_string(),
                kind,
            })
            .await;
    }

    /// For any task on a `Continuous`/`Interval` schedule, spawns a
    /// background loop that keeps enqueuing work until the task's
    /// cancellation token fires: CDC rounds for `Cdc`/`FullLoadThenCdc`
    /// tasks, full-load re-runs for `FullLoad` tasks.
    fn spawn_scheduler_if_polling(&self, task_id: &str, runtime: &Arc<TaskRuntime>) {
        let (mode, schedule) = {
            let task = runtime.task.lock().unwrap();
            (task.mode, task.schedule)
        };
        let interval = match schedule {
            Schedule::OnDemand => return,
            Schedule::Continuous => std::time::Duration::from_secs(10),
            Schedule::Interval { seconds } => std::time::Duration::from_secs(seconds.max(1)),
        };
        let kind = match mode {
            TransferMode::FullLoad => WorkKind::FullLoad,
            TransferMode::Cdc | TransferMode::FullLoadThenCdc => WorkKind::CdcRound,
        };

        let work_tx = self.work_tx.clone();
        let task_id = task_id.to_string();
        let cancel = runtime.cancel_token();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let _ = work_tx
                            .send(WorkItem {
                                task_id: task_id.clone(),
                                kind,
                            })
                            .await;
                    }
                }
            }
        });
    }
}

async fn run_work_item(runtime: Arc<TaskRuntime>, kind: WorkKind) {
    let task = runtime.task.lock().unwrap().clone();
    let execution_id = uuid::Uuid::new_v4().to_string();
    let resolver = VariableResolver::new(runtime.variable_store.as_ref());

    let executor = TaskExecutor {
        source: runtime.source.as_ref(),
        destination: runtime.destination.as_ref(),
        source_connector: &runtime.source_connector,
        destination_connector: &runtime.destination_connector,
        resolver: &resolver,
        state: runtime.state.clone(),
        metrics: runtime.metrics.clone(),
        sink: runtime.sink.clone(),
        cancel: runtime.cancel_token(),
    };

    let outcome = match kind {
        WorkKind::FullLoad => executor.run_full_load(&task, &execution_id).await,
        WorkKind::CdcRound => executor.run_cdc_round(&task, &execution_id).await,
    };

    if !outcome.failed.is_empty() {
        warn!(task_id = %task.id, failed = ?outcome.failed, "task run completed with failures");
    } else {
        info!(task_id = %task.id, succeeded = ?outcome.succeeded, "task run completed");
    }

    let schedule = runtime.task.lock().unwrap().schedule;
    if kind == WorkKind::FullLoad
        && outcome.failed.is_empty()
        && task.mode == TransferMode::FullLoad
        && schedule == Schedule::OnDemand
    {
        runtime.set_status(TaskStatus::Completed);
    }
}
