#[cfg(test)]
mod tests {
    use crate::mocks::{
        CollectingSink, FixedVariableStore, InMemoryDestination, InMemorySource, InMemoryStateStore, SharedDestination,
        TableFixture,
    };
    use crate::utils::{base_destination_connector, base_source_connector, base_task, id_name_columns, id_name_row};
    use connectors::destination::DestinationAdapter;
    use engine_core::Metrics;
    use lifecycle::{ControllerError, LifecycleController, TaskRuntime};
    use model::task::{Schedule, TaskStatus, TransferMode};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    fn runtime(
        source: InMemorySource,
        destination: Box<dyn DestinationAdapter>,
        task: model::task::Task,
    ) -> TaskRuntime {
        TaskRuntime {
            task: Mutex::new(task),
            source: Arc::new(source),
            destination,
            source_connector: base_source_connector("source"),
            destination_connector: base_destination_connector("destination"),
            variable_store: Box::new(FixedVariableStore::new()),
            state: Arc::new(InMemoryStateStore::new()),
            metrics: Arc::new(Metrics::default()),
            sink: Arc::new(CollectingSink::new()),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    // Test Settings: a 5-row table with a 100ms delay injected per batch.
    // Scenario: `start` kicks off a full load, the caller cancels it almost immediately
    // with `stop`.
    // Expected Outcome: the controller reports `Stopped` without blocking, and the
    // in-flight worker actually exits instead of continuing to write rows after the
    // cancellation lands.
    #[traced_test]
    #[tokio::test]
    async fn tc07_stop_during_full_load_halts_the_worker() {
        let mut tables = HashMap::new();
        tables.insert(
            "big".to_string(),
            TableFixture::new(id_name_columns(), (0..5).map(|i| id_name_row(i, "row")).collect()),
        );
        let source = InMemorySource::new(tables).with_read_delay(Duration::from_millis(100));
        let destination = Arc::new(InMemoryDestination::new());
        let mut task = base_task("stop-me", &["big"], TransferMode::FullLoad);
        task.batch_policy.batch_rows = 1;

        let controller = LifecycleController::new(4);
        controller.register(
            "stop-me",
            runtime(source, Box::new(SharedDestination(destination.clone())), task),
        );

        controller.start("stop-me").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.stop("stop-me").await.unwrap();
        assert_eq!(controller.status("stop-me").unwrap(), TaskStatus::Stopped);

        tokio::time::sleep(Duration::from_millis(250)).await;
        let rows_after_first_settle = destination.row_count("big");
        assert!(rows_after_first_settle < 5, "cancellation should have cut the run short");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            destination.row_count("big"),
            rows_after_first_settle,
            "worker must stop writing once cancelled, not merely report Stopped"
        );
    }

    // Test Settings: a task already running.
    // Scenario: `start` is called a second time before the first run finishes.
    // Expected Outcome: the second call is rejected as `AlreadyRunning` rather than
    // launching a duplicate run.
    #[traced_test]
    #[tokio::test]
    async fn tc08_start_is_not_idempotent_while_running() {
        let mut tables = HashMap::new();
        tables.insert(
            "slow".to_string(),
            TableFixture::new(id_name_columns(), vec![id_name_row(1, "a")]),
        );
        let source = InMemorySource::new(tables).with_read_delay(Duration::from_millis(200));
        let destination: Box<dyn DestinationAdapter> = Box::new(InMemoryDestination::new());
        let task = base_task("idem", &["slow"], TransferMode::FullLoad);

        let controller = LifecycleController::new(4);
        controller.register("idem", runtime(source, destination, task));

        controller.start("idem").await.unwrap();
        let second = controller.start("idem").await;
        assert!(matches!(second, Err(ControllerError::AlreadyRunning { .. })));
    }

    // Test Settings: a continuous CDC task.
    // Scenario: the task is started, paused mid-flight, then resumed.
    // Expected Outcome: status moves Running -> Paused -> Running, and resuming does not
    // require re-registering the task.
    #[traced_test]
    #[tokio::test]
    async fn tc09_pause_then_resume_returns_to_running() {
        let mut tables = HashMap::new();
        tables.insert("events".to_string(), TableFixture::new(id_name_columns(), vec![]));
        let source = InMemorySource::new(tables).with_cdc_enabled("events");
        let destination: Box<dyn DestinationAdapter> = Box::new(InMemoryDestination::new());
        let mut task = base_task("pausable", &["events"], TransferMode::Cdc);
        task.schedule = Schedule::Interval { seconds: 3600 };

        let controller = LifecycleController::new(4);
        controller.register("pausable", runtime(source, destination, task));

        controller.start("pausable").await.unwrap();
        assert_eq!(controller.status("pausable").unwrap(), TaskStatus::Running);

        controller.pause("pausable").await.unwrap();
        assert_eq!(controller.status("pausable").unwrap(), TaskStatus::Paused);

        controller.resume("pausable").await.unwrap();
        assert_eq!(controller.status("pausable").unwrap(), TaskStatus::Running);
    }

    // Test Settings: a task that has never been started.
    // Scenario: `pause` is called on a task still in `Created`.
    // Expected Outcome: the call is rejected as an invalid transition.
    #[traced_test]
    #[tokio::test]
    async fn tc10_pause_before_start_is_rejected() {
        let tables = HashMap::new();
        let source = InMemorySource::new(tables);
        let destination: Box<dyn DestinationAdapter> = Box::new(InMemoryDestination::new());
        let task = base_task("never-started", &[], TransferMode::FullLoad);

        let controller = LifecycleController::new(4);
        controller.register("never-started", runtime(source, destination, task));

        let result = controller.pause("never-started").await;
        assert!(matches!(result, Err(ControllerError::InvalidTransition { .. })));
    }
}
