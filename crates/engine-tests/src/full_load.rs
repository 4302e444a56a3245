#[cfg(test)]
mod tests {
    use crate::mocks::{CollectingSink, FixedVariableStore, InMemoryDestination, InMemorySource, TableFixture};
    use crate::utils::{base_destination_connector, base_source_connector, base_task, id_name_columns, id_name_row};
    use engine_core::{Metrics, StateStore};
use model::execution::{ExecutionStatus, TableStatus};
    use engine_runtime::TaskExecutor;
    use model::connector::Connector;
    use model::task::TransferMode;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;
    use variables::VariableResolver;

    fn executor<'a>(
        source: &'a InMemorySource,
        destination: &'a InMemoryDestination,
        source_connector: &'a Connector,
        destination_connector: &'a Connector,
        resolver: &'a VariableResolver<'a>,
        state: Arc<dyn StateStore>,
        sink: Arc<CollectingSink>,
    ) -> TaskExecutor<'a> {
        TaskExecutor {
            source,
            destination,
            source_connector,
            destination_connector,
            resolver,
            state,
            metrics: Arc::new(Metrics::default()),
            sink,
            cancel: CancellationToken::new(),
        }
    }

    // Test Settings: two tables, parallel_tables = 1.
    // Scenario: a full load task names "customers" and "orders", both present at the source.
    // Expected Outcome: every row from both tables lands in the destination under its own name,
    // and the executor reports both tables as succeeded.
    #[traced_test]
    #[tokio::test]
    async fn tc01_full_load_two_tables_sequential() {
        let mut tables = HashMap::new();
        tables.insert(
            "customers".to_string(),
            TableFixture::new(id_name_columns(), vec![id_name_row(1, "Ada"), id_name_row(2, "Bo")]),
        );
        tables.insert(
            "orders".to_string(),
            TableFixture::new(id_name_columns(), vec![id_name_row(10, "widget")]),
        );
        let source = InMemorySource::new(tables);
        let destination = InMemoryDestination::new();
        let store = FixedVariableStore::new();
        let resolver = VariableResolver::new(&store);
        let state: Arc<dyn StateStore> = Arc::new(crate::mocks::InMemoryStateStore::new());
        let sink = Arc::new(CollectingSink::new());

        let task = base_task("t1", &["customers", "orders"], TransferMode::FullLoad);
        let source_connector = base_source_connector("source");
        let destination_connector = base_destination_connector("destination");
        let exec = executor(&source, &destination, &source_connector, &destination_connector, &resolver, state, sink.clone());
        let outcome = exec.run_full_load(&task, "exec-1").await;

        assert_eq!(outcome.succeeded.len(), 2);
        assert!(outcome.failed.is_empty());
        assert_eq!(destination.row_count("customers"), 2);
        assert_eq!(destination.row_count("orders"), 1);
        assert!(!sink.batches.lock().unwrap().is_empty());
    }

    // Test Settings: parallel_tables = 2, "flaky" table fails its first read.
    // Scenario: the source returns one transient error on "flaky" before serving data; the
    // task's retry policy allows 2 retries.
    // Expected Outcome: the retry absorbs the transient failure and the table still succeeds
    // with every row written.
    #[traced_test]
    #[tokio::test]
    async fn tc02_parallel_full_load_recovers_from_transient_failure() {
        let mut tables = HashMap::new();
        tables.insert(
            "steady".to_string(),
            TableFixture::new(id_name_columns(), vec![id_name_row(1, "Ada")]),
        );
        tables.insert(
            "flaky".to_string(),
            TableFixture::new(id_name_columns(), vec![id_name_row(2, "Bo"), id_name_row(3, "Cy")]),
        );
        let source = InMemorySource::new(tables).fail_next_reads(1);
        let destination = InMemoryDestination::new();
        let store = FixedVariableStore::new();
        let resolver = VariableResolver::new(&store);
        let state: Arc<dyn StateStore> = Arc::new(crate::mocks::InMemoryStateStore::new());
        let sink = Arc::new(CollectingSink::new());

        let mut task = base_task("t2", &["steady", "flaky"], TransferMode::FullLoad);
        task.parallel_tables = 2;
        let source_connector = base_source_connector("source");
        let destination_connector = base_destination_connector("destination");
        let exec = executor(&source, &destination, &source_connector, &destination_connector, &resolver, state, sink);
        let outcome = exec.run_full_load(&task, "exec-2").await;

        assert_eq!(outcome.succeeded.len(), 2, "failed: {:?}", outcome.failed);
        assert_eq!(destination.row_count("steady"), 1);
        assert_eq!(destination.row_count("flaky"), 2);
    }

    // Test Settings: source has no rows.
    // Scenario: a full load runs against an empty table.
    // Expected Outcome: the run succeeds with zero rows written and no batch-committed events.
    #[traced_test]
    #[tokio::test]
    async fn tc03_full_load_of_empty_table_succeeds_with_no_batches() {
        let mut tables = HashMap::new();
        tables.insert("empty".to_string(), TableFixture::new(id_name_columns(), vec![]));
        let source = InMemorySource::new(tables);
        let destination = InMemoryDestination::new();
        let store = FixedVariableStore::new();
        let resolver = VariableResolver::new(&store);
        let state: Arc<dyn StateStore> = Arc::new(crate::mocks::InMemoryStateStore::new());
        let sink = Arc::new(CollectingSink::new());

        let task = base_task("t3", &["empty"], TransferMode::FullLoad);
        let source_connector = base_source_connector("source");
        let destination_connector = base_destination_connector("destination");
        let exec = executor(&source, &destination, &source_connector, &destination_connector, &resolver, state, sink.clone());
        let outcome = exec.run_full_load(&task, "exec-3").await;

        assert_eq!(outcome.succeeded, vec!["empty".to_string()]);
        assert_eq!(destination.row_count("empty"), 0);
        assert!(sink.batches.lock().unwrap().is_empty());
    }

    // Test Settings: single table, loads cleanly.
    // Scenario: a plain full load of "customers" with no injected failures.
    // Expected Outcome: the state store holds a `Success` `TaskExecution` and a `Success`
    // `TableExecution` with `processed_rows` matching the row count written.
    #[traced_test]
    #[tokio::test]
    async fn tc07_successful_full_load_records_task_and_table_executions() {
        let mut tables = HashMap::new();
        tables.insert(
            "customers".to_string(),
            TableFixture::new(id_name_columns(), vec![id_name_row(1, "Ada"), id_name_row(2, "Bo")]),
        );
        let source = InMemorySource::new(tables);
        let destination = InMemoryDestination::new();
        let store = FixedVariableStore::new();
        let resolver = VariableResolver::new(&store);
        let state = Arc::new(crate::mocks::InMemoryStateStore::new());
        let sink = Arc::new(CollectingSink::new());

        let task = base_task("t7", &["customers"], TransferMode::FullLoad);
        let source_connector = base_source_connector("source");
        let destination_connector = base_destination_connector("destination");
        let exec = executor(
            &source,
            &destination,
            &source_connector,
            &destination_connector,
            &resolver,
            state.clone() as Arc<dyn StateStore>,
            sink,
        );
        let outcome = exec.run_full_load(&task, "exec-7").await;
        assert_eq!(outcome.succeeded, vec!["customers".to_string()]);

        let task_execution = state
            .load_task_execution("exec-7")
            .await
            .unwrap()
            .expect("task execution recorded");
        assert_eq!(task_execution.status, ExecutionStatus::Success);
        assert!(task_execution.ended_at.is_some());
        assert!(task_execution.error_message.is_none());

        let table_execution = state
            .load_table_execution("exec-7", "customers")
            .await
            .unwrap()
            .expect("table execution recorded");
        assert_eq!(table_execution.status, TableStatus::Success);
        assert_eq!(table_execution.processed_rows, 2);
        assert!(table_execution.completed_at.is_some());
    }

    // Test Settings: single table whose every read attempt fails, retries disabled.
    // Scenario: the source always returns a transient error; the task's retry policy allows
    // no extra attempts beyond the first.
    // Expected Outcome: both the task and table executions land as `Failed` with an error
    // message recorded.
    #[traced_test]
    #[tokio::test]
    async fn tc08_exhausted_full_load_records_failed_executions() {
        let mut tables = HashMap::new();
        tables.insert(
            "broken".to_string(),
            TableFixture::new(id_name_columns(), vec![id_name_row(1, "Ada")]),
        );
        let source = InMemorySource::new(tables).fail_next_reads(99);
        let destination = InMemoryDestination::new();
        let store = FixedVariableStore::new();
        let resolver = VariableResolver::new(&store);
        let state = Arc::new(crate::mocks::InMemoryStateStore::new());
        let sink = Arc::new(CollectingSink::new());

        let mut task = base_task("t8", &["broken"], TransferMode::FullLoad);
        task.retry_policy.max_retries = 0;
        let source_connector = base_source_connector("source");
        let destination_connector = base_destination_connector("destination");
        let exec = executor(
            &source,
            &destination,
            &source_connector,
            &destination_connector,
            &resolver,
            state.clone() as Arc<dyn StateStore>,
            sink,
        );
        let outcome = exec.run_full_load(&task, "exec-8").await;
        assert!(outcome.succeeded.is_empty());
        assert_eq!(outcome.failed.len(), 1);

        let task_execution = state
            .load_task_execution("exec-8")
            .await
            .unwrap()
            .expect("task execution recorded");
        assert_eq!(task_execution.status, ExecutionStatus::Failed);
        assert!(task_execution.error_message.is_some());

        let table_execution = state
            .load_table_execution("exec-8", "broken")
            .await
            .unwrap()
            .expect("table execution recorded");
        assert_eq!(table_execution.status, TableStatus::Failed);
        assert!(table_execution.error_message.is_some());
    }
}
