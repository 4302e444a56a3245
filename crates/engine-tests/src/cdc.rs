#[cfg(test)]
mod tests {
    use crate::mocks::{
        CollectingSink, FixedVariableStore, InMemoryDestination, InMemorySource, InMemoryStateStore, TableFixture,
    };
    use crate::utils::{base_destination_connector, base_source_connector, base_task, id_name_columns, id_name_row};
    use engine_core::state::CheckpointStage;
    use engine_core::{Metrics, StateStore};
    use model::execution::TableStatus;
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

    // Test Settings: CDC round with no queued changes.
    // Scenario: the source reports no changes since the last cursor.
    // Expected Outcome: the round reports nothing happened and no batch-committed event fires.
    #[traced_test]
    #[tokio::test]
    async fn tc04_cdc_round_with_no_changes_is_a_no_op() {
        let mut tables = HashMap::new();
        tables.insert("customers".to_string(), TableFixture::new(id_name_columns(), vec![]));
        let source = InMemorySource::new(tables).with_cdc_enabled("customers");
        let destination = InMemoryDestination::new();
        let store = FixedVariableStore::new();
        let resolver = VariableResolver::new(&store);
        let state: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let sink = Arc::new(CollectingSink::new());

        let task = base_task("t4", &["customers"], TransferMode::Cdc);
        let source_connector = base_source_connector("source");
        let destination_connector = base_destination_connector("destination");
        let exec = executor(&source, &destination, &source_connector, &destination_connector, &resolver, state, sink.clone());
        let outcome = exec.run_cdc_round(&task, "exec-4").await;

        assert_eq!(outcome.succeeded, vec!["customers".to_string()]);
        assert_eq!(destination.row_count("customers"), 0);
        assert!(sink.batches.lock().unwrap().is_empty());
    }

    // Test Settings: full_load_then_cdc, one table already marked complete.
    // Scenario: "customers" has a `full_load_completed_tables` entry from a previous run,
    // "orders" does not.
    // Expected Outcome: the full-load pass only touches "orders"; "customers" is left alone.
    #[traced_test]
    #[tokio::test]
    async fn tc05_full_load_then_cdc_skips_already_completed_tables() {
        let mut tables = HashMap::new();
        tables.insert(
            "customers".to_string(),
            TableFixture::new(id_name_columns(), vec![id_name_row(1, "Ada")]),
        );
        tables.insert(
            "orders".to_string(),
            TableFixture::new(id_name_columns(), vec![id_name_row(10, "widget")]),
        );
        let source = InMemorySource::new(tables);
        let destination = InMemoryDestination::new();
        let store = FixedVariableStore::new();
        let resolver = VariableResolver::new(&store);
        let state: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let sink = Arc::new(CollectingSink::new());

        let mut task = base_task("t5", &["customers", "orders"], TransferMode::FullLoadThenCdc);
        task.full_load_completed_tables
            .insert("customers".to_string(), chrono::Utc::now());
        let source_connector = base_source_connector("source");
        let destination_connector = base_destination_connector("destination");
        let exec = executor(&source, &destination, &source_connector, &destination_connector, &resolver, state, sink);
        let outcome = exec.run_full_load(&task, "exec-5").await;

        assert_eq!(outcome.succeeded, vec!["orders".to_string()]);
        assert_eq!(destination.row_count("customers"), 0);
        assert_eq!(destination.row_count("orders"), 1);
    }

    // Test Settings: two consecutive CDC rounds against the same state store.
    // Scenario: the first round reads one queued change and advances the cursor; the second
    // round has nothing new queued.
    // Expected Outcome: the cursor persisted after round one is strictly newer than before it,
    // and round two does not re-deliver the already-consumed row.
    #[traced_test]
    #[tokio::test]
    async fn tc06_cdc_cursor_advances_and_is_not_replayed() {
        let mut tables = HashMap::new();
        tables.insert("events".to_string(), TableFixture::new(id_name_columns(), vec![]));
        let source = InMemorySource::new(tables).with_cdc_enabled("events");
        source.push_cdc_change("events", id_name_row(1, "first"));
        let destination = InMemoryDestination::new();
        let store = FixedVariableStore::new();
        let resolver = VariableResolver::new(&store);
        let state = Arc::new(InMemoryStateStore::new());
        let sink = Arc::new(CollectingSink::new());

        let task = base_task("t6", &["events"], TransferMode::Cdc);
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

        let first = exec.run_cdc_round(&task, "exec-6").await;
        assert_eq!(first.succeeded, vec!["events".to_string()]);
        assert_eq!(destination.row_count("events"), 1);

        let checkpoint_after_first = state
            .load_checkpoint("exec-6", "events")
            .await
            .unwrap()
            .expect("checkpoint saved after first round");
        assert!(checkpoint_after_first.last_cdc_cursor.is_some());
        assert_eq!(checkpoint_after_first.stage, CheckpointStage::Committed);

        let second = exec.run_cdc_round(&task, "exec-6").await;
        assert_eq!(second.succeeded, vec!["events".to_string()]);
        assert_eq!(destination.row_count("events"), 1, "second round must not redeliver the row");

        let checkpoint_after_second = state.load_checkpoint("exec-6", "events").await.unwrap().unwrap();
        assert_eq!(
            checkpoint_after_second.last_cdc_cursor,
            checkpoint_after_first.last_cdc_cursor,
            "cursor is stable once there is nothing new to read"
        );
    }

    // Test Settings: one CDC round with one queued change.
    // Scenario: a single row is delivered and written.
    // Expected Outcome: the table execution recorded for that round is `Success` with
    // `processed_rows` matching the row written, no `retry_count` tracking involved.
    #[traced_test]
    #[tokio::test]
    async fn tc09_cdc_round_records_table_execution() {
        let mut tables = HashMap::new();
        tables.insert("events".to_string(), TableFixture::new(id_name_columns(), vec![]));
        let source = InMemorySource::new(tables).with_cdc_enabled("events");
        source.push_cdc_change("events", id_name_row(1, "first"));
        let destination = InMemoryDestination::new();
        let store = FixedVariableStore::new();
        let resolver = VariableResolver::new(&store);
        let state = Arc::new(InMemoryStateStore::new());
        let sink = Arc::new(CollectingSink::new());

        let task = base_task("t7", &["events"], TransferMode::Cdc);
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

        let outcome = exec.run_cdc_round(&task, "exec-7").await;
        assert_eq!(outcome.succeeded, vec!["events".to_string()]);

        let table_execution = state
            .load_table_execution("exec-7", "events")
            .await
            .unwrap()
            .expect("table execution recorded for the CDC round");
        assert_eq!(table_execution.status, TableStatus::Success);
        assert_eq!(table_execution.processed_rows, 1);
    }
}
