use crate::table_pipeline::TablePipeline;
use chrono::Utc;
use connectors::destination::DestinationAdapter;
use connectors::source::SourceAdapter;
use engine_core::{Metrics, PipelineError, ProgressSink, RetryPolicy, StateStore};
use model::connector::Connector;
use model::execution::{ExecutionStatus, ExecutionType, TaskExecution};
use model::task::{Task, TransferMode};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use variables::VariableResolver;

/// Outcome of running every table named in a task's `source_tables`
/// through one invocation of `run_task`.
#[derive(Debug, Default)]
pub struct TaskRunOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Runs a task's tables against a source/destination pair, bounded by
/// `task.parallel_tables` concurrent workers. CDC
/// polling for `FullLoadThenCdc`/`Cdc` tasks is driven by the lifecycle
/// controller re-invoking `run_cdc_round` on the configured schedule,
/// not by this function looping internally.
pub struct TaskExecutor<'a> {
    pub source: &'a dyn SourceAdapter,
    pub destination: &'a dyn DestinationAdapter,
    pub source_connector: &'a Connector,
    pub destination_connector: &'a Connector,
    pub resolver: &'a VariableResolver<'a>,
    pub state: Arc<dyn StateStore>,
    pub metrics: Arc<Metrics>,
    pub sink: Arc<dyn ProgressSink>,
    pub cancel: CancellationToken,
}

/// Builds the tier-2 context `VariableResolver::resolve_template` checks
/// before falling through to inline/global variables: task identity, the
/// connectors involved, and (once a table is known) its name. Lookups
/// against this map are case-insensitive, so the casing used here is
/// just the canonical one shown in docs/examples.
fn base_context(task: &Task, source: &Connector, destination: &Connector) -> HashMap<String, String> {
    let mut context = HashMap::new();
    context.insert("taskName".to_string(), task.name.clone());
    context.insert("taskId".to_string(), task.id.clone());
    context.insert("connectorName".to_string(), destination.name.clone());
    if let Some(database) = &source.config.database {
        context.insert("sourceDatabaseName".to_string(), database.clone());
    }
    if let Some(host) = &destination.config.host {
        context.insert("server".to_string(), host.clone());
        context.insert("serverName".to_string(), host.clone());
    }
    if let Some(port) = destination.config.port {
        context.insert("port".to_string(), port.to_string());
    }
    context
}

impl<'a> TaskExecutor<'a> {
    pub async fn run_full_load(&self, task: &Task, execution_id: &str) -> TaskRunOutcome {
        let tables = task.needs_full_load();
        self.run_tables(task, execution_id, &tables, TransferMode::FullLoad)
            .await
    }

    pub async fn run_cdc_round(&self, task: &Task, execution_id: &str) -> TaskRunOutcome {
        let tables: Vec<String> = task.source_tables.clone();
        self.run_tables(task, execution_id, &tables, TransferMode::Cdc)
            .await
    }

    async fn run_tables(
        &self,
        task: &Task,
        execution_id: &str,
        tables: &[String],
        mode: TransferMode,
    ) -> TaskRunOutcome {
        let execution_type = match mode {
            TransferMode::FullLoad => ExecutionType::FullLoad,
            TransferMode::Cdc => ExecutionType::CdcSync,
            TransferMode::FullLoadThenCdc => ExecutionType::FullLoadThenCdc,
        };
        let mut task_execution = TaskExecution::new(execution_id.to_string(), task.id.clone(), execution_type);
        task_execution.status = ExecutionStatus::Running;
        if let Err(err) = self.state.save_task_execution(&task_execution).await {
            error!(task_id = %task.id, error = %err, "failed to record task execution start");
        }

        let enabled: Vec<String> = tables
            .iter()
            .filter(|table| task.is_table_enabled(table))
            .cloned()
            .collect();
        let permits = task.parallel_tables.max(1);
        let retry_policy = RetryPolicy::from_task_policy(&task.retry_policy);
        let cleanup_on_retry = task.retry_policy.cleanup_on_retry;
        let path_template = self.destination_connector.config.path_template.clone();
        let base_context = base_context(task, self.source_connector, self.destination_connector);

        // A child of the task's own cancellation token: cancelling it stops
        // sibling table workers the moment one of them hits a fatal error,
        // without marking the task itself as user-stopped (`self.cancel`
        // stays untouched, so `controller.stop` and `TaskStatus::Stopped`
        // keep meaning what they already mean).
        let fatal_stop = self.cancel.child_token();

        let outcome = if permits <= 1 {
            self.run_tables_sequential(
                task,
                execution_id,
                &enabled,
                mode,
                &retry_policy,
                cleanup_on_retry,
                &path_template,
                &base_context,
                &fatal_stop,
            )
            .await
        } else {
            self.run_tables_concurrent(
                task,
                execution_id,
                &enabled,
                mode,
                permits,
                &retry_policy,
                cleanup_on_retry,
                &path_template,
                &base_context,
                &fatal_stop,
            )
            .await
        };

        task_execution.status = Self::aggregate_status(&outcome);
        task_execution.ended_at = Some(Utc::now());
        task_execution.counters = self.aggregate_counters(execution_id, &enabled).await;
        if !outcome.failed.is_empty() {
            let (table, message) = &outcome.failed[0];
            task_execution.error_message = Some(format!("{table}: {message}"));
        }
        if let Err(err) = self.state.save_task_execution(&task_execution).await {
            error!(task_id = %task.id, error = %err, "failed to record task execution outcome");
        }

        outcome
    }

    /// Sums every table's own `TableExecution` counters into one
    /// task-level snapshot, rather than tracking row totals separately
    /// as tables run — the per-table records are already the
    /// authoritative source `status` reads back.
    async fn aggregate_counters(&self, execution_id: &str, tables: &[String]) -> model::execution::ExecutionCounters {
        let mut counters = model::execution::ExecutionCounters::default();
        for table in tables {
            if let Ok(Some(execution)) = self.state.load_table_execution(execution_id, table).await {
                counters.total_rows += execution.total_rows;
                counters.processed_rows += execution.processed_rows;
                counters.failed_rows += execution.failed_rows;
            }
        }
        counters
    }

    /// `succeeded`/`failed` after every table has run: all tables
    /// succeeding is `Success`, a single table failing with every other
    /// table stopped before it started is `Stopped` (the underlying
    /// `PipelineError::Cancelled` carries that meaning), and any other mix
    /// is `Failed` if nothing succeeded or `PartialSuccess` otherwise.
    fn aggregate_status(outcome: &TaskRunOutcome) -> ExecutionStatus {
        if outcome.failed.is_empty() {
            return ExecutionStatus::Success;
        }
        let all_cancelled = outcome.failed.iter().all(|(_, message)| message == "cancelled");
        if all_cancelled && outcome.succeeded.is_empty() {
            return ExecutionStatus::Stopped;
        }
        if outcome.succeeded.is_empty() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::PartialSuccess
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_tables_concurrent(
        &self,
        task: &Task,
        execution_id: &str,
        enabled: &[String],
        mode: TransferMode,
        permits: usize,
        retry_policy: &RetryPolicy,
        cleanup_on_retry: bool,
        path_template: &Option<String>,
        base_context: &HashMap<String, String>,
        fatal_stop: &CancellationToken,
    ) -> TaskRunOutcome {
        let retry_policy = *retry_policy;
        let path_template = path_template.clone();
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut handles = Vec::new();
        for table in enabled {
            let semaphore = semaphore.clone();
            let table = table.clone();
            let execution_id = execution_id.to_string();
            let cancel = fatal_stop.clone();
            let retry_policy = retry_policy;
            let cleanup_on_retry = cleanup_on_retry;
            let path_template = path_template.clone();
            let mut context = base_context.clone();
            context.insert("tableName".to_string(), table.clone());
            context.insert("sourceTableName".to_string(), table.clone());

            // SAFETY/lifetime note: `source`/`destination`/`resolver` all
            // outlive the executor call because the caller holds them for
            // the duration of the task run; the worker future below is
            // awaited to completion before this function returns.
            let source = self.source;
            let destination = self.destination;
            let resolver = self.resolver;
            let state = self.state.clone();
            let metrics = self.metrics.clone();
            let sink = self.sink.clone();
            let overrides = task.table_overrides.get(&table).cloned();
            let batch_policy = task.batch_policy.clone();
            let destination_options = task.destination_options.clone();

            handles.push(async move {
                let _permit = semaphore.acquire().await.expect("semaphore not closed");
                if cancel.is_cancelled() {
                    return (table, Err("skipped after an earlier table failed".to_string()));
                }
                let target_table_name = destination_options
                    .table_name_map
                    .get(&table)
                    .cloned()
                    .unwrap_or_else(|| table.clone());
                let transforms = overrides.map(|o| o.transformations).unwrap_or_default();

                let result: Result<(), PipelineError> = async {
                    let pipeline = TablePipeline {
                        source,
                        destination,
                        table: &table,
                        target_table_name: &target_table_name,
                        transforms: &transforms,
                        resolver,
                        batch_policy: &batch_policy,
                        retry_policy: &retry_policy,
                        cleanup_on_retry,
                        file_format: destination_options.file_format,
                        path_template,
                        context,
                        state: state.as_ref(),
                        metrics: &metrics,
                        sink: sink.as_ref(),
                        execution_id: execution_id.clone(),
                        cancel: cancel.clone(),
                    };
                    match mode {
                        TransferMode::FullLoad => {
                            let total_rows = source.row_count(&table).await?;
                            pipeline.run_full_load(total_rows).await?;
                        }
                        TransferMode::Cdc | TransferMode::FullLoadThenCdc => {
                            pipeline.run_cdc_once().await?;
                        }
                    }
                    Ok(())
                }
                .await;

                match result {
                    Ok(()) => {
                        info!(table = %table, "table run succeeded");
                        (table, Ok(()))
                    }
                    Err(err) => {
                        error!(table = %table, error = %err, "table run failed");
                        if !matches!(err, PipelineError::Cancelled) {
                            cancel.cancel();
                        }
                        (table, Err(err.to_string()))
                    }
                }
            });
        }

        let results = futures::future::join_all(handles).await;
        let mut outcome = TaskRunOutcome::default();
        for (table, result) in results {
            match result {
                Ok(()) => outcome.succeeded.push(table),
                Err(message) => outcome.failed.push((table, message)),
            }
        }
        outcome
    }

    /// `task.parallel_tables <= 1`: runs tables one at a time in the order
    /// they're declared, building each table's pipeline only once the
    /// previous one has finished. Stops at the first failure instead of
    /// attempting the rest, and records the untried tables as failed too
    /// so callers can tell a skipped table apart from one that actually
    /// ran and succeeded.
    #[allow(clippy::too_many_arguments)]
    async fn run_tables_sequential(
        &self,
        task: &Task,
        execution_id: &str,
        tables: &[String],
        mode: TransferMode,
        retry_policy: &RetryPolicy,
        cleanup_on_retry: bool,
        path_template: &Option<String>,
        base_context: &HashMap<String, String>,
        fatal_stop: &CancellationToken,
    ) -> TaskRunOutcome {
        let mut outcome = TaskRunOutcome::default();
        let mut tables = tables.iter();

        for table in &mut tables {
            if fatal_stop.is_cancelled() {
                break;
            }

            let target_table_name = task
                .destination_options
                .table_name_map
                .get(table)
                .cloned()
                .unwrap_or_else(|| table.clone());
            let transforms = task
                .table_overrides
                .get(table)
                .cloned()
                .map(|o| o.transformations)
                .unwrap_or_default();
            let mut context = base_context.clone();
            context.insert("tableName".to_string(), table.clone());
            context.insert("sourceTableName".to_string(), table.clone());

            let result: Result<(), PipelineError> = async {
                let pipeline = TablePipeline {
                    source: self.source,
                    destination: self.destination,
                    table,
                    target_table_name: &target_table_name,
                    transforms: &transforms,
                    resolver: self.resolver,
                    batch_policy: &task.batch_policy,
                    retry_policy,
                    cleanup_on_retry,
                    file_format: task.destination_options.file_format,
                    path_template: path_template.clone(),
                    context,
                    state: self.state.as_ref(),
                    metrics: &self.metrics,
                    sink: self.sink.as_ref(),
                    execution_id: execution_id.to_string(),
                    cancel: fatal_stop.clone(),
                };
                match mode {
                    TransferMode::FullLoad => {
                        let total_rows = self.source.row_count(table).await?;
                        pipeline.run_full_load(total_rows).await?;
                    }
                    TransferMode::Cdc | TransferMode::FullLoadThenCdc => {
                        pipeline.run_cdc_once().await?;
                    }
                }
                Ok(())
            }
            .await;

            match result {
                Ok(()) => {
                    info!(table = %table, "table run succeeded");
                    outcome.succeeded.push(table.clone());
                }
                Err(err) => {
                    error!(table = %table, error = %err, "table run failed");
                    outcome.failed.push((table.clone(), err.to_string()));
                    if !matches!(err, PipelineError::Cancelled) {
                        fatal_stop.cancel();
                    }
                    break;
                }
            }
        }

        for skipped in tables {
            outcome
                .failed
                .push((skipped.clone(), "skipped after an earlier table failed".to_string()));
        }

        outcome
    }
}
