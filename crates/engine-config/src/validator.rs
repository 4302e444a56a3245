use crate::error::ConfigError;
use crate::report::ValidationReport;
use crate::validated::ValidatedTask;
use connectors::variant_matches_kind;
use model::connector::{Connector, ConnectorKind};
use model::task::{Schedule, Task};
use std::collections::HashSet;
use tracing::warn;

/// Converts a raw `Task` plus its two connectors into a `ValidatedTask`,
/// rejecting structurally invalid configuration up front rather than
/// letting it surface as a runtime failure partway through a run.
pub struct TaskValidator;

impl TaskValidator {
    pub fn validate(
        task: &Task,
        source_connector: &Connector,
        destination_connector: &Connector,
    ) -> Result<(ValidatedTask, ValidationReport), ConfigError> {
        if task.parallel_tables == 0 {
            return Err(ConfigError::ParallelTablesZero);
        }
        if task.batch_policy.batch_rows == 0 {
            return Err(ConfigError::BatchRowsZero);
        }
        if let Schedule::Interval { seconds: 0 } = task.schedule {
            return Err(ConfigError::ScheduleIntervalZero);
        }

        let mut seen = HashSet::new();
        for table in &task.source_tables {
            if !seen.insert(table) {
                return Err(ConfigError::DuplicateSourceTable(table.clone()));
            }
        }

        require_kind(source_connector, ConnectorKind::Source, true)?;
        require_kind(destination_connector, ConnectorKind::Destination, false)?;

        // retry_enabled == false with max_retries > 0 is a normalised no-op
        // (engine_core::RetryPolicy::from_task_policy collapses it to one
        // attempt), not a rejection.

        let mut report = ValidationReport::default();
        let table_set: HashSet<&String> = task.source_tables.iter().collect();
        for overridden_table in task.table_overrides.keys() {
            if !table_set.contains(overridden_table) {
                let message = format!(
                    "table override references '{overridden_table}', which is not in source_tables"
                );
                warn!("{message}");
                report.warnings.push(message);
            }
        }

        let validated = ValidatedTask {
            task: task.clone(),
            source_connector: source_connector.clone(),
            destination_connector: destination_connector.clone(),
        };
        Ok((validated, report))
    }
}

fn require_kind(
    connector: &Connector,
    expected: ConnectorKind,
    expect_source: bool,
) -> Result<(), ConfigError> {
    if !variant_matches_kind(&connector.variant, expect_source) {
        return Err(ConfigError::ConnectorKindMismatch {
            name: connector.name.clone(),
            expected,
            actual: connector.kind(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::connector::{ConnectorConfig, ConnectorVariant, DestinationVariant, SourceVariant};
    use model::task::{
        BatchPolicy, DestinationOptions, RetryPolicy, TableOverride, TaskStatus, TransferMode,
    };
    use std::collections::HashMap;

    fn source() -> Connector {
        Connector {
            name: "src".into(),
            variant: ConnectorVariant::Source(SourceVariant::PostgreSql),
            config: ConnectorConfig::default(),
            last_tested_at: None,
        }
    }

    fn destination() -> Connector {
        Connector {
            name: "dst".into(),
            variant: ConnectorVariant::Destination(DestinationVariant::S3ObjectStore),
            config: ConnectorConfig::default(),
            last_tested_at: None,
        }
    }

    fn base_task() -> Task {
        Task {
            id: "t1".into(),
            name: "task".into(),
            source_connector: "src".into(),
            destination_connector: "dst".into(),
            source_tables: vec!["customers".into()],
            table_overrides: HashMap::new(),
            mode: TransferMode::FullLoad,
            batch_policy: BatchPolicy::default(),
            schedule: Schedule::OnDemand,
            destination_options: DestinationOptions::default(),
            retry_policy: RetryPolicy::default(),
            parallel_tables: 2,
            handle_schema_drift: true,
            status: TaskStatus::Created,
            current_progress_percent: 0.0,
            last_run_at: None,
            cdc_state: HashMap::new(),
            full_load_completed_tables: HashMap::new(),
        }
    }

    #[test]
    fn rejects_zero_parallel_tables() {
        let mut task = base_task();
        task.parallel_tables = 0;
        let err = TaskValidator::validate(&task, &source(), &destination()).unwrap_err();
        assert!(matches!(err, ConfigError::ParallelTablesZero));
    }

    #[test]
    fn rejects_duplicate_source_tables() {
        let mut task = base_task();
        task.source_tables.push("customers".into());
        let err = TaskValidator::validate(&task, &source(), &destination()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSourceTable(_)));
    }

    #[test]
    fn rejects_zero_length_interval_schedule() {
        let mut task = base_task();
        task.schedule = Schedule::Interval { seconds: 0 };
        let err = TaskValidator::validate(&task, &source(), &destination()).unwrap_err();
        assert!(matches!(err, ConfigError::ScheduleIntervalZero));
    }

    #[test]
    fn rejects_swapped_connector_kinds() {
        let task = base_task();
        let err = TaskValidator::validate(&task, &destination(), &source()).unwrap_err();
        assert!(matches!(err, ConfigError::ConnectorKindMismatch { .. }));
    }

    #[test]
    fn disabled_retry_with_nonzero_max_retries_is_accepted() {
        let mut task = base_task();
        task.retry_policy.retry_enabled = false;
        task.retry_policy.max_retries = 5;
        assert!(TaskValidator::validate(&task, &source(), &destination()).is_ok());
    }

    #[test]
    fn stray_table_override_produces_a_warning_not_a_rejection() {
        let mut task = base_task();
        task.table_overrides
            .insert("orders".into(), TableOverride::enabled(Vec::new()));
        let (_, report) = TaskValidator::validate(&task, &source(), &destination()).unwrap();
        assert_eq!(report.warnings.len(), 1);
    }
}
