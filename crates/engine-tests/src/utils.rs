#![allow(dead_code)]

use model::batch::{ColumnSpec, DataType};
use model::connector::{Connector, ConnectorConfig, ConnectorVariant, DestinationVariant, SourceVariant};
use model::task::{
    BatchPolicy, DestinationOptions, FileFormat, RetryPolicy, Schedule, Task, TaskStatus,
    TransferMode,
};
use model::value::Value;
use std::collections::HashMap;

/// A small two-column (`id`, `name`) schema shared by most fixtures.
pub fn id_name_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("id", DataType::Int).primary_key(),
        ColumnSpec::new("name", DataType::Text),
    ]
}

pub fn id_name_row(id: i64, name: &str) -> Vec<Value> {
    vec![Value::Int(id), Value::String(name.to_string())]
}

/// Builds a `Task` with sane defaults for tests, overridable through the
/// fields callers care about.
pub fn base_task(id: &str, tables: &[&str], mode: TransferMode) -> Task {
    Task {
        id: id.to_string(),
        name: format!("{id}-task"),
        source_connector: "source".to_string(),
        destination_connector: "destination".to_string(),
        source_tables: tables.iter().map(|t| t.to_string()).collect(),
        table_overrides: HashMap::new(),
        mode,
        batch_policy: BatchPolicy {
            batch_rows: 10,
            batch_size_mb: None,
        },
        schedule: Schedule::OnDemand,
        destination_options: DestinationOptions {
            file_format: FileFormat::Csv,
            table_name_map: HashMap::new(),
        },
        retry_policy: RetryPolicy {
            retry_enabled: true,
            max_retries: 2,
            retry_delay_seconds: 0,
            cleanup_on_retry: true,
        },
        parallel_tables: 1,
        handle_schema_drift: true,
        status: TaskStatus::Created,
        current_progress_percent: 0.0,
        last_run_at: None,
        cdc_state: HashMap::new(),
        full_load_completed_tables: HashMap::new(),
    }
}

/// A `Connector` with sane defaults for tests, distinguished only by
/// name/variant; fields like `path_template` default to `None` and are
/// set by callers that need one.
pub fn base_connector(name: &str, variant: ConnectorVariant) -> Connector {
    Connector {
        name: name.to_string(),
        variant,
        config: ConnectorConfig::default(),
        last_tested_at: None,
    }
}

pub fn base_source_connector(name: &str) -> Connector {
    base_connector(name, ConnectorVariant::Source(SourceVariant::PostgreSql))
}

pub fn base_destination_connector(name: &str) -> Connector {
    base_connector(name, ConnectorVariant::Destination(DestinationVariant::S3ObjectStore))
}
