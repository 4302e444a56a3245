use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransferMode {
    FullLoad,
    Cdc,
    FullLoadThenCdc,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Schedule {
    OnDemand,
    Continuous,
    Interval { seconds: u64 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FileFormat {
    Parquet,
    Csv,
    JsonLines,
}

impl FileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Parquet => "parquet",
            FileFormat::Csv => "csv",
            FileFormat::JsonLines => "json",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchPolicy {
    pub batch_rows: usize,
    pub batch_size_mb: Option<f64>,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        BatchPolicy {
            batch_rows: 1000,
            batch_size_mb: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_enabled: bool,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub cleanup_on_retry: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            retry_enabled: true,
            max_retries: 3,
            retry_delay_seconds: 5,
            cleanup_on_retry: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskStatus {
    Created,
    Running,
    Paused,
    Completed,
    Failed,
    Stopped,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TableOverride {
    pub enabled: bool,
    pub transformations: Vec<crate::transform::TransformSpec>,
}

impl TableOverride {
    pub fn enabled(transformations: Vec<crate::transform::TransformSpec>) -> Self {
        TableOverride {
            enabled: true,
            transformations,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DestinationOptions {
    pub file_format: FileFormat,
    pub table_name_map: HashMap<String, String>,
}

impl Default for DestinationOptions {
    fn default() -> Self {
        DestinationOptions {
            file_format: FileFormat::Parquet,
            table_name_map: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CdcTableState {
    pub enabled: Option<bool>,
    pub last_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub source_connector: String,
    pub destination_connector: String,
    pub source_tables: Vec<String>,
    pub table_overrides: HashMap<String, TableOverride>,
    pub mode: TransferMode,
    pub batch_policy: BatchPolicy,
    pub schedule: Schedule,
    pub destination_options: DestinationOptions,
    pub retry_policy: RetryPolicy,
    pub parallel_tables: usize,
    pub handle_schema_drift: bool,

    pub status: TaskStatus,
    pub current_progress_percent: f64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub cdc_state: HashMap<String, CdcTableState>,
    pub full_load_completed_tables: HashMap<String, DateTime<Utc>>,
}

impl Task {
    /// Removing a table clears its accrued CDC/full-load bookkeeping.
    pub fn remove_table(&mut self, table: &str) {
        self.source_tables.retain(|t| t != table);
        self.table_overrides.remove(table);
        self.cdc_state.remove(table);
        self.full_load_completed_tables.remove(table);
    }

    pub fn is_table_enabled(&self, table: &str) -> bool {
        self.table_overrides
            .get(table)
            .map(|o| o.enabled)
            .unwrap_or(true)
    }

    pub fn table_transformations(&self, table: &str) -> &[crate::transform::TransformSpec] {
        self.table_overrides
            .get(table)
            .map(|o| o.transformations.as_slice())
            .unwrap_or(&[])
    }

    pub fn needs_full_load(&self) -> Vec<String> {
        self.source_tables
            .iter()
            .filter(|t| !self.full_load_completed_tables.contains_key(*t))
            .cloned()
            .collect()
    }
}
