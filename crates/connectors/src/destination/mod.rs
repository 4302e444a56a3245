mod s3;
mod snowflake;

pub use s3::S3Destination;
pub use snowflake::SnowflakeDestination;

use crate::error::AdapterError;
use async_trait::async_trait;
use model::batch::{ColumnSpec, RowBatch};
use model::connector::Connector;
use model::task::FileFormat;

/// A write's outcome, reported back up to the table pipeline for progress
/// accounting.
#[derive(Debug, Clone, Default)]
pub struct WriteResult {
    pub rows_written: u64,
    pub bytes_written: u64,
}

/// Per-write knobs threaded down from the task's `destination_options`
/// and the current execution's identity, used to build the object key or
/// target table name. `resolved_path`, when present, is the destination
/// connector's path template with every `$variable` already substituted
/// by the caller's `VariableResolver` — this module only applies the
/// extension and default-filename rules on top of it.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub file_format: FileFormat,
    pub target_table_name: String,
    pub overwrite: bool,
    pub resolved_path: Option<String>,
    pub run_id: String,
    pub batch_index: u64,
}

/// Uniform contract every destination variant implements.
#[async_trait]
pub trait DestinationAdapter: Send + Sync {
    async fn connect(&mut self, connector: &Connector) -> Result<(), AdapterError>;
    async fn disconnect(&mut self) -> Result<(), AdapterError>;

    async fn table_exists(&self, table: &str) -> Result<bool, AdapterError>;
    async fn create_table(&self, table: &str, columns: &[ColumnSpec]) -> Result<(), AdapterError>;
    async fn schema_of(&self, table: &str) -> Result<Vec<ColumnSpec>, AdapterError>;

    /// Adds whatever columns `incoming` has that `schema_of` does not
    ///.
    async fn apply_schema_drift(
        &self,
        table: &str,
        incoming: &[ColumnSpec],
    ) -> Result<Vec<ColumnSpec>, AdapterError>;

    async fn write(&self, batch: &RowBatch, opts: &WriteOptions) -> Result<WriteResult, AdapterError>;

    /// Best-effort removal of a partially-written artifact after a failed
    /// or cancelled write. A no-op where the destination already commits
    /// atomically per invocation.
    async fn cleanup_partial(&self, opts: &WriteOptions) -> Result<(), AdapterError>;
}

const KNOWN_EXTENSIONS: &[&str] = &["parquet", "csv", "json", "txt", "avro", "orc"];

/// Turns `opts.resolved_path` (already variable-substituted) into a
/// concrete object key:
///
/// - a path ending in a recognised extension is kept verbatim;
/// - otherwise the file format's extension is appended;
/// - a path with no directory component (no `/` once the above is
///   decided) is treated as a bare base directory, and the key becomes
///   `{base}/data_{timestamp}.{ext}` for an append write or
///   `{base}/data.{ext}` for an overwrite.
///
/// Falls back to `{table}/{run_id}/batch-{batch}` as the base when no
/// template was configured.
pub fn resolve_object_key(opts: &WriteOptions) -> String {
    let ext = opts.file_format.extension();
    let base = opts.resolved_path.clone().unwrap_or_else(|| {
        format!("{}/{}/batch-{}", opts.target_table_name, opts.run_id, opts.batch_index)
    });

    let has_known_extension = KNOWN_EXTENSIONS
        .iter()
        .any(|known| base.to_ascii_lowercase().ends_with(&format!(".{known}")));
    if has_known_extension {
        return base;
    }

    if base.contains('/') {
        return format!("{base}.{ext}");
    }

    let filename = if opts.overwrite {
        format!("data.{ext}")
    } else {
        format!("data_{}.{ext}", chrono::Utc::now().format("%Y%m%d_%H%M%S"))
    };
    format!("{base}/{filename}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_opts() -> WriteOptions {
        WriteOptions {
            file_format: FileFormat::Parquet,
            target_table_name: "orders".to_string(),
            overwrite: false,
            resolved_path: None,
            run_id: "run-1".to_string(),
            batch_index: 3,
        }
    }

    #[test]
    fn resolves_default_base_with_extension() {
        let opts = base_opts();
        assert_eq!(resolve_object_key(&opts), "orders/run-1/batch-3.parquet");
    }

    #[test]
    fn keeps_recognised_extension_verbatim() {
        let opts = WriteOptions {
            resolved_path: Some("tenants/42/Orders/data.parquet".to_string()),
            ..base_opts()
        };
        assert_eq!(resolve_object_key(&opts), "tenants/42/Orders/data.parquet");
    }

    #[test]
    fn appends_extension_when_directory_component_present() {
        let opts = WriteOptions {
            file_format: FileFormat::Parquet,
            resolved_path: Some("tenants/42/Orders/data_20240301_120000".to_string()),
            ..base_opts()
        };
        assert_eq!(
            resolve_object_key(&opts),
            "tenants/42/Orders/data_20240301_120000.parquet"
        );
    }

    #[test]
    fn bare_name_overwrite_gets_default_filename() {
        let opts = WriteOptions {
            file_format: FileFormat::Csv,
            resolved_path: Some("Orders".to_string()),
            overwrite: true,
            ..base_opts()
        };
        assert_eq!(resolve_object_key(&opts), "Orders/data.csv");
    }

    #[test]
    fn bare_name_append_gets_timestamped_filename() {
        let opts = WriteOptions {
            file_format: FileFormat::Csv,
            resolved_path: Some("Orders".to_string()),
            overwrite: false,
            ..base_opts()
        };
        let key = resolve_object_key(&opts);
        assert!(key.starts_with("Orders/data_"));
        assert!(key.ends_with(".csv"));
    }
}
