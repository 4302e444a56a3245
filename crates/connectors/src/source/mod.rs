mod mysql;
mod oracle;
mod postgres;
mod sql_server;

pub use mysql::MySqlSource;
pub use oracle::OracleSource;
pub use postgres::PostgresSource;
pub use sql_server::SqlServerSource;

use crate::error::AdapterError;
use async_trait::async_trait;
use model::batch::{ColumnSpec, RowBatch};
use model::connector::Connector;

/// A single table's column inventory, as reported by `SourceAdapter::columns`.
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub approx_row_count: Option<u64>,
    pub cdc_enabled: bool,
}

/// Cursor state returned from a CDC read, opaque to everything but the
/// adapter that produced it.
#[derive(Debug, Clone)]
pub struct CdcBatch {
    pub batch: RowBatch,
    pub next_cursor: Option<String>,
}

/// Uniform contract every source variant implements. `connect` and
/// `disconnect` are idempotent; callers wrap `connect` in `ConnectBackoff`.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn connect(&mut self, connector: &Connector) -> Result<(), AdapterError>;
    async fn disconnect(&mut self) -> Result<(), AdapterError>;

    async fn list_tables(&self) -> Result<Vec<TableInfo>, AdapterError>;
    async fn columns(&self, table: &str) -> Result<Vec<ColumnSpec>, AdapterError>;
    async fn row_count(&self, table: &str) -> Result<u64, AdapterError>;

    /// Reads one page of rows ordered by the table's natural key so that
    /// repeated calls with an advancing `offset` never skip or repeat a
    /// row.
    async fn read_batch(
        &self,
        table: &str,
        offset: u64,
        limit: u64,
    ) -> Result<RowBatch, AdapterError>;

    /// Queries real server/table state; never a cached flag, so it reflects
    /// `enable_cdc` calls made by other processes too.
    async fn cdc_enabled(&self, table: &str) -> bool;
    async fn enable_cdc(&self, table: &str) -> Result<(), AdapterError>;

    /// Runs a query built with dialect-specific positional placeholders
    /// and returns the first column of its first row, if any. Backs
    /// db_query/raw_query global variables, which read one scalar value
    /// off the active source connection; `params` are bound by position,
    /// never interpolated into `query`.
    async fn execute_scalar_query(
        &self,
        query: &str,
        params: &[String],
    ) -> Result<Option<String>, AdapterError>;

    /// Reads changes since `cursor` (`None` means "from the beginning of
    /// retained history"). Returns `None` cursor in the result when there
    /// is nothing further to read yet.
    async fn read_cdc(&self, table: &str, cursor: Option<&str>) -> Result<CdcBatch, AdapterError>;
}
