#![allow(dead_code)]

//! In-memory stand-ins for every adapter-facing trait, used in place of a
//! live database/object store so the integration tests in this crate run
//! without network access.

use async_trait::async_trait;
use connectors::destination::{DestinationAdapter, WriteOptions, WriteResult};
use connectors::error::AdapterError;
use connectors::source::{CdcBatch, SourceAdapter, TableInfo};
use engine_core::state::{Checkpoint, WalEntry};
use engine_core::{ProgressSink, StateStore};
use model::batch::{ColumnSpec, RowBatch};
use model::connector::Connector;
use model::execution::{TableExecution, TaskExecution};
use model::value::Value;
use model::variable::{GlobalVariable, GlobalVariableKind};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use variables::{GlobalVariableStore, ResolveError};

/// One table's fixture data: its schema plus every row, ordered the way a
/// real source would return them under an offset/limit page.
#[derive(Debug, Clone)]
pub struct TableFixture {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Vec<Value>>,
}

impl TableFixture {
    pub fn new(columns: Vec<ColumnSpec>, rows: Vec<Vec<Value>>) -> Self {
        TableFixture { columns, rows }
    }
}

/// A `SourceAdapter` backed by an in-memory table map, with an optional
/// per-table CDC queue and a configurable number of transient failures
/// before `read_batch` starts succeeding (used to exercise retry).
pub struct InMemorySource {
    tables: HashMap<String, TableFixture>,
    cdc_queues: Mutex<HashMap<String, Vec<(String, Vec<Value>)>>>,
    cdc_enabled: HashMap<String, bool>,
    fail_batches_remaining: AtomicU32,
    read_batch_calls: AtomicU32,
    read_delay: Option<std::time::Duration>,
}

impl InMemorySource {
    pub fn new(tables: HashMap<String, TableFixture>) -> Self {
        InMemorySource {
            tables,
            cdc_queues: Mutex::new(HashMap::new()),
            cdc_enabled: HashMap::new(),
            fail_batches_remaining: AtomicU32::new(0),
            read_batch_calls: AtomicU32::new(0),
            read_delay: None,
        }
    }

    /// `read_batch` returns a transient `AdapterError` this many times
    /// before serving real data, simulating a flaky connection.
    pub fn fail_next_reads(mut self, n: u32) -> Self {
        self.fail_batches_remaining = AtomicU32::new(n);
        self
    }

    /// Sleeps for `delay` before serving every `read_batch` call, giving a
    /// test the window it needs to cancel a run that is "in flight".
    pub fn with_read_delay(mut self, delay: std::time::Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn with_cdc_enabled(mut self, table: &str) -> Self {
        self.cdc_enabled.insert(table.to_string(), true);
        self
    }

    /// Queues changes a later `read_cdc` call will hand back once, keyed
    /// by the cursor that precedes them.
    pub fn push_cdc_change(&self, table: &str, row: Vec<Value>) {
        self.cdc_queues
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push((String::new(), row));
    }

    pub fn read_batch_call_count(&self) -> u32 {
        self.read_batch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for InMemorySource {
    async fn connect(&mut self, _connector: &Connector) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>, AdapterError> {
        Ok(self
            .tables
            .keys()
            .map(|name| TableInfo {
                schema: "public".to_string(),
                name: name.clone(),
                approx_row_count: self.tables.get(name).map(|t| t.rows.len() as u64),
                cdc_enabled: self.cdc_enabled.get(name).copied().unwrap_or(false),
            })
            .collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnSpec>, AdapterError> {
        self.tables
            .get(table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| AdapterError::ConfigInvalid(format!("unknown table {table}")))
    }

    async fn row_count(&self, table: &str) -> Result<u64, AdapterError> {
        self.tables
            .get(table)
            .map(|t| t.rows.len() as u64)
            .ok_or_else(|| AdapterError::ConfigInvalid(format!("unknown table {table}")))
    }

    async fn read_batch(
        &self,
        table: &str,
        offset: u64,
        limit: u64,
    ) -> Result<RowBatch, AdapterError> {
        self.read_batch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .fail_batches_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n > 0 { Some(n - 1) } else { None }
            })
            .is_ok()
        {
            return Err(AdapterError::Transient("simulated connection hiccup".to_string()));
        }

        let fixture = self
            .tables
            .get(table)
            .ok_or_else(|| AdapterError::ConfigInvalid(format!("unknown table {table}")))?;
        let start = offset as usize;
        if start >= fixture.rows.len() {
            return Ok(RowBatch::new(fixture.columns.clone()));
        }
        let end = (start + limit as usize).min(fixture.rows.len());
        let mut batch = RowBatch::new(fixture.columns.clone());
        batch.rows = fixture.rows[start..end].to_vec();
        Ok(batch)
    }

    async fn cdc_enabled(&self, table: &str) -> bool {
        self.cdc_enabled.get(table).copied().unwrap_or(false)
    }

    async fn enable_cdc(&self, _table: &str) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn execute_scalar_query(
        &self,
        _query: &str,
        _params: &[String],
    ) -> Result<Option<String>, AdapterError> {
        Ok(None)
    }

    async fn read_cdc(&self, table: &str, cursor: Option<&str>) -> Result<CdcBatch, AdapterError> {
        let mut queues = self.cdc_queues.lock().unwrap();
        let Some(queue) = queues.get_mut(table) else {
            return Ok(CdcBatch {
                batch: RowBatch::default(),
                next_cursor: cursor.map(|c| c.to_string()),
            });
        };
        if queue.is_empty() {
            return Ok(CdcBatch {
                batch: RowBatch::default(),
                next_cursor: cursor.map(|c| c.to_string()),
            });
        }
        let columns = self
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default();
        let mut batch = RowBatch::new(columns);
        batch.rows = queue.drain(..).map(|(_, row)| row).collect();
        let next_cursor = Some(format!(
            "cursor-{}",
            cursor.and_then(|c| c.strip_prefix("cursor-")).and_then(|n| n.parse::<u64>().ok()).unwrap_or(0) + 1
        ));
        Ok(CdcBatch { batch, next_cursor })
    }
}

/// A `DestinationAdapter` that keeps every written table in memory,
/// tracking its schema separately so `apply_schema_drift` has something
/// to reconcile against.
#[derive(Default)]
pub struct InMemoryDestination {
    tables: Mutex<HashMap<String, (Vec<ColumnSpec>, Vec<Vec<Value>>)>>,
    fail_next_writes: AtomicU32,
}

impl InMemoryDestination {
    pub fn new() -> Self {
        InMemoryDestination::default()
    }

    pub fn fail_next_writes(mut self, n: u32) -> Self {
        self.fail_next_writes = AtomicU32::new(n);
        self
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|(_, rows)| rows.len())
            .unwrap_or(0)
    }

    pub fn columns_of(&self, table: &str) -> Vec<ColumnSpec> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|(cols, _)| cols.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DestinationAdapter for InMemoryDestination {
    async fn connect(&mut self, _connector: &Connector) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool, AdapterError> {
        Ok(self.tables.lock().unwrap().contains_key(table))
    }

    async fn create_table(&self, table: &str, columns: &[ColumnSpec]) -> Result<(), AdapterError> {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_insert_with(|| (columns.to_vec(), Vec::new()));
        Ok(())
    }

    async fn schema_of(&self, table: &str) -> Result<Vec<ColumnSpec>, AdapterError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .map(|(cols, _)| cols.clone())
            .unwrap_or_default())
    }

    async fn apply_schema_drift(
        &self,
        table: &str,
        incoming: &[ColumnSpec],
    ) -> Result<Vec<ColumnSpec>, AdapterError> {
        let mut tables = self.tables.lock().unwrap();
        let entry = tables
            .entry(table.to_string())
            .or_insert_with(|| (Vec::new(), Vec::new()));
        let mut added = Vec::new();
        for column in incoming {
            if !entry.0.iter().any(|c| c.name == column.name) {
                entry.0.push(column.clone());
                added.push(column.clone());
            }
        }
        Ok(added)
    }

    async fn write(&self, batch: &RowBatch, opts: &WriteOptions) -> Result<WriteResult, AdapterError> {
        if self
            .fail_next_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n > 0 { Some(n - 1) } else { None }
            })
            .is_ok()
        {
            return Err(AdapterError::WriteError("simulated write failure".to_string()));
        }
        let mut tables = self.tables.lock().unwrap();
        let entry = tables
            .entry(opts.target_table_name.clone())
            .or_insert_with(|| (batch.columns.clone(), Vec::new()));
        entry.1.extend(batch.rows.clone());
        Ok(WriteResult {
            rows_written: batch.len() as u64,
            bytes_written: batch.approx_size_bytes() as u64,
        })
    }

    async fn cleanup_partial(&self, _opts: &WriteOptions) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// Lets a test hold an inspection handle to an `InMemoryDestination` while
/// the runtime owns its own `DestinationAdapter` through a `Box`.
pub struct SharedDestination(pub std::sync::Arc<InMemoryDestination>);

#[async_trait]
impl DestinationAdapter for SharedDestination {
    async fn connect(&mut self, connector: &Connector) -> Result<(), AdapterError> {
        let inner = std::sync::Arc::get_mut(&mut self.0);
        match inner {
            Some(inner) => inner.connect(connector).await,
            None => Ok(()),
        }
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool, AdapterError> {
        self.0.table_exists(table).await
    }

    async fn create_table(&self, table: &str, columns: &[ColumnSpec]) -> Result<(), AdapterError> {
        self.0.create_table(table, columns).await
    }

    async fn schema_of(&self, table: &str) -> Result<Vec<ColumnSpec>, AdapterError> {
        self.0.schema_of(table).await
    }

    async fn apply_schema_drift(
        &self,
        table: &str,
        incoming: &[ColumnSpec],
    ) -> Result<Vec<ColumnSpec>, AdapterError> {
        self.0.apply_schema_drift(table, incoming).await
    }

    async fn write(&self, batch: &RowBatch, opts: &WriteOptions) -> Result<WriteResult, AdapterError> {
        self.0.write(batch, opts).await
    }

    async fn cleanup_partial(&self, opts: &WriteOptions) -> Result<(), AdapterError> {
        self.0.cleanup_partial(opts).await
    }
}

/// In-memory `StateStore`: a `Mutex`-guarded map plus an append-only log,
/// avoiding the on-disk `sled` store's setup/teardown for tests.
#[derive(Default)]
pub struct InMemoryStateStore {
    checkpoints: Mutex<HashMap<(String, String), Checkpoint>>,
    wal: Mutex<Vec<WalEntry>>,
    task_executions: Mutex<HashMap<String, TaskExecution>>,
    table_executions: Mutex<HashMap<(String, String), TableExecution>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        InMemoryStateStore::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), Box<dyn StdError + Send + Sync>> {
        self.checkpoints.lock().unwrap().insert(
            (checkpoint.execution_id.clone(), checkpoint.table.clone()),
            checkpoint.clone(),
        );
        Ok(())
    }

    async fn load_checkpoint(
        &self,
        execution_id: &str,
        table: &str,
    ) -> Result<Option<Checkpoint>, Box<dyn StdError + Send + Sync>> {
        Ok(self
            .checkpoints
            .lock()
            .unwrap()
            .get(&(execution_id.to_string(), table.to_string()))
            .cloned())
    }

    async fn append_wal(&self, entry: &WalEntry) -> Result<(), Box<dyn StdError + Send + Sync>> {
        self.wal.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn iter_wal(&self, execution_id: &str) -> Result<Vec<WalEntry>, Box<dyn StdError + Send + Sync>> {
        Ok(self
            .wal
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.execution_id() == execution_id)
            .cloned()
            .collect())
    }

    async fn save_task_execution(&self, execution: &TaskExecution) -> Result<(), Box<dyn StdError + Send + Sync>> {
        self.task_executions
            .lock()
            .unwrap()
            .insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    async fn load_task_execution(
        &self,
        execution_id: &str,
    ) -> Result<Option<TaskExecution>, Box<dyn StdError + Send + Sync>> {
        Ok(self.task_executions.lock().unwrap().get(execution_id).cloned())
    }

    async fn save_table_execution(&self, execution: &TableExecution) -> Result<(), Box<dyn StdError + Send + Sync>> {
        self.table_executions.lock().unwrap().insert(
            (execution.execution_id.clone(), execution.table.clone()),
            execution.clone(),
        );
        Ok(())
    }

    async fn load_table_execution(
        &self,
        execution_id: &str,
        table: &str,
    ) -> Result<Option<TableExecution>, Box<dyn StdError + Send + Sync>> {
        Ok(self
            .table_executions
            .lock()
            .unwrap()
            .get(&(execution_id.to_string(), table.to_string()))
            .cloned())
    }
}

/// A `GlobalVariableStore` over a fixed literal map, for tests that need
/// deterministic variable resolution without a live database.
#[derive(Default)]
pub struct FixedVariableStore {
    variables: HashMap<String, GlobalVariable>,
}

impl FixedVariableStore {
    pub fn new() -> Self {
        FixedVariableStore::default()
    }

    pub fn with_static(mut self, name: &str, value: &str) -> Self {
        self.variables.insert(
            name.to_string(),
            GlobalVariable {
                name: name.to_string(),
                kind: GlobalVariableKind::Static {
                    value: value.to_string(),
                },
                is_active: true,
            },
        );
        self
    }
}

#[async_trait]
impl GlobalVariableStore for FixedVariableStore {
    async fn lookup(&self, name: &str) -> Option<GlobalVariable> {
        self.variables.get(name).cloned()
    }

    async fn execute(&self, kind: &GlobalVariableKind) -> Result<String, ResolveError> {
        match kind {
            GlobalVariableKind::Static { value } => Ok(value.clone()),
            GlobalVariableKind::Expression { expression } => Ok(expression.clone()),
            GlobalVariableKind::DbQuery(_) => Ok("db-value".to_string()),
            GlobalVariableKind::RawQuery { raw_query } => Ok(format!("raw:{raw_query}")),
        }
    }
}

/// `ProgressSink` that records every call for assertions instead of
/// forwarding anywhere.
#[derive(Default)]
pub struct CollectingSink {
    pub batches: Mutex<Vec<(String, u64, f64)>>,
    pub warnings: Mutex<Vec<(String, String)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        CollectingSink::default()
    }
}

#[async_trait]
impl ProgressSink for CollectingSink {
    async fn on_batch_committed(&self, table: &str, rows: u64, percent_complete: f64) {
        self.batches
            .lock()
            .unwrap()
            .push((table.to_string(), rows, percent_complete));
    }

    async fn on_warning(&self, table: &str, message: &str) {
        self.warnings
            .lock()
            .unwrap()
            .push((table.to_string(), message.to_string()));
    }
}
