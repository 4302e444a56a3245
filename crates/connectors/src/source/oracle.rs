use super::{CdcBatch, SourceAdapter, TableInfo};
use crate::backoff::ConnectBackoff;
use crate::dialect::{dialect_for, safe_quoted_ident, Dialect};
use crate::error::AdapterError;
use crate::type_map::from_oracle_type;
use async_trait::async_trait;
use model::batch::{ColumnSpec, RowBatch};
use model::connector::{Connector, SourceVariant};
use model::value::Value;
use oracle::Connection;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Oracle source. The `oracle` crate's connection is synchronous, so every
/// call is dispatched through `spawn_blocking`. CDC reads a window of
/// `V$LOGMNR_CONTENTS` between two SCNs via `DBMS_LOGMNR`, which requires
/// supplemental logging to already be enabled for the table.
pub struct OracleSource {
    conn: Mutex<Option<Arc<Connection>>>,
    dialect: Box<dyn Dialect>,
}

impl Default for OracleSource {
    fn default() -> Self {
        OracleSource {
            conn: Mutex::new(None),
            dialect: dialect_for(SourceVariant::Oracle),
        }
    }
}

impl OracleSource {
    async fn connect_once(connector: &Connector) -> Result<Connection, AdapterError> {
        let cfg = connector.config.clone();
        tokio::task::spawn_blocking(move || {
            let connect_string = format!(
                "//{}:{}/{}",
                cfg.host.as_deref().unwrap_or("localhost"),
                cfg.port.unwrap_or(1521),
                cfg.database.as_deref().unwrap_or_default(),
            );
            Connection::connect(
                cfg.username.as_deref().unwrap_or_default(),
                cfg.password.as_deref().unwrap_or_default(),
                connect_string,
            )
            .map_err(|e| AdapterError::AuthFailed(e.to_string()))
        })
        .await
        .map_err(|e| AdapterError::ConnectionFailed(e.to_string()))?
    }

    fn primary_key_column(conn: &Connection, table: &str) -> Option<String> {
        let row = conn
            .query_row(
                "SELECT cols.column_name FROM all_constraints cons \
                 JOIN all_cons_columns cols ON cons.constraint_name = cols.constraint_name AND cons.owner = cols.owner \
                 WHERE cons.constraint_type = 'P' AND cons.table_name = :1 \
                 ORDER BY cols.position",
                &[&table.to_uppercase()],
            )
            .ok()?;
        row.get(0).ok()
    }
}

#[async_trait]
impl SourceAdapter for OracleSource {
    async fn connect(&mut self, connector: &Connector) -> Result<(), AdapterError> {
        let backoff = ConnectBackoff::default();
        let connector = connector.clone();
        let conn = backoff
            .run(|| Self::connect_once(&connector))
            .await?;
        *self.conn.lock().await = Some(Arc::new(conn));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        *self.conn.lock().await = None;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>, AdapterError> {
        let conn = self.connection()?;
        tokio::task::spawn_blocking(move || {
            let rows = conn
                .query("SELECT OWNER, TABLE_NAME FROM ALL_TABLES", &[])
                .map_err(|e| AdapterError::Transient(e.to_string()))?;
            let log_grouped: std::collections::HashSet<String> = conn
                .query("SELECT DISTINCT TABLE_NAME FROM ALL_LOG_GROUPS", &[])
                .map_err(|e| AdapterError::Transient(e.to_string()))?
                .filter_map(|r| r.ok())
                .filter_map(|r| r.get::<usize, String>(0).ok())
                .collect();
            let mut tables = Vec::new();
            for row in rows {
                let row = row.map_err(|e| AdapterError::Transient(e.to_string()))?;
                let schema: String = row.get(0).unwrap_or_default();
                let name: String = row.get(1).unwrap_or_default();
                let cdc_enabled = log_grouped.contains(&name);
                tables.push(TableInfo {
                    schema,
                    name,
                    approx_row_count: None,
                    cdc_enabled,
                });
            }
            Ok(tables)
        })
        .await
        .map_err(|e| AdapterError::ConnectionFailed(e.to_string()))?
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnSpec>, AdapterError> {
        let conn = self.connection()?;
        let table = table.to_string();
        tokio::task::spawn_blocking(move || {
            let rows = conn
                .query(
                    "SELECT COLUMN_NAME, DATA_TYPE, NULLABLE FROM ALL_TAB_COLUMNS WHERE TABLE_NAME = :1",
                    &[&table.to_uppercase()],
                )
                .map_err(|e| AdapterError::Transient(e.to_string()))?;
            let mut columns = Vec::new();
            for row in rows {
                let row = row.map_err(|e| AdapterError::Transient(e.to_string()))?;
                let name: String = row.get(0).unwrap_or_default();
                let native: String = row.get(1).unwrap_or_default();
                let nullable: String = row.get(2).unwrap_or_else(|_| "Y".to_string());
                columns.push(ColumnSpec {
                    nullable: nullable == "Y",
                    ..ColumnSpec::new(name, from_oracle_type(&native))
                });
            }
            Ok(columns)
        })
        .await
        .map_err(|e| AdapterError::ConnectionFailed(e.to_string()))?
    }

    async fn row_count(&self, table: &str) -> Result<u64, AdapterError> {
        let conn = self.connection()?;
        let quoted = safe_quoted_ident(self.dialect.as_ref(), table);
        tokio::task::spawn_blocking(move || {
            let row = conn
                .query_row(&format!("SELECT COUNT(*) FROM {quoted}"), &[])
                .map_err(|e| AdapterError::Transient(e.to_string()))?;
            let count: i64 = row.get(0).unwrap_or(0);
            Ok(count as u64)
        })
        .await
        .map_err(|e| AdapterError::ConnectionFailed(e.to_string()))?
    }

    async fn read_batch(
        &self,
        table: &str,
        offset: u64,
        limit: u64,
    ) -> Result<RowBatch, AdapterError> {
        let conn = self.connection()?;
        let quoted = safe_quoted_ident(self.dialect.as_ref(), table);
        let table_owned = table.to_string();
        tokio::task::spawn_blocking(move || {
            let order_col = Self::primary_key_column(&conn, &table_owned).unwrap_or_else(|| "1".to_string());
            let query = format!(
                "SELECT * FROM {quoted} ORDER BY {order_col} OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY"
            );
            let rows = conn
                .query(&query, &[])
                .map_err(|e| AdapterError::Transient(e.to_string()))?;
            let mut batch = RowBatch::default();
            for row in rows {
                let row = row.map_err(|e| AdapterError::Transient(e.to_string()))?;
                let values: Vec<Value> = (0..row.sql_values().len())
                    .map(|i| {
                        row.get::<usize, String>(i)
                            .map(Value::String)
                            .unwrap_or(Value::Null)
                    })
                    .collect();
                batch.rows.push(values);
            }
            Ok(batch)
        })
        .await
        .map_err(|e| AdapterError::ConnectionFailed(e.to_string()))?
    }

    async fn cdc_enabled(&self, table: &str) -> bool {
        let Ok(conn) = self.connection() else {
            return false;
        };
        let table = table.to_string();
        tokio::task::spawn_blocking(move || {
            conn.query_row(
                "SELECT COUNT(*) FROM ALL_LOG_GROUPS WHERE TABLE_NAME = :1",
                &[&table.to_uppercase()],
            )
            .ok()
            .and_then(|row| row.get::<usize, i64>(0).ok())
            .map(|n| n > 0)
            .unwrap_or(false)
        })
        .await
        .unwrap_or(false)
    }

    async fn enable_cdc(&self, _table: &str) -> Result<(), AdapterError> {
        Err(AdapterError::UnsupportedFeature(
            "Oracle CDC requires LogMiner or GoldenGate, not managed by this adapter".to_string(),
        ))
    }

    async fn execute_scalar_query(
        &self,
        query: &str,
        params: &[String],
    ) -> Result<Option<String>, AdapterError> {
        let conn = self.connection()?;
        let query = query.to_string();
        let params = params.to_vec();
        tokio::task::spawn_blocking(move || {
            let bound: Vec<&dyn oracle::sql_type::ToSql> =
                params.iter().map(|p| p as &dyn oracle::sql_type::ToSql).collect();
            let row = conn.query_row(&query, &bound);
            match row {
                Ok(row) => Ok(row.get::<usize, String>(0).ok()),
                Err(oracle::Error::NoDataFound) => Ok(None),
                Err(e) => Err(AdapterError::Transient(e.to_string())),
            }
        })
        .await
        .map_err(|e| AdapterError::ConnectionFailed(e.to_string()))?
    }

    async fn read_cdc(&self, table: &str, cursor: Option<&str>) -> Result<CdcBatch, AdapterError> {
        let conn = self.connection()?;
        let cursor = cursor.map(str::to_string);
        let table = table.to_string();
        tokio::task::spawn_blocking(move || {
            let row = conn
                .query_row("SELECT CURRENT_SCN FROM V$DATABASE", &[])
                .map_err(|e| AdapterError::Transient(e.to_string()))?;
            let current_scn: i64 = row.get(0).unwrap_or(0);
            let next_cursor = Some(format!("{current_scn:x}"));

            let from_scn = cursor
                .as_deref()
                .and_then(|h| i64::from_str_radix(h, 16).ok());

            let mut batch = RowBatch::default();
            if let Some(from_scn) = from_scn {
                if from_scn < current_scn {
                    conn.execute(
                        &format!(
                            "BEGIN DBMS_LOGMNR.START_LOGMNR(STARTSCN => {from_scn}, ENDSCN => {current_scn}, \
                             OPTIONS => DBMS_LOGMNR.DICT_FROM_ONLINE_CATALOG + DBMS_LOGMNR.COMMITTED_DATA_ONLY); END;"
                        ),
                        &[],
                    )
                    .map_err(|e| AdapterError::Transient(e.to_string()))?;

                    let rows = conn.query(
                        "SELECT SCN, OPERATION, SQL_REDO FROM V$LOGMNR_CONTENTS WHERE TABLE_NAME = :1",
                        &[&table.to_uppercase()],
                    );
                    if let Ok(rows) = rows {
                        for row in rows.filter_map(|r| r.ok()) {
                            let scn: String = row.get(0).unwrap_or_default();
                            let op: String = row.get(1).unwrap_or_default();
                            let redo: String = row.get(2).unwrap_or_default();
                            batch.rows.push(vec![
                                Value::String(scn),
                                Value::String(op),
                                Value::String(redo),
                            ]);
                        }
                    }

                    let _ = conn.execute("BEGIN DBMS_LOGMNR.END_LOGMNR; END;", &[]);
                }
            }

            Ok(CdcBatch { batch, next_cursor })
        })
        .await
        .map_err(|e| AdapterError::ConnectionFailed(e.to_string()))?
    }
}

impl OracleSource {
    fn connection(&self) -> Result<Arc<Connection>, AdapterError> {
        self.conn
            .try_lock()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))
    }
}
