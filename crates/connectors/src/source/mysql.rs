use super::{CdcBatch, SourceAdapter, TableInfo};
use crate::backoff::ConnectBackoff;
use crate::dialect::{dialect_for, safe_quoted_ident, Dialect};
use crate::error::AdapterError;
use crate::type_map::from_mysql_type;
use async_trait::async_trait;
use model::batch::{ColumnSpec, RowBatch};
use model::connector::{Connector, SourceVariant};
use model::value::Value;
use futures_util::StreamExt;
use mysql_async::binlog::events::{Event, EventData, RowsEventData};
use mysql_async::prelude::*;
use mysql_async::{BinlogStreamRequest, Conn, Opts, OptsBuilder};
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};

/// MySQL source over `mysql_async`. CDC cursor format is `file:position`
/// (binlog coordinates), matching what `SHOW MASTER STATUS` reports and
/// what a `BinlogRequest` seeks from.
pub struct MySqlSource {
    conn: Mutex<Option<Conn>>,
    opts: Mutex<Option<Opts>>,
    dialect: Box<dyn Dialect>,
}

impl Default for MySqlSource {
    fn default() -> Self {
        MySqlSource {
            conn: Mutex::new(None),
            opts: Mutex::new(None),
            dialect: dialect_for(SourceVariant::MySql),
        }
    }
}

impl MySqlSource {
    fn opts_for(connector: &Connector) -> Opts {
        let cfg = &connector.config;
        OptsBuilder::default()
            .ip_or_hostname(cfg.host.as_deref().unwrap_or("localhost"))
            .tcp_port(cfg.port.unwrap_or(3306))
            .db_name(cfg.database.clone())
            .user(cfg.username.clone())
            .pass(cfg.password.clone())
            .into()
    }

    async fn connect_once(connector: &Connector) -> Result<Conn, AdapterError> {
        Conn::new(Self::opts_for(connector))
            .await
            .map_err(|e| AdapterError::AuthFailed(e.to_string()))
    }

    async fn primary_key_column(&self, conn: &mut Conn, table: &str) -> Option<String> {
        let pk: Option<String> = conn
            .exec_first(
                "SELECT column_name FROM information_schema.key_column_usage \
                 WHERE table_schema = DATABASE() AND table_name = ? AND constraint_name = 'PRIMARY' \
                 ORDER BY ordinal_position LIMIT 1",
                (table,),
            )
            .await
            .ok()
            .flatten();
        pk
    }

    fn parse_cursor(cursor: Option<&str>) -> Option<(String, u64)> {
        let cursor = cursor?;
        let (file, pos) = cursor.split_once(':')?;
        Some((file.to_string(), pos.parse().ok()?))
    }
}

#[async_trait]
impl SourceAdapter for MySqlSource {
    async fn connect(&mut self, connector: &Connector) -> Result<(), AdapterError> {
        let backoff = ConnectBackoff::default();
        let conn = backoff.run(|| Self::connect_once(connector)).await?;
        *self.opts.lock().await = Some(Self::opts_for(connector));
        *self.conn.lock().await = Some(conn);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        *self.conn.lock().await = None;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>, AdapterError> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let rows: Vec<(String, String)> = conn
            .query(
                "SELECT table_schema, table_name FROM information_schema.tables WHERE table_type = 'BASE TABLE' AND table_schema = DATABASE()",
            )
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        let row: Option<(String, String)> = conn
            .query_first("SHOW VARIABLES LIKE 'log_bin'")
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        let binlog_on = matches!(row, Some((_, ref v)) if v.eq_ignore_ascii_case("ON"));
        Ok(rows
            .into_iter()
            .map(|(schema, name)| TableInfo {
                schema,
                name,
                approx_row_count: None,
                cdc_enabled: binlog_on,
            })
            .collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnSpec>, AdapterError> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let rows: Vec<(String, String, String)> = conn
            .exec(
                "SELECT column_name, data_type, is_nullable FROM information_schema.columns WHERE table_name = ?",
                (table,),
            )
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|(name, native, nullable)| ColumnSpec {
                nullable: nullable == "YES",
                ..ColumnSpec::new(name, from_mysql_type(&native))
            })
            .collect())
    }

    async fn row_count(&self, table: &str) -> Result<u64, AdapterError> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let quoted = safe_quoted_ident(self.dialect.as_ref(), table);
        let count: Option<u64> = conn
            .query_first(format!("SELECT COUNT(*) FROM {quoted}"))
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        Ok(count.unwrap_or(0))
    }

    async fn read_batch(
        &self,
        table: &str,
        offset: u64,
        limit: u64,
    ) -> Result<RowBatch, AdapterError> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let quoted = safe_quoted_ident(self.dialect.as_ref(), table);
        let order_col = self
            .primary_key_column(conn, table)
            .await
            .map(|pk| safe_quoted_ident(self.dialect.as_ref(), &pk))
            .unwrap_or_else(|| "1".to_string());
        let query =
            format!("SELECT * FROM {quoted} ORDER BY {order_col} LIMIT {limit} OFFSET {offset}");
        let rows: Vec<mysql_async::Row> = conn
            .query(query)
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;

        let mut batch = RowBatch::default();
        for row in rows {
            let values: Vec<Value> = (0..row.len())
                .map(|i| {
                    row.as_ref(i)
                        .map(|v| Value::String(format!("{v:?}")))
                        .unwrap_or(Value::Null)
                })
                .collect();
            batch.rows.push(values);
        }
        Ok(batch)
    }

    async fn cdc_enabled(&self, _table: &str) -> bool {
        let mut guard = self.conn.lock().await;
        let Some(conn) = guard.as_mut() else {
            return false;
        };
        let log_bin: Option<(String, String)> = conn
            .query_first("SHOW VARIABLES LIKE 'log_bin'")
            .await
            .ok()
            .flatten();
        let binlog_format: Option<(String, String)> = conn
            .query_first("SHOW VARIABLES LIKE 'binlog_format'")
            .await
            .ok()
            .flatten();
        matches!(log_bin, Some((_, ref v)) if v.eq_ignore_ascii_case("ON"))
            && matches!(binlog_format, Some((_, ref v)) if v.eq_ignore_ascii_case("ROW"))
    }

    async fn enable_cdc(&self, _table: &str) -> Result<(), AdapterError> {
        Err(AdapterError::UnsupportedFeature(
            "MySQL CDC requires binlog_format=ROW, set at server level".to_string(),
        ))
    }

    async fn execute_scalar_query(
        &self,
        query: &str,
        params: &[String],
    ) -> Result<Option<String>, AdapterError> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let row: Option<mysql_async::Row> = conn
            .exec_first(query, params.to_vec())
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        Ok(row.and_then(|r| r.as_ref(0).map(|v| format!("{v:?}"))))
    }

    async fn read_cdc(&self, table: &str, cursor: Option<&str>) -> Result<CdcBatch, AdapterError> {
        let opts = self
            .opts
            .lock()
            .await
            .clone()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;

        let status: (String, u64) = {
            let mut guard = self.conn.lock().await;
            let conn = guard
                .as_mut()
                .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
            conn.query_first("SHOW MASTER STATUS")
                .await
                .map_err(|e| AdapterError::Transient(e.to_string()))?
                .ok_or_else(|| {
                    AdapterError::UnsupportedFeature("binary logging is not enabled".to_string())
                })?
        };

        let (start_file, start_pos) =
            Self::parse_cursor(cursor).unwrap_or_else(|| status.clone());

        let binlog_conn = Conn::new(opts)
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        let request = BinlogStreamRequest::new(1)
            .with_filename(start_file.as_bytes())
            .with_pos(start_pos);
        let mut stream = binlog_conn
            .get_binlog_stream(request)
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;

        let mut batch = RowBatch::default();
        let mut table_map = std::collections::HashMap::new();
        let deadline = Duration::from_millis(500);
        loop {
            let event = match timeout(deadline, stream.next()).await {
                Ok(Some(Ok(event))) => event,
                _ => break,
            };
            match event_data_for(&event, &mut table_map) {
                Some((event_table, rows)) if event_table == table => {
                    for row in rows {
                        batch.rows.push(row);
                    }
                }
                _ => {}
            }
        }

        Ok(CdcBatch {
            batch,
            next_cursor: Some(format!("{}:{}", status.0, status.1)),
        })
    }
}

/// Decodes only as far as mapping a rows event back to a table name and a
/// coarse per-row value; the wire-level column typing a full decode needs
/// lives in the table's own `TableMapEvent`, which this keeps just enough
/// of to resolve names.
fn event_data_for(
    event: &Event,
    table_map: &mut std::collections::HashMap<u64, String>,
) -> Option<(String, Vec<Vec<Value>>)> {
    match event.read_data().ok()?? {
        EventData::TableMapEvent(tme) => {
            table_map.insert(tme.table_id(), tme.table_name().to_string());
            None
        }
        EventData::RowsEvent(re) => {
            let table_id = match &re {
                RowsEventData::WriteRowsEvent(e) => e.table_id(),
                RowsEventData::UpdateRowsEvent(e) => e.table_id(),
                RowsEventData::DeleteRowsEvent(e) => e.table_id(),
                _ => return None,
            };
            let table_name = table_map.get(&table_id)?.clone();
            let row = vec![Value::String(format!("{re:?}"))];
            Some((table_name, vec![row]))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cursor_splits_file_and_position() {
        assert_eq!(
            MySqlSource::parse_cursor(Some("binlog.000003:1542")),
            Some(("binlog.000003".to_string(), 1542))
        );
        assert_eq!(MySqlSource::parse_cursor(None), None);
        assert_eq!(MySqlSource::parse_cursor(Some("garbage")), None);
    }
}
