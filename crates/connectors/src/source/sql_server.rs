use super::{CdcBatch, SourceAdapter, TableInfo};
use crate::backoff::ConnectBackoff;
use crate::dialect::{dialect_for, safe_quoted_ident, Dialect};
use crate::error::AdapterError;
use crate::type_map::from_sql_server_type;
use async_trait::async_trait;
use model::batch::{ColumnSpec, RowBatch};
use model::connector::{Connector, SourceVariant};
use model::value::Value;
use tiberius::{AuthMethod, Client, Config};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

type TiberiusClient = Client<Compat<TcpStream>>;

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

fn capture_instance(table: &str) -> String {
    let safe: String = table
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    format!("dbo_{safe}")
}

/// SQL Server source, backed by `tiberius`. CDC relies on the database
/// having `sys.sp_cdc_enable_table` already run or run via `enable_cdc`;
/// cursors are `sys.fn_cdc_get_max_lsn()` values encoded as hex.
pub struct SqlServerSource {
    client: Mutex<Option<TiberiusClient>>,
    dialect: Box<dyn Dialect>,
}

impl Default for SqlServerSource {
    fn default() -> Self {
        SqlServerSource {
            client: Mutex::new(None),
            dialect: dialect_for(SourceVariant::SqlServer),
        }
    }
}

impl SqlServerSource {
    async fn connect_once(connector: &Connector) -> Result<TiberiusClient, AdapterError> {
        let cfg = &connector.config;
        let mut config = Config::new();
        config.host(cfg.host.as_deref().unwrap_or("localhost"));
        config.port(cfg.port.unwrap_or(1433));
        config.database(cfg.database.as_deref().unwrap_or_default());
        config.authentication(AuthMethod::sql_server(
            cfg.username.as_deref().unwrap_or_default(),
            cfg.password.as_deref().unwrap_or_default(),
        ));
        config.trust_cert();

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| AdapterError::ConnectionFailed(e.to_string()))?;
        tcp.set_nodelay(true)
            .map_err(|e| AdapterError::ConnectionFailed(e.to_string()))?;

        Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| AdapterError::AuthFailed(e.to_string()))
    }

    async fn primary_key_column(&self, client: &mut TiberiusClient, table: &str) -> Option<String> {
        let safe: String = table
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        let query = format!(
            "SELECT kcu.COLUMN_NAME FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
             JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME \
             WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY' AND tc.TABLE_NAME = '{safe}' \
             ORDER BY kcu.ORDINAL_POSITION"
        );
        let row = client.query(query, &[]).await.ok()?.into_row().await.ok()??;
        row.get::<&str, _>(0).map(str::to_string)
    }
}

#[async_trait]
impl SourceAdapter for SqlServerSource {
    async fn connect(&mut self, connector: &Connector) -> Result<(), AdapterError> {
        let backoff = ConnectBackoff::default();
        let client = backoff
            .run(|| Self::connect_once(connector))
            .await?;
        *self.client.lock().await = Some(client);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        *self.client.lock().await = None;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>, AdapterError> {
        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let rows = client
            .query(
                "SELECT s.name, t.name, t.is_tracked_by_cdc FROM sys.tables t JOIN sys.schemas s ON t.schema_id = s.schema_id",
                &[],
            )
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| TableInfo {
                schema: row.get::<&str, _>(0).unwrap_or_default().to_string(),
                name: row.get::<&str, _>(1).unwrap_or_default().to_string(),
                approx_row_count: None,
                cdc_enabled: row.get::<bool, _>(2).unwrap_or(false),
            })
            .collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnSpec>, AdapterError> {
        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let safe: String = table
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        let query = format!(
            "SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = '{safe}'"
        );
        let rows = client
            .query(query, &[])
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let name = row.get::<&str, _>(0).unwrap_or_default().to_string();
                let native = row.get::<&str, _>(1).unwrap_or_default();
                let nullable = row.get::<&str, _>(2).unwrap_or("YES") == "YES";
                ColumnSpec {
                    nullable,
                    ..ColumnSpec::new(name, from_sql_server_type(native))
                }
            })
            .collect())
    }

    async fn row_count(&self, table: &str) -> Result<u64, AdapterError> {
        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let quoted = safe_quoted_ident(self.dialect.as_ref(), table);
        let row = client
            .query(format!("SELECT COUNT(*) FROM {quoted}"), &[])
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?
            .into_row()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?
            .ok_or_else(|| AdapterError::Transient("empty count result".to_string()))?;
        let count: i32 = row.get(0).unwrap_or(0);
        Ok(count as u64)
    }

    async fn read_batch(
        &self,
        table: &str,
        offset: u64,
        limit: u64,
    ) -> Result<RowBatch, AdapterError> {
        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let quoted = safe_quoted_ident(self.dialect.as_ref(), table);
        let order_col = self
            .primary_key_column(client, table)
            .await
            .map(|pk| safe_quoted_ident(self.dialect.as_ref(), &pk))
            .unwrap_or_else(|| "1".to_string());
        let query = format!(
            "SELECT * FROM {quoted} ORDER BY {order_col} OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY"
        );
        let stream = client
            .query(query, &[])
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;

        let mut batch = RowBatch::default();
        for row in stream {
            let values: Vec<Value> = (0..row.len())
                .map(|i| {
                    row.get::<&str, _>(i)
                        .map(|s| Value::String(s.to_string()))
                        .unwrap_or(Value::Null)
                })
                .collect();
            batch.rows.push(values);
        }
        Ok(batch)
    }

    async fn cdc_enabled(&self, table: &str) -> bool {
        let mut guard = self.client.lock().await;
        let Some(client) = guard.as_mut() else {
            return false;
        };
        let safe: String = table
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        let query = format!(
            "SELECT is_tracked_by_cdc FROM sys.tables WHERE name = '{safe}'"
        );
        let row = match client.query(query, &[]).await {
            Ok(stream) => stream.into_row().await.ok().flatten(),
            Err(_) => None,
        };
        row.and_then(|r| r.get::<bool, _>(0)).unwrap_or(false)
    }

    async fn enable_cdc(&self, table: &str) -> Result<(), AdapterError> {
        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let safe: String = table
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        client
            .execute(
                format!(
                    "EXEC sys.sp_cdc_enable_table @source_schema = N'dbo', @source_name = N'{safe}', @role_name = NULL"
                ),
                &[],
            )
            .await
            .map_err(|e| AdapterError::UnsupportedFeature(e.to_string()))?;
        Ok(())
    }

    async fn execute_scalar_query(
        &self,
        query: &str,
        params: &[String],
    ) -> Result<Option<String>, AdapterError> {
        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let bound: Vec<&dyn tiberius::ToSql> = params.iter().map(|p| p as &dyn tiberius::ToSql).collect();
        let row = client
            .query(query, &bound)
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?
            .into_row()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        Ok(row.and_then(|r| r.get::<&str, _>(0).map(str::to_string)))
    }

    async fn read_cdc(&self, table: &str, cursor: Option<&str>) -> Result<CdcBatch, AdapterError> {
        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let row = client
            .query("SELECT sys.fn_cdc_get_max_lsn()", &[])
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?
            .into_row()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        let max_lsn: Option<Vec<u8>> = row.as_ref().and_then(|r| r.get::<&[u8], _>(0)).map(<[u8]>::to_vec);
        let next_cursor = max_lsn.as_deref().map(encode_hex);

        let mut batch = RowBatch::default();
        if let (Some(from_hex), Some(to_lsn)) = (cursor, max_lsn.as_ref()) {
            if let Some(from_lsn) = decode_hex(from_hex) {
                let capture = capture_instance(table);
                let query = format!(
                    "SELECT * FROM cdc.fn_cdc_get_all_changes_{capture}(0x{}, 0x{}, 'all')",
                    encode_hex(&from_lsn),
                    encode_hex(to_lsn),
                );
                let stream = client
                    .query(query, &[])
                    .await
                    .map_err(|e| AdapterError::Transient(e.to_string()))?
                    .into_first_result()
                    .await
                    .map_err(|e| AdapterError::Transient(e.to_string()))?;
                for row in stream {
                    let values: Vec<Value> = (0..row.len())
                        .map(|i| {
                            row.get::<&str, _>(i)
                                .map(|s| Value::String(s.to_string()))
                                .unwrap_or(Value::Null)
                        })
                        .collect();
                    batch.rows.push(values);
                }
            }
        }

        Ok(CdcBatch { batch, next_cursor })
    }
}
