use super::{CdcBatch, SourceAdapter, TableInfo};
use crate::backoff::ConnectBackoff;
use crate::dialect::{dialect_for, safe_quoted_ident, Dialect};
use crate::error::AdapterError;
use crate::type_map::from_postgres_type;
use async_trait::async_trait;
use model::batch::{ColumnSpec, RowBatch};
use model::connector::{Connector, SourceVariant};
use model::value::Value;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls};

/// Postgres source over `tokio-postgres`. CDC is implemented against a
/// logical replication slot named `dtaas_<table>` decoded with the
/// built-in `test_decoding` plugin, so changes are readable through the
/// ordinary SQL-level `pg_logical_slot_get_changes` function instead of
/// the binary streaming replication protocol `pgoutput` requires. The
/// cursor is the LSN of the last change consumed.
pub struct PostgresSource {
    client: Mutex<Option<Client>>,
    dialect: Box<dyn Dialect>,
}

impl Default for PostgresSource {
    fn default() -> Self {
        PostgresSource {
            client: Mutex::new(None),
            dialect: dialect_for(SourceVariant::PostgreSql),
        }
    }
}

fn slot_name(table: &str) -> String {
    let safe: String = table
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    format!("dtaas_{safe}")
}

impl PostgresSource {
    async fn connect_once(connector: &Connector) -> Result<Client, AdapterError> {
        let cfg = &connector.config;
        let conn_str = format!(
            "host={} port={} dbname={} user={} password={}",
            cfg.host.as_deref().unwrap_or("localhost"),
            cfg.port.unwrap_or(5432),
            cfg.database.as_deref().unwrap_or_default(),
            cfg.username.as_deref().unwrap_or_default(),
            cfg.password.as_deref().unwrap_or_default(),
        );
        let (client, connection) = tokio_postgres::connect(&conn_str, NoTls)
            .await
            .map_err(|e| AdapterError::AuthFailed(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "postgres connection task ended");
            }
        });
        Ok(client)
    }

    async fn primary_key_column(&self, client: &Client, table: &str) -> Option<String> {
        let row = client
            .query_opt(
                "SELECT kcu.column_name FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                   ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
                 WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_name = $1 \
                 ORDER BY kcu.ordinal_position LIMIT 1",
                &[&table],
            )
            .await
            .ok()
            .flatten();
        row.map(|r| r.get(0))
    }
}

#[async_trait]
impl SourceAdapter for PostgresSource {
    async fn connect(&mut self, connector: &Connector) -> Result<(), AdapterError> {
        let backoff = ConnectBackoff::default();
        let client = backoff.run(|| Self::connect_once(connector)).await?;
        *self.client.lock().await = Some(client);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        *self.client.lock().await = None;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>, AdapterError> {
        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let rows = client
            .query(
                "SELECT table_schema, table_name FROM information_schema.tables WHERE table_type = 'BASE TABLE' AND table_schema NOT IN ('pg_catalog', 'information_schema')",
                &[],
            )
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        let slots = client
            .query("SELECT slot_name FROM pg_replication_slots WHERE active OR slot_type = 'logical'", &[])
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        let active: std::collections::HashSet<String> =
            slots.into_iter().map(|r| r.get(0)).collect();
        Ok(rows
            .into_iter()
            .map(|row| {
                let name: String = row.get(1);
                let cdc_enabled = active.contains(&slot_name(&name));
                TableInfo {
                    schema: row.get(0),
                    name,
                    approx_row_count: None,
                    cdc_enabled,
                }
            })
            .collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnSpec>, AdapterError> {
        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let rows = client
            .query(
                "SELECT column_name, data_type, is_nullable FROM information_schema.columns WHERE table_name = $1",
                &[&table],
            )
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let name: String = row.get(0);
                let native: String = row.get(1);
                let nullable: String = row.get(2);
                ColumnSpec {
                    nullable: nullable == "YES",
                    ..ColumnSpec::new(name, from_postgres_type(&native))
                }
            })
            .collect())
    }

    async fn row_count(&self, table: &str) -> Result<u64, AdapterError> {
        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let quoted = safe_quoted_ident(self.dialect.as_ref(), table);
        let row = client
            .query_one(&format!("SELECT COUNT(*) FROM {quoted}"), &[])
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        let count: i64 = row.get(0);
        Ok(count as u64)
    }

    async fn read_batch(
        &self,
        table: &str,
        offset: u64,
        limit: u64,
    ) -> Result<RowBatch, AdapterError> {
        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let quoted = safe_quoted_ident(self.dialect.as_ref(), table);
        let order_col = self
            .primary_key_column(client, table)
            .await
            .map(|pk| safe_quoted_ident(self.dialect.as_ref(), &pk))
            .unwrap_or_else(|| "1".to_string());
        let query =
            format!("SELECT * FROM {quoted} ORDER BY {order_col} OFFSET {offset} LIMIT {limit}");
        let rows = client
            .query(&query, &[])
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;

        let mut batch = RowBatch::default();
        for row in rows {
            let values: Vec<Value> = (0..row.len())
                .map(|i| {
                    row.try_get::<_, Option<String>>(i)
                        .ok()
                        .flatten()
                        .map(Value::String)
                        .unwrap_or(Value::Null)
                })
                .collect();
            batch.rows.push(values);
        }
        Ok(batch)
    }

    async fn cdc_enabled(&self, table: &str) -> bool {
        let guard = self.client.lock().await;
        let Some(client) = guard.as_ref() else {
            return false;
        };
        client
            .query_opt(
                "SELECT 1 FROM pg_replication_slots WHERE slot_name = $1",
                &[&slot_name(table)],
            )
            .await
            .ok()
            .flatten()
            .is_some()
    }

    async fn enable_cdc(&self, table: &str) -> Result<(), AdapterError> {
        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let slot = slot_name(table);
        client
            .execute(
                &format!("SELECT pg_create_logical_replication_slot('{slot}', 'test_decoding')"),
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
        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let bound: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = params
            .iter()
            .map(|p| p as &(dyn tokio_postgres::types::ToSql + Sync))
            .collect();
        let row = client
            .query_opt(query, &bound)
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        Ok(row.and_then(|r| r.try_get::<_, Option<String>>(0).ok().flatten()))
    }

    async fn read_cdc(&self, table: &str, cursor: Option<&str>) -> Result<CdcBatch, AdapterError> {
        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let slot = slot_name(table);
        let rows = client
            .query(
                &format!("SELECT lsn::text, data FROM pg_logical_slot_get_changes('{slot}', NULL, NULL)"),
                &[],
            )
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;

        let mut batch = RowBatch::default();
        let mut last_lsn = None;
        for row in &rows {
            let lsn: String = row.get(0);
            let data: String = row.get(1);
            if data.starts_with(&format!("table public.{table}:"))
                || data.starts_with(&format!("table {table}:"))
            {
                batch.rows.push(vec![Value::String(data)]);
            }
            last_lsn = Some(lsn);
        }

        let next_cursor = last_lsn.or_else(|| cursor.map(str::to_string));
        Ok(CdcBatch { batch, next_cursor })
    }
}
