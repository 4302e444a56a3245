use super::{resolve_object_key, DestinationAdapter, WriteOptions, WriteResult};
use crate::backoff::ConnectBackoff;
use crate::error::AdapterError;
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType as ArrowDataType, Field, Schema as ArrowSchema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use model::batch::{ColumnSpec, DataType, RowBatch};
use model::connector::Connector;
use model::task::FileFormat;
use model::value::Value;
use parquet::arrow::ArrowWriter;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

/// S3 destination. Every write lands as one object at the resolved key
/// plus a `<key>._metadata.json` sidecar describing the schema and row
/// count. Objects are written whole, so a failed write never
/// leaves a half-written object for readers to see.
pub struct S3Destination {
    client: Mutex<Option<Client>>,
    bucket: Mutex<Option<String>>,
}

impl Default for S3Destination {
    fn default() -> Self {
        S3Destination {
            client: Mutex::new(None),
            bucket: Mutex::new(None),
        }
    }
}

impl S3Destination {
    async fn connect_once() -> Result<Client, AdapterError> {
        let config = aws_config::load_from_env().await;
        Ok(Client::new(&config))
    }

    fn encode_batch(batch: &RowBatch, format: FileFormat) -> Result<Vec<u8>, AdapterError> {
        match format {
            FileFormat::Csv => Self::encode_csv(batch),
            FileFormat::JsonLines => Self::encode_json_lines(batch),
            FileFormat::Parquet => Self::encode_parquet(batch),
        }
    }

    /// Columnar encode, one Arrow array per `RowBatch` column. Numeric and
    /// boolean columns keep their native Arrow type; everything else
    /// (decimals, dates, UUIDs, JSON, mixed/custom types) is written as
    /// UTF-8 text via `Value::display_string`, so a column never fails to
    /// encode just because its declared type has no direct Arrow mapping.
    fn encode_parquet(batch: &RowBatch) -> Result<Vec<u8>, AdapterError> {
        let mut fields = Vec::with_capacity(batch.columns.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(batch.columns.len());
        for (index, column) in batch.columns.iter().enumerate() {
            let cells: Vec<&Value> = batch.rows.iter().map(|row| &row[index]).collect();
            let (arrow_type, array): (ArrowDataType, ArrayRef) = match column.data_type {
                DataType::SmallInt | DataType::Int | DataType::BigInt => (
                    ArrowDataType::Int64,
                    Arc::new(Int64Array::from(
                        cells
                            .iter()
                            .map(|v| match v {
                                Value::Int(n) => Some(*n),
                                _ => None,
                            })
                            .collect::<Vec<_>>(),
                    )),
                ),
                DataType::Float | DataType::Double => (
                    ArrowDataType::Float64,
                    Arc::new(Float64Array::from(
                        cells.iter().map(|v| v.as_f64()).collect::<Vec<_>>(),
                    )),
                ),
                DataType::Boolean => (
                    ArrowDataType::Boolean,
                    Arc::new(BooleanArray::from(
                        cells
                            .iter()
                            .map(|v| match v {
                                Value::Boolean(b) => Some(*b),
                                _ => None,
                            })
                            .collect::<Vec<_>>(),
                    )),
                ),
                _ => (
                    ArrowDataType::Utf8,
                    Arc::new(
                        cells
                            .iter()
                            .map(|v| if v.is_null() { None } else { Some(v.display_string()) })
                            .collect::<StringArray>(),
                    ),
                ),
            };
            fields.push(Field::new(&column.name, arrow_type, true));
            arrays.push(array);
        }
        let schema = Arc::new(ArrowSchema::new(fields));
        let record_batch = RecordBatch::try_new(schema.clone(), arrays)
            .map_err(|e| AdapterError::WriteError(e.to_string()))?;

        let mut buffer = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buffer, schema, None)
            .map_err(|e| AdapterError::WriteError(e.to_string()))?;
        writer
            .write(&record_batch)
            .map_err(|e| AdapterError::WriteError(e.to_string()))?;
        writer
            .close()
            .map_err(|e| AdapterError::WriteError(e.to_string()))?;
        Ok(buffer)
    }

    fn encode_csv(batch: &RowBatch) -> Result<Vec<u8>, AdapterError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let headers: Vec<&str> = batch.columns.iter().map(|c| c.name.as_str()).collect();
        writer
            .write_record(&headers)
            .map_err(|e| AdapterError::WriteError(e.to_string()))?;
        for row in &batch.rows {
            let cells: Vec<String> = row.iter().map(Value::display_string).collect();
            writer
                .write_record(&cells)
                .map_err(|e| AdapterError::WriteError(e.to_string()))?;
        }
        writer
            .into_inner()
            .map_err(|e| AdapterError::WriteError(e.to_string()))
    }

    fn encode_json_lines(batch: &RowBatch) -> Result<Vec<u8>, AdapterError> {
        let mut out = Vec::new();
        for row in &batch.rows {
            let mut object = serde_json::Map::new();
            for (col, value) in batch.columns.iter().zip(row.iter()) {
                object.insert(col.name.clone(), json!(value.display_string()));
            }
            out.extend(
                serde_json::to_vec(&serde_json::Value::Object(object))
                    .map_err(|e| AdapterError::WriteError(e.to_string()))?,
            );
            out.push(b'\n');
        }
        Ok(out)
    }

    fn metadata_sidecar(batch: &RowBatch, result: &WriteResult) -> Vec<u8> {
        let schema: Vec<serde_json::Value> = batch
            .columns
            .iter()
            .map(|c| json!({ "name": c.name, "type": format!("{:?}", c.data_type) }))
            .collect();
        serde_json::to_vec_pretty(&json!({
            "row_count": result.rows_written,
            "byte_count": result.bytes_written,
            "schema": schema,
        }))
        .unwrap_or_default()
    }
}

#[async_trait]
impl DestinationAdapter for S3Destination {
    async fn connect(&mut self, connector: &Connector) -> Result<(), AdapterError> {
        let backoff = ConnectBackoff::default();
        let client = backoff.run(Self::connect_once).await?;
        let bucket = connector
            .config
            .bucket
            .clone()
            .ok_or_else(|| AdapterError::ConfigInvalid("missing bucket".to_string()))?;
        *self.client.lock().await = Some(client);
        *self.bucket.lock().await = Some(bucket);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        *self.client.lock().await = None;
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool, AdapterError> {
        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let bucket = self.bucket.lock().await.clone().unwrap_or_default();
        let prefix = format!("{table}/");
        let resp = client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        Ok(resp.contents().first().is_some())
    }

    async fn create_table(&self, _table: &str, _columns: &[ColumnSpec]) -> Result<(), AdapterError> {
        // A prefix has no schema to pre-create; the first write establishes it.
        Ok(())
    }

    async fn schema_of(&self, _table: &str) -> Result<Vec<ColumnSpec>, AdapterError> {
        Ok(Vec::new())
    }

    async fn apply_schema_drift(
        &self,
        _table: &str,
        incoming: &[ColumnSpec],
    ) -> Result<Vec<ColumnSpec>, AdapterError> {
        // Object storage has no schema to alter; every write's sidecar
        // carries its own schema, so drift is implicitly accommodated.
        Ok(incoming.to_vec())
    }

    async fn write(&self, batch: &RowBatch, opts: &WriteOptions) -> Result<WriteResult, AdapterError> {
        if batch.is_empty() {
            return Ok(WriteResult::default());
        }
        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let bucket = self.bucket.lock().await.clone().unwrap_or_default();

        let key = resolve_object_key(opts);
        let body = Self::encode_batch(batch, opts.file_format)?;
        let bytes_written = body.len() as u64;

        client
            .put_object()
            .bucket(&bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| AdapterError::WriteError(e.to_string()))?;

        let result = WriteResult {
            rows_written: batch.len() as u64,
            bytes_written,
        };

        let sidecar_key = format!("{key}._metadata.json");
        client
            .put_object()
            .bucket(&bucket)
            .key(&sidecar_key)
            .body(ByteStream::from(Self::metadata_sidecar(batch, &result)))
            .send()
            .await
            .map_err(|e| AdapterError::WriteError(e.to_string()))?;

        Ok(result)
    }

    async fn cleanup_partial(&self, opts: &WriteOptions) -> Result<(), AdapterError> {
        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| AdapterError::ConnectionFailed("not connected".to_string()))?;
        let bucket = self.bucket.lock().await.clone().unwrap_or_default();
        let key = resolve_object_key(opts);
        // put_object is atomic, so a failed write never leaves a partial
        // object behind; this exists only to satisfy the trait contract
        // and to remove a previously-committed object on a retried write.
        let _ = client.delete_object().bucket(bucket).key(key).send().await;
        Ok(())
    }
}
