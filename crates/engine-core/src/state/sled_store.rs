use super::models::{Checkpoint, CheckpointStage, WalEntry};
use super::StateStore;
use async_trait::async_trait;
use model::execution::{TableExecution, TaskExecution};
use std::error::Error as StdError;
use std::time::{SystemTime, UNIX_EPOCH};

/// `sled`-backed `StateStore`. Checkpoints live under
/// `chk/<execution_id>/<table>`; WAL entries are
/// keyed by a monotonically increasing nanosecond timestamp so `iter_wal`
/// naturally yields them in emission order.
pub struct SledStateStore {
    db: sled::Db,
}

impl SledStateStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, sled::Error> {
        Ok(SledStateStore {
            db: sled::open(path)?,
        })
    }

    fn chk_key(execution_id: &str, table: &str) -> Vec<u8> {
        format!("chk/{execution_id}/{table}").into_bytes()
    }

    fn stage_key(execution_id: &str, table: &str) -> Vec<u8> {
        format!("chk_stage/{execution_id}/{table}").into_bytes()
    }

    fn stage_rank(stage: CheckpointStage) -> u8 {
        match stage {
            CheckpointStage::BatchRead => 0,
            CheckpointStage::BatchWritten => 1,
            CheckpointStage::Committed => 2,
        }
    }

    fn wal_key(execution_id: &str, nanos: u128) -> Vec<u8> {
        format!("wal/{execution_id}/{nanos:020}").into_bytes()
    }

    fn wal_prefix(execution_id: &str) -> Vec<u8> {
        format!("wal/{execution_id}/").into_bytes()
    }

    fn task_exec_key(execution_id: &str) -> Vec<u8> {
        format!("texec/{execution_id}").into_bytes()
    }

    fn table_exec_key(execution_id: &str, table: &str) -> Vec<u8> {
        format!("tblexec/{execution_id}/{table}").into_bytes()
    }
}

#[async_trait]
impl StateStore for SledStateStore {
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let key = Self::chk_key(&checkpoint.execution_id, &checkpoint.table);
        let stage_key = Self::stage_key(&checkpoint.execution_id, &checkpoint.table);
        let encoded = bincode::serialize(checkpoint)?;
        let incoming_rank = Self::stage_rank(checkpoint.stage);
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            db.transaction::<_, _, sled::Error>(|tx| {
                let current_rank = tx
                    .get(&stage_key)?
                    .and_then(|bytes| bytes.first().copied())
                    .unwrap_or(0);
                if incoming_rank < current_rank {
                    return Ok(());
                }
                tx.insert(stage_key.as_slice(), &[incoming_rank][..])?;
                tx.insert(key.as_slice(), encoded.as_slice())?;
                Ok(())
            })
        })
        .await?
        .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;
        Ok(())
    }

    async fn load_checkpoint(
        &self,
        execution_id: &str,
        table: &str,
    ) -> Result<Option<Checkpoint>, Box<dyn StdError + Send + Sync>> {
        let key = Self::chk_key(execution_id, table);
        match self.db.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn append_wal(&self, entry: &WalEntry) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        let key = Self::wal_key(entry.execution_id(), nanos);
        let encoded = bincode::serialize(entry)?;
        self.db.insert(key, encoded)?;
        Ok(())
    }

    async fn iter_wal(&self, execution_id: &str) -> Result<Vec<WalEntry>, Box<dyn StdError + Send + Sync>> {
        let prefix = Self::wal_prefix(execution_id);
        let mut entries = Vec::new();
        for item in self.db.scan_prefix(prefix) {
            let (_, value) = item?;
            entries.push(bincode::deserialize(&value)?);
        }
        Ok(entries)
    }

    async fn save_task_execution(&self, execution: &TaskExecution) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let key = Self::task_exec_key(&execution.id);
        let encoded = bincode::serialize(execution)?;
        self.db.insert(key, encoded)?;
        Ok(())
    }

    async fn load_task_execution(
        &self,
        execution_id: &str,
    ) -> Result<Option<TaskExecution>, Box<dyn StdError + Send + Sync>> {
        let key = Self::task_exec_key(execution_id);
        match self.db.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn save_table_execution(&self, execution: &TableExecution) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let key = Self::table_exec_key(&execution.execution_id, &execution.table);
        let encoded = bincode::serialize(execution)?;
        self.db.insert(key, encoded)?;
        Ok(())
    }

    async fn load_table_execution(
        &self,
        execution_id: &str,
        table: &str,
    ) -> Result<Option<TableExecution>, Box<dyn StdError + Send + Sync>> {
        let key = Self::table_exec_key(execution_id, table);
        match self.db.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn checkpoint(stage: CheckpointStage) -> Checkpoint {
        Checkpoint {
            execution_id: "exec-1".to_string(),
            table: "orders".to_string(),
            stage,
            rows_done: 10,
            last_offset: 10,
            last_cdc_cursor: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn keeps_committed_over_earlier_batch_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStateStore::open(dir.path()).unwrap();
        store
            .save_checkpoint(&checkpoint(CheckpointStage::Committed))
            .await
            .unwrap();
        store
            .save_checkpoint(&checkpoint(CheckpointStage::BatchRead))
            .await
            .unwrap();
        let loaded = store.load_checkpoint("exec-1", "orders").await.unwrap().unwrap();
        assert_eq!(loaded.stage, CheckpointStage::Committed);
    }

    #[tokio::test]
    async fn advances_forward_through_stages() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStateStore::open(dir.path()).unwrap();
        store
            .save_checkpoint(&checkpoint(CheckpointStage::BatchRead))
            .await
            .unwrap();
        store
            .save_checkpoint(&checkpoint(CheckpointStage::Committed))
            .await
            .unwrap();
        let loaded = store.load_checkpoint("exec-1", "orders").await.unwrap().unwrap();
        assert_eq!(loaded.stage, CheckpointStage::Committed);
    }

    #[tokio::test]
    async fn wal_entries_are_returned_in_emission_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStateStore::open(dir.path()).unwrap();
        store
            .append_wal(&WalEntry::ExecutionStart {
                execution_id: "exec-1".to_string(),
            })
            .await
            .unwrap();
        store
            .append_wal(&WalEntry::TableStart {
                execution_id: "exec-1".to_string(),
                table: "orders".to_string(),
            })
            .await
            .unwrap();
        let entries = store.iter_wal("exec-1").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0], WalEntry::ExecutionStart { .. }));
        assert!(matches!(entries[1], WalEntry::TableStart { .. }));
    }
}
