pub mod models;
pub mod sled_store;

pub use models::{Checkpoint, CheckpointStage, WalEntry};
pub use sled_store::SledStateStore;

use async_trait::async_trait;
use model::execution::{TableExecution, TaskExecution};
use std::error::Error as StdError;

/// Persistence contract the runtime uses for checkpoints, the WAL, and
/// the execution records the `status` command and API layer read back.
/// Kept deliberately narrow so an in-memory test double is trivial to
/// write.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), Box<dyn StdError + Send + Sync>>;
    async fn load_checkpoint(
        &self,
        execution_id: &str,
        table: &str,
    ) -> Result<Option<Checkpoint>, Box<dyn StdError + Send + Sync>>;
    async fn append_wal(&self, entry: &WalEntry) -> Result<(), Box<dyn StdError + Send + Sync>>;
    async fn iter_wal(&self, execution_id: &str) -> Result<Vec<WalEntry>, Box<dyn StdError + Send + Sync>>;

    async fn save_task_execution(&self, execution: &TaskExecution) -> Result<(), Box<dyn StdError + Send + Sync>>;
    async fn load_task_execution(
        &self,
        execution_id: &str,
    ) -> Result<Option<TaskExecution>, Box<dyn StdError + Send + Sync>>;

    async fn save_table_execution(&self, execution: &TableExecution) -> Result<(), Box<dyn StdError + Send + Sync>>;
    async fn load_table_execution(
        &self,
        execution_id: &str,
        table: &str,
    ) -> Result<Option<TableExecution>, Box<dyn StdError + Send + Sync>>;
}
