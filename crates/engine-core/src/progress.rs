use crate::state::{CheckpointStage, StateStore, WalEntry};
use std::sync::Arc;

/// Coarse lifecycle stage for a single table within an execution,
/// derived from its WAL entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    NotStarted,
    Running,
    Done,
}

#[derive(Debug, Clone)]
pub struct ProgressStatus {
    pub stage: ProgressStage,
    pub rows_done: u64,
}

/// Read-side view over the state store, used by the CLI's `progress`
/// command and by the table pipeline to decide where to resume.
pub struct ProgressService {
    store: Arc<dyn StateStore>,
}

impl ProgressService {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        ProgressService { store }
    }

    pub async fn table_status(
        &self,
        execution_id: &str,
        table: &str,
    ) -> Result<ProgressStatus, Box<dyn std::error::Error + Send + Sync>> {
        let entries = self.store.iter_wal(execution_id).await?;
        let mut stage = ProgressStage::NotStarted;
        let mut rows_done = 0u64;
        for entry in entries {
            match entry {
                WalEntry::TableStart { table: t, .. } if t == table => {
                    stage = ProgressStage::Running;
                }
                WalEntry::BatchCommitted {
                    table: t, rows, ..
                } if t == table => {
                    rows_done += rows;
                }
                WalEntry::TableDone { table: t, .. } if t == table => {
                    stage = ProgressStage::Done;
                }
                WalEntry::TableRestarted { table: t, .. } if t == table => {
                    stage = ProgressStage::Running;
                    rows_done = 0;
                }
                _ => {}
            }
        }

        if let Some(checkpoint) = self.store.load_checkpoint(execution_id, table).await? {
            rows_done = rows_done.max(checkpoint.rows_done);
            if checkpoint.stage == CheckpointStage::Committed && stage == ProgressStage::NotStarted {
                stage = ProgressStage::Running;
            }
        }

        Ok(ProgressStatus { stage, rows_done })
    }
}
