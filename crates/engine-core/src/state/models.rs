use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The durable checkpoint for one table within one execution: enough to
/// resume a full load at the right offset, or a CDC poll at the right
/// cursor, after a crash or cooperative stop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub execution_id: String,
    pub table: String,
    pub stage: CheckpointStage,
    pub rows_done: u64,
    pub last_offset: u64,
    pub last_cdc_cursor: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum CheckpointStage {
    BatchRead,
    BatchWritten,
    Committed,
}

/// Append-only log of what happened, used by the progress service to
/// reconstruct a table's state without re-deriving it from checkpoints
/// alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalEntry {
    ExecutionStart {
        execution_id: String,
    },
    TableStart {
        execution_id: String,
        table: String,
    },
    BatchCommitted {
        execution_id: String,
        table: String,
        rows: u64,
    },
    TableDone {
        execution_id: String,
        table: String,
    },
    /// A table's pipeline hit a retryable failure mid-batch and is
    /// starting over from scratch, discarding whatever it had processed
    /// this attempt. Lets `ProgressService` zero out the rows a failed
    /// attempt had already counted instead of adding the restarted
    /// attempt's rows on top of them.
    TableRestarted {
        execution_id: String,
        table: String,
    },
    ExecutionDone {
        execution_id: String,
    },
    Heartbeat {
        execution_id: String,
        table: String,
    },
}

impl WalEntry {
    pub fn execution_id(&self) -> &str {
        match self {
            WalEntry::ExecutionStart { execution_id }
            | WalEntry::TableStart { execution_id, .. }
            | WalEntry::BatchCommitted { execution_id, .. }
            | WalEntry::TableDone { execution_id, .. }
            | WalEntry::TableRestarted { execution_id, .. }
            | WalEntry::ExecutionDone { execution_id }
            | WalEntry::Heartbeat { execution_id, .. } => execution_id,
        }
    }
}
