use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionType {
    FullLoad,
    CdcSync,
    FullLoadThenCdc,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
    PartialSuccess,
    Stopped,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TableStatus {
    Pending,
    Running,
    Success,
    Failed,
    Stopped,
}

/// Structured failure detail attached to a failed execution or table, so
/// a caller can show the user what happened without parsing log text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDetails {
    pub kind: String,
    pub table: Option<String>,
    pub retry_count: u32,
    pub last_cursor: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionCounters {
    pub total_rows: u64,
    pub processed_rows: u64,
    pub failed_rows: u64,
    pub data_size_mb: f64,
    pub rows_per_second: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskExecution {
    pub id: String,
    pub task_id: String,
    pub execution_type: ExecutionType,
    pub status: ExecutionStatus,
    pub counters: ExecutionCounters,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub error_details: Option<ErrorDetails>,
    pub cdc_lsn_start: Option<String>,
    pub cdc_lsn_end: Option<String>,
}

impl TaskExecution {
    pub fn new(id: String, task_id: String, execution_type: ExecutionType) -> Self {
        TaskExecution {
            id,
            task_id,
            execution_type,
            status: ExecutionStatus::Pending,
            counters: ExecutionCounters::default(),
            started_at: Utc::now(),
            ended_at: None,
            error_message: None,
            error_details: None,
            cdc_lsn_start: None,
            cdc_lsn_end: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ExecutionStatus::Success
                | ExecutionStatus::Failed
                | ExecutionStatus::PartialSuccess
                | ExecutionStatus::Stopped
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableExecution {
    pub execution_id: String,
    pub table: String,
    pub total_rows: u64,
    pub processed_rows: u64,
    pub failed_rows: u64,
    pub status: TableStatus,
    pub retry_count: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl TableExecution {
    pub fn new(execution_id: String, table: String) -> Self {
        TableExecution {
            execution_id,
            table,
            total_rows: 0,
            processed_rows: 0,
            failed_rows: 0,
            status: TableStatus::Pending,
            retry_count: 0,
            last_retry_at: None,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// Invariant: `processed_rows <= total_rows` once `total_rows > 0`.
    pub fn is_consistent(&self) -> bool {
        if self.total_rows == 0 {
            return true;
        }
        self.processed_rows <= self.total_rows
            && self.processed_rows + self.failed_rows <= self.total_rows
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_rows == 0 {
            return match self.status {
                TableStatus::Success => 100.0,
                _ => 0.0,
            };
        }
        (self.processed_rows as f64 / self.total_rows as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_total_rows_is_always_consistent() {
        let te = TableExecution::new("e1".into(), "dbo.Empty".into());
        assert!(te.is_consistent());
    }

    #[test]
    fn processed_rows_over_total_is_inconsistent() {
        let mut te = TableExecution::new("e1".into(), "dbo.Orders".into());
        te.total_rows = 10;
        te.processed_rows = 11;
        assert!(!te.is_consistent());
    }
}
