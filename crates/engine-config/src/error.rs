use thiserror::Error;

/// Rejections raised while validating a raw `Task` plus its connectors
/// before it is handed to the task executor.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("parallel_tables must be at least 1")]
    ParallelTablesZero,

    #[error("source_tables contains a duplicate entry: {0}")]
    DuplicateSourceTable(String),

    #[error("batch_policy.batch_rows must be at least 1")]
    BatchRowsZero,

    #[error("schedule is Interval but seconds is 0")]
    ScheduleIntervalZero,

    #[error("connector {name} is a {actual:?} connector, expected a {expected:?}")]
    ConnectorKindMismatch {
        name: String,
        expected: model::connector::ConnectorKind,
        actual: model::connector::ConnectorKind,
    },
}
