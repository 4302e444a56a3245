use thiserror::Error;

/// Errors raised while mutating the in-memory data model itself (not
/// adapter I/O, which lives in `connectors::AdapterError`).
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("duplicate table '{0}' in source_tables")]
    DuplicateTable(String),

    #[error("invalid global variable name '{0}'")]
    InvalidVariableName(String),

    #[error("table '{0}' referenced in table_overrides is not in source_tables")]
    UnknownTableOverride(String),
}
