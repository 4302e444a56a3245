use thiserror::Error;

/// Error taxonomy for both Source and Destination adapters. `is_retryable` is consulted by `engine_core::retry` to decide
/// whether a failure should burn a retry attempt or fail the table
/// immediately.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("feature not enabled: {0}")]
    NotEnabled(String),

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("write error: {0}")]
    WriteError(String),

    #[error("schema drift error: {0}")]
    SchemaDriftError(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

impl AdapterError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdapterError::Transient(_)
                | AdapterError::ConnectionFailed(_)
                | AdapterError::WriteError(_)
        )
    }
}
