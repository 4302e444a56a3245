use thiserror::Error;

/// Aggregate error type for the orchestration layer: state persistence,
/// retry exhaustion, and whatever an adapter or transform below it
/// raised, composed with `#[from]`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("state store error: {0}")]
    StateStore(String),

    #[error(transparent)]
    Adapter(#[from] connectors::AdapterError),

    #[error(transparent)]
    Transform(#[from] transforms::TransformError),

    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("cancelled")]
    Cancelled,
}
