use thiserror::Error;

/// Variable resolution errors. Callers that hit these are expected to
/// substitute the literal string `unknown` and emit a warning rather
/// than fail the batch.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("invalid variable name: {0}")]
    InvalidName(String),

    #[error("unresolvable variable: {0}")]
    Unresolvable(String),

    #[error("global variable query failed: {0}")]
    QueryFailed(String),

    #[error("circular or unparseable raw query: {0}")]
    RawQueryInvalid(String),
}
