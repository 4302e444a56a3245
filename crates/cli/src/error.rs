use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("failed to read config file: {0}")]
    ConfigFileRead(#[from] std::io::Error),

    #[error("failed to parse config file as JSON: {0}")]
    ConfigDeserialize(serde_json::Error),

    #[error("failed to serialize output to JSON: {0}")]
    JsonSerialize(serde_json::Error),

    #[error("task configuration rejected: {0}")]
    Config(#[from] engine_config::ConfigError),

    #[error("lifecycle controller error: {0}")]
    Controller(#[from] lifecycle::ControllerError),

    #[error("adapter error: {0}")]
    Adapter(#[from] connectors::AdapterError),

    #[error("could not determine home directory for state store")]
    NoHomeDirectory,

    #[error("state store error: {0}")]
    StateStore(String),

    #[error("shutdown requested")]
    ShutdownRequested,
}
