use crate::error::CliError;
use model::connector::Connector;
use model::task::Task;
use model::variable::GlobalVariable;
use serde::Deserialize;

/// On-disk shape of a task definition, standing in for the out-of-scope
/// CRUD surface: a task plus the two connectors it names, already
/// resolved into literal values rather than the `source_connector`/
/// `destination_connector` name references stored on `Task` itself.
#[derive(Debug, Deserialize)]
pub struct TaskConfigFile {
    pub task: Task,
    pub source_connector: Connector,
    pub destination_connector: Connector,
    #[serde(default)]
    pub global_variables: Vec<GlobalVariable>,
}

impl TaskConfigFile {
    pub fn load(path: &str) -> Result<Self, CliError> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(CliError::ConfigDeserialize)
    }
}
