use model::connector::Connector;
use model::task::Task;

/// A `Task` that has passed `TaskValidator::validate`, paired with the
/// two connectors it references. The executor only ever runs a
/// `ValidatedTask`, never a raw one.
#[derive(Debug, Clone)]
pub struct ValidatedTask {
    pub task: Task,
    pub source_connector: Connector,
    pub destination_connector: Connector,
}

/// Per-table cascade of task-level defaults, per the settings-cascade
/// pattern: a table with no override inherits `enabled = true` and an
/// empty transform list; an override replaces both together, it never
/// merges field-by-field.
#[derive(Debug, Clone, Default)]
pub struct TableSettings {
    pub enabled: bool,
    pub transformations: Vec<model::transform::TransformSpec>,
}

impl ValidatedTask {
    pub fn table_settings(&self, table: &str) -> TableSettings {
        match self.task.table_overrides.get(table) {
            Some(o) => TableSettings {
                enabled: o.enabled,
                transformations: o.transformations.clone(),
            },
            None => TableSettings {
                enabled: true,
                transformations: Vec::new(),
            },
        }
    }
}
