/// Non-fatal observations gathered while validating a task, surfaced to
/// the caller alongside a successfully validated task.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}
