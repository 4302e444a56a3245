use async_trait::async_trait;
use engine_core::ProgressSink;
use tracing::{info, warn};

/// `ProgressSink` for the foreground `run` command: no WebSocket/HTTP
/// transport exists at this layer, so progress is simply logged.
pub struct LoggingProgressSink;

#[async_trait]
impl ProgressSink for LoggingProgressSink {
    async fn on_batch_committed(&self, table: &str, rows: u64, percent_complete: f64) {
        info!(table, rows, percent_complete, "batch committed");
    }

    async fn on_warning(&self, table: &str, message: &str) {
        warn!(table, message, "pipeline warning");
    }
}
