use async_trait::async_trait;

/// Narrow reporting surface the table pipeline pushes progress and
/// warnings through, independent of whatever actually consumes them (an
/// `EventBus` publisher in production, a `Vec` collector in tests).
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn on_batch_committed(&self, table: &str, rows: u64, percent_complete: f64);
    async fn on_warning(&self, table: &str, message: &str);
}

/// `ProgressSink` that forwards to an `EventBus` and logs warnings.
pub struct EventBusSink {
    bus: std::sync::Arc<crate::event_bus::EventBus>,
    execution_id: String,
}

impl EventBusSink {
    pub fn new(bus: std::sync::Arc<crate::event_bus::EventBus>, execution_id: impl Into<String>) -> Self {
        EventBusSink {
            bus,
            execution_id: execution_id.into(),
        }
    }
}

#[async_trait]
impl ProgressSink for EventBusSink {
    async fn on_batch_committed(&self, table: &str, rows: u64, percent_complete: f64) {
        self.bus.publish(crate::event_bus::TableProgressEvent {
            execution_id: self.execution_id.clone(),
            table: table.to_string(),
            rows_committed: rows,
            percent_complete,
        });
    }

    async fn on_warning(&self, table: &str, message: &str) {
        tracing::warn!(execution_id = %self.execution_id, table, message, "pipeline warning");
    }
}
