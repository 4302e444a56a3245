use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::warn;

/// Marker for anything that can travel over the bus. Kept as a trait
/// object per subscriber type so progress, CDC, and drift events can
/// share one dispatcher.
pub trait Event: Send + Sync + Clone + 'static {}

type Subscriber<E> = mpsc::Sender<E>;

/// In-process publish/subscribe dispatcher. A `ProgressSink` implementation
/// is typically one subscriber consuming `TableProgressEvent`s and
/// forwarding them to the CLI or a log line.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<TypeId, HashMap<u64, Box<dyn Any + Send + Sync>>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus::default()
    }

    pub fn subscribe<E: Event>(&self, buffer: usize) -> mpsc::Receiver<E> {
        let (tx, rx) = mpsc::channel(buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.subscribers.write().unwrap();
        subscribers
            .entry(TypeId::of::<E>())
            .or_default()
            .insert(id, Box::new(tx) as Box<dyn Any + Send + Sync>);
        rx
    }

    pub fn publish<E: Event>(&self, event: E) {
        let subscribers = self.subscribers.read().unwrap();
        let Some(typed) = subscribers.get(&TypeId::of::<E>()) else {
            return;
        };
        for boxed in typed.values() {
            if let Some(tx) = boxed.downcast_ref::<Subscriber<E>>() {
                if tx.try_send(event.clone()).is_err() {
                    warn!("event bus subscriber channel full or closed, dropping event");
                }
            }
        }
    }
}

/// Emitted once per committed batch, the unit the CLI's progress command
/// and the lifecycle controller's status cache both consume.
#[derive(Debug, Clone)]
pub struct TableProgressEvent {
    pub execution_id: String,
    pub table: String,
    pub rows_committed: u64,
    pub percent_complete: f64,
}

impl Event for TableProgressEvent {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn published_event_reaches_subscriber() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe::<TableProgressEvent>(4);
        bus.publish(TableProgressEvent {
            execution_id: "exec-1".to_string(),
            table: "orders".to_string(),
            rows_committed: 100,
            percent_complete: 50.0,
        });
        let received = rx.recv().await.unwrap();
        assert_eq!(received.table, "orders");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_a_noop() {
        let bus = EventBus::new();
        bus.publish(TableProgressEvent {
            execution_id: "exec-1".to_string(),
            table: "orders".to_string(),
            rows_committed: 1,
            percent_complete: 1.0,
        });
    }
}
