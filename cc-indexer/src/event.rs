use crate::btc::CCTransaction;
use crate::status::{SyncInfo, SyncStatusManagerRef};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    pub height: u32,
    pub hash: String,
    pub previous_block_hash: String,
    pub timestamp: u32,
    pub txids: Vec<String>,
}

/// Domain events, serialized as `{"event": "<name>", "data": ...}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum IndexEvent {
    NewBlock(BlockSummary),
    NewTransaction(CCTransaction),
    NewCCTransaction(CCTransaction),
    Info(SyncInfo),
}

impl IndexEvent {
    pub fn name(&self) -> &'static str {
        match self {
            IndexEvent::NewBlock(_) => "newblock",
            IndexEvent::NewTransaction(_) => "newtransaction",
            IndexEvent::NewCCTransaction(_) => "newcctransaction",
            IndexEvent::Info(_) => "info",
        }
    }
}

pub struct EventBus {
    sender: broadcast::Sender<IndexEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: IndexEvent) {
        // No subscriber is fine
        if let Err(e) = self.sender.send(event) {
            trace!("Event {} dropped, no subscribers", e.0.name());
        }
    }

    /// Publish a transaction, plus the colored variant when it carries assets.
    pub fn publish_transaction(&self, tx: &CCTransaction) {
        if self.sender.receiver_count() == 0 {
            return;
        }

        if tx.is_colored() {
            self.publish(IndexEvent::NewCCTransaction(tx.clone()));
        }
        self.publish(IndexEvent::NewTransaction(tx.clone()));
    }
}

pub type EventBusRef = Arc<EventBus>;

/// Emit `info` every `interval` until the task is aborted.
pub fn spawn_info_heartbeat(
    events: EventBusRef,
    status: SyncStatusManagerRef,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            events.publish(IndexEvent::Info(status.get_info()));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::SyncStatusManager;

    #[test]
    fn test_event_serialization() {
        let event = IndexEvent::NewBlock(BlockSummary {
            height: 1,
            hash: "aa".to_string(),
            previous_block_hash: "bb".to_string(),
            timestamp: 2,
            txids: vec!["cc".to_string()],
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "newblock");
        assert_eq!(value["data"]["previousBlockHash"], "bb");

        let event = IndexEvent::Info(SyncInfo::default());
        assert_eq!(serde_json::to_value(&event).unwrap()["event"], "info");
    }

    #[tokio::test]
    async fn test_heartbeat() {
        let events = Arc::new(EventBus::new());
        let status = Arc::new(SyncStatusManager::new(None));
        let mut rx = events.subscribe();

        let handle = spawn_info_heartbeat(events.clone(), status, Duration::from_millis(10));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "info");
        handle.abort();
    }
}
