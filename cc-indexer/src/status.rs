use crate::db::ChainHead;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Initializing,
    Syncing,
    Synced,
    WaitingRescan,
}

/// Snapshot of the indexer progress served by `getInfo` and the `info` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfo {
    pub phase: SyncPhase,
    pub last_block_height: Option<u32>,
    pub last_block_hash: Option<String>,
    pub last_block_timestamp: Option<u32>,
    pub mempool_txs: usize,
    pub last_error: Option<String>,
}

impl Default for SyncInfo {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Initializing,
            last_block_height: None,
            last_block_hash: None,
            last_block_timestamp: None,
            mempool_txs: 0,
            last_error: None,
        }
    }
}

/// Owned by the sync engine, read by the query facade. Also carries the
/// rescan gate set by `importAddresses`.
pub struct SyncStatusManager {
    info: watch::Sender<SyncInfo>,
    rescan_pending: AtomicBool,
}

impl SyncStatusManager {
    pub fn new(head: Option<&ChainHead>) -> Self {
        let mut info = SyncInfo::default();
        if let Some(head) = head {
            info.last_block_height = Some(head.height);
            info.last_block_hash = head.hash.clone();
            info.last_block_timestamp = head.timestamp;
        }

        let (info, _) = watch::channel(info);
        Self {
            info,
            rescan_pending: AtomicBool::new(false),
        }
    }

    pub fn get_info(&self) -> SyncInfo {
        self.info.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncInfo> {
        self.info.subscribe()
    }

    pub fn update_head(&self, head: Option<&ChainHead>) {
        self.info.send_modify(|info| {
            info.last_block_height = head.map(|h| h.height);
            info.last_block_hash = head.and_then(|h| h.hash.clone());
            info.last_block_timestamp = head.and_then(|h| h.timestamp);
        });
    }

    pub fn update_phase(&self, phase: SyncPhase) {
        self.info.send_modify(|info| info.phase = phase);
    }

    pub fn update_mempool(&self, count: usize) {
        self.info.send_modify(|info| info.mempool_txs = count);
    }

    pub fn update_error(&self, error: Option<String>) {
        self.info.send_modify(|info| info.last_error = error);
    }

    pub fn request_rescan(&self) {
        self.rescan_pending.store(true, Ordering::SeqCst);
    }

    /// Returns true once per request.
    pub fn take_rescan_request(&self) -> bool {
        self.rescan_pending.swap(false, Ordering::SeqCst)
    }
}

pub type SyncStatusManagerRef = std::sync::Arc<SyncStatusManager>;
