use super::block::BlockProcessor;
use super::mempool::{MempoolOutcome, MempoolReconciler};
use crate::btc::PeerClientRef;
use crate::cc::AssetCodecRef;
use crate::config::IndexerConfigRef;
use crate::db::{ChainHead, StateStoreRef, UndoLogRef};
use crate::error::{IndexError, IndexResult};
use crate::event::{EventBusRef, IndexEvent};
use crate::status::{SyncPhase, SyncStatusManagerRef};
use bitcoincore_rpc::bitcoin::Block;
use std::time::Duration;
use tokio::sync::watch;

/// Classification of the candidate block at the next height.
#[derive(Debug)]
pub enum BlockState {
    NotExists,
    Good(Block),
    Forked(Block),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    MempoolSynced(MempoolOutcome),
    BlockApplied(ChainHead),
    BlockReverted {
        height: u32,
        head: Option<ChainHead>,
    },
}

pub struct ChainSyncEngine {
    config: IndexerConfigRef,
    peer: PeerClientRef,
    store: StateStoreRef,
    blocks: BlockProcessor,
    mempool: MempoolReconciler,
    status: SyncStatusManagerRef,
    events: EventBusRef,
    shutdown_tx: watch::Sender<bool>,
}

impl ChainSyncEngine {
    pub fn new(
        config: IndexerConfigRef,
        peer: PeerClientRef,
        store: StateStoreRef,
        undo_log: UndoLogRef,
        codec: AssetCodecRef,
        status: SyncStatusManagerRef,
        events: EventBusRef,
    ) -> Self {
        let network = config.btc.network();
        let blocks = BlockProcessor::new(
            network,
            store.clone(),
            undo_log.clone(),
            codec.clone(),
            events.clone(),
        );
        let mempool = MempoolReconciler::new(
            network,
            peer.clone(),
            store.clone(),
            undo_log,
            codec,
            events.clone(),
        );
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            peer,
            store,
            blocks,
            mempool,
            status,
            events,
            shutdown_tx,
        }
    }

    fn next_height(&self) -> IndexResult<u32> {
        let ret = match self.store.get_chain_head()? {
            Some(head) => head.height + 1,
            None => self.config.start_height(),
        };

        Ok(ret)
    }

    pub async fn classify(&self, height: u32) -> IndexResult<BlockState> {
        let hash = match self.peer.get_block_hash(height).await {
            Ok(hash) => hash,
            Err(IndexError::HeightNotFound(_)) => return Ok(BlockState::NotExists),
            Err(e) => return Err(e),
        };
        let block = self.peer.get_block(&hash).await?;

        let stored = match height.checked_sub(1) {
            Some(prev) => self.store.get_block_hash(prev)?,
            None => None,
        };

        match stored {
            Some(prev_hash) if prev_hash != block.header.prev_blockhash.to_string() => {
                warn!(
                    "Fork at height {}: stored {} but block {} builds on {}",
                    height,
                    prev_hash,
                    hash,
                    block.header.prev_blockhash
                );
                Ok(BlockState::Forked(block))
            }
            _ => Ok(BlockState::Good(block)),
        }
    }

    async fn wait_for_rescan(&self) -> IndexResult<()> {
        let poll = Duration::from_millis(self.config.sync.busy_poll_ms);
        self.status.update_phase(SyncPhase::WaitingRescan);
        info!("Waiting for bitcoind to finish rescanning imported addresses");

        while self.peer.is_busy().await? {
            tokio::time::sleep(poll).await;
        }

        info!("Rescan complete, resuming sync");
        Ok(())
    }

    /// Run one cycle: one block applied, one block reverted or one mempool pass.
    pub async fn advance_once(&self) -> IndexResult<CycleOutcome> {
        if self.status.take_rescan_request() {
            if let Err(e) = self.wait_for_rescan().await {
                // Keep the gate closed for the next cycle
                self.status.request_rescan();
                return Err(e);
            }
        }

        let height = self.next_height()?;
        let state = self.classify(height).await?;
        debug!(
            "Sync cycle at height {}: {}",
            height,
            match &state {
                BlockState::NotExists => "not exists",
                BlockState::Good(_) => "good",
                BlockState::Forked(_) => "forked",
            }
        );

        let outcome = match state {
            BlockState::NotExists => {
                let outcome = self.mempool.reconcile().await?;
                if outcome.added > 0 || outcome.reverted > 0 {
                    info!(
                        "Mempool synced: {} added, {} reverted, {} tracked",
                        outcome.added, outcome.reverted, outcome.total
                    );
                }
                self.status.update_mempool(outcome.total);
                self.status.update_phase(SyncPhase::Synced);
                CycleOutcome::MempoolSynced(outcome)
            }
            BlockState::Good(block) => {
                self.mempool.unwind_all()?;
                self.status.update_mempool(0);

                let head = self.blocks.apply_block(height, &block)?;
                info!(
                    "Applied block {} {}",
                    head.height,
                    head.hash.as_deref().unwrap_or_default()
                );
                self.status.update_head(Some(&head));
                self.status.update_phase(SyncPhase::Syncing);
                CycleOutcome::BlockApplied(head)
            }
            BlockState::Forked(_) => {
                // The candidate was never applied, roll back the block below it
                let revert_height = height - 1;
                self.mempool.unwind_all()?;
                self.status.update_mempool(0);

                let head = self.blocks.revert_block(revert_height)?;
                self.status.update_head(head.as_ref());
                self.status.update_phase(SyncPhase::Syncing);
                CycleOutcome::BlockReverted {
                    height: revert_height,
                    head,
                }
            }
        };

        self.status.update_error(None);
        self.events.publish(IndexEvent::Info(self.status.get_info()));
        Ok(outcome)
    }

    // Sleep unless shutdown is requested first, returns false on shutdown
    async fn pause(&self, rx: &mut watch::Receiver<bool>, delay_ms: u64) -> bool {
        if delay_ms == 0 {
            return !*rx.borrow();
        }

        let changed = tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => false,
            _ = rx.changed() => true,
        };

        !changed && !*rx.borrow()
    }

    /// Loop until `shutdown` is called. Failed cycles are logged and retried
    /// from the persisted head.
    pub async fn run_forever(&self) {
        let mut rx = self.shutdown_tx.subscribe();
        let sync = &self.config.sync;
        info!(
            "Chain sync engine started at height {}",
            self.next_height()
                .map(|h| h.to_string())
                .unwrap_or_else(|e| e.to_string())
        );

        loop {
            if *rx.borrow() {
                break;
            }

            let delay = match self.advance_once().await {
                Ok(CycleOutcome::MempoolSynced(outcome)) => {
                    if outcome.added == 0 && outcome.reverted == 0 {
                        sync.idle_delay_ms
                    } else {
                        0
                    }
                }
                Ok(_) => 0,
                Err(e) if e.is_fatal() => {
                    error!("Sync halted, operator intervention required: {}", e);
                    self.status.update_error(Some(e.to_string()));
                    sync.fatal_delay_ms
                }
                Err(e) => {
                    warn!("Sync cycle failed, retrying: {}", e);
                    self.status.update_error(Some(e.to_string()));
                    sync.error_delay_ms
                }
            };

            if !self.pause(&mut rx, delay).await {
                break;
            }
        }

        info!("Chain sync engine stopped");
    }

    pub fn shutdown(&self) {
        info!("Shutdown requested for chain sync engine");
        self.shutdown_tx.send_replace(true);
    }
}

pub type ChainSyncEngineRef = std::sync::Arc<ChainSyncEngine>;
