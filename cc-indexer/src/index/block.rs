use super::delta::process_transaction;
use crate::btc::CCTransaction;
use crate::cc::AssetCodecRef;
use crate::db::{BlockUndo, ChainHead, StateStoreRef, UndoLogRef, UtxoDelta};
use crate::error::{IndexError, IndexResult};
use crate::event::{BlockSummary, EventBusRef, IndexEvent};
use bitcoincore_rpc::bitcoin::{Block, Network};

pub struct BlockProcessor {
    network: Network,
    store: StateStoreRef,
    undo_log: UndoLogRef,
    codec: AssetCodecRef,
    events: EventBusRef,
}

impl BlockProcessor {
    pub fn new(
        network: Network,
        store: StateStoreRef,
        undo_log: UndoLogRef,
        codec: AssetCodecRef,
        events: EventBusRef,
    ) -> Self {
        Self {
            network,
            store,
            undo_log,
            codec,
            events,
        }
    }

    /// Apply the block at `height`. Transactions are processed strictly in
    /// block order, the undo entry is synced before the state batch moves the
    /// chain head.
    pub fn apply_block(&self, height: u32, block: &Block) -> IndexResult<ChainHead> {
        let block_hash = block.block_hash().to_string();
        let mut delta = UtxoDelta::default();
        let mut txs = Vec::with_capacity(block.txdata.len());

        for raw_tx in &block.txdata {
            let mut tx = CCTransaction::decode(raw_tx, self.network, &**self.codec);
            process_transaction(
                &self.store,
                &**self.codec,
                &mut tx,
                height as i64,
                &mut delta,
            )?;
            txs.push(tx);
        }

        let txids: Vec<String> = txs.iter().map(|tx| tx.txid.clone()).collect();
        let colored = txs.iter().filter(|tx| tx.is_colored()).count();
        debug!(
            "Block {} {}: {} txs, {} colored, {} used, {} unused",
            height,
            block_hash,
            txs.len(),
            colored,
            delta.used.len(),
            delta.unused.len()
        );

        let head = ChainHead {
            height,
            hash: Some(block_hash.clone()),
            timestamp: Some(block.header.time),
        };

        let undo = BlockUndo::new(delta, txids);
        self.undo_log.put_block_undo(height, &undo)?;

        let delta = UtxoDelta {
            used: undo.used,
            unused: undo.unused,
        };
        self.store.apply_block(&head, &delta)?;

        for tx in &txs {
            self.events.publish_transaction(tx);
        }
        self.events.publish(IndexEvent::NewBlock(BlockSummary {
            height,
            hash: block_hash,
            previous_block_hash: block.header.prev_blockhash.to_string(),
            timestamp: block.header.time,
            txids: undo.txids,
        }));

        Ok(head)
    }

    /// Undo the block at `height` using its undo entry. Returns the new head.
    pub fn revert_block(&self, height: u32) -> IndexResult<Option<ChainHead>> {
        let undo = self.undo_log.get_block_undo(height)?.ok_or_else(|| {
            let msg = format!("No undo entry for block {}", height);
            error!("{}", msg);
            IndexError::UndoLogMissing(msg)
        })?;

        let head = self.store.revert_block(height, &undo)?;
        info!(
            "Reverted block {}: restored {} outputs, removed {} outputs",
            height,
            undo.used.len(),
            undo.unused.len()
        );

        Ok(head)
    }
}
