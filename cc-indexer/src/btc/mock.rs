use super::client::{PeerClient, PeerInfo, PeerUnspent, PeerWalletTx};
use crate::error::{IndexError, IndexResult};
use bitcoincore_rpc::bitcoin::block::{Header, Version};
use bitcoincore_rpc::bitcoin::hashes::Hash;
use bitcoincore_rpc::bitcoin::{
    Block, BlockHash, CompactTarget, Transaction, TxMerkleNode, Txid,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockState {
    // height -> block
    chain: HashMap<u32, Block>,
    mempool: Vec<Txid>,
    txs: HashMap<Txid, Transaction>,
    imported: Vec<(String, String, bool)>,
    unspent: Vec<PeerUnspent>,
    wallet_txs: Vec<PeerWalletTx>,
    busy_polls: u32,
    broadcast: Vec<String>,
    offline: bool,
}

/// In-memory full node used by the engine and facade tests.
#[derive(Default, Clone)]
pub struct MockPeer {
    state: Arc<Mutex<MockState>>,
}

pub fn make_block(prev: BlockHash, nonce: u32, txdata: Vec<Transaction>) -> Block {
    Block {
        header: Header {
            version: Version::TWO,
            prev_blockhash: prev,
            merkle_root: TxMerkleNode::all_zeros(),
            time: 1_600_000_000 + nonce,
            bits: CompactTarget::from_consensus(0x207fffff),
            nonce,
        },
        txdata,
    }
}

impl MockPeer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_block(&self, height: u32, block: Block) {
        let mut state = self.state.lock().unwrap();
        for tx in &block.txdata {
            state.txs.insert(tx.compute_txid(), tx.clone());
        }
        state.chain.insert(height, block);
    }

    /// Drop every block above `height`, simulating a reorg before the new
    /// branch is attached.
    pub fn truncate(&self, height: u32) {
        self.state.lock().unwrap().chain.retain(|h, _| *h <= height);
    }

    pub fn set_mempool(&self, txs: Vec<Transaction>) {
        let mut state = self.state.lock().unwrap();
        state.mempool = txs.iter().map(|tx| tx.compute_txid()).collect();
        for tx in txs {
            state.txs.insert(tx.compute_txid(), tx);
        }
    }

    pub fn set_busy_polls(&self, polls: u32) {
        self.state.lock().unwrap().busy_polls = polls;
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn set_unspent(&self, unspent: Vec<PeerUnspent>) {
        self.state.lock().unwrap().unspent = unspent;
    }

    pub fn set_wallet_txs(&self, txs: Vec<PeerWalletTx>) {
        self.state.lock().unwrap().wallet_txs = txs;
    }

    pub fn imported(&self) -> Vec<(String, String, bool)> {
        self.state.lock().unwrap().imported.clone()
    }

    pub fn broadcast(&self) -> Vec<String> {
        self.state.lock().unwrap().broadcast.clone()
    }

    fn check_online(&self) -> IndexResult<()> {
        if self.state.lock().unwrap().offline {
            return Err(IndexError::PeerUnavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PeerClient for MockPeer {
    async fn get_block_hash(&self, height: u32) -> IndexResult<BlockHash> {
        self.check_online()?;
        let state = self.state.lock().unwrap();
        state
            .chain
            .get(&height)
            .map(|b| b.block_hash())
            .ok_or(IndexError::HeightNotFound(height))
    }

    async fn get_block(&self, hash: &BlockHash) -> IndexResult<Block> {
        self.check_online()?;
        let state = self.state.lock().unwrap();
        state
            .chain
            .values()
            .find(|b| b.block_hash() == *hash)
            .cloned()
            .ok_or_else(|| IndexError::PeerUnavailable(format!("Block {} not found", hash)))
    }

    async fn get_raw_mempool(&self) -> IndexResult<Vec<Txid>> {
        self.check_online()?;
        Ok(self.state.lock().unwrap().mempool.clone())
    }

    async fn get_raw_transaction(&self, txid: &Txid) -> IndexResult<Transaction> {
        self.check_online()?;
        let state = self.state.lock().unwrap();
        state
            .txs
            .get(txid)
            .cloned()
            .ok_or_else(|| IndexError::PeerUnavailable(format!("Tx {} not found", txid)))
    }

    async fn import_address(&self, address: &str, label: &str, rescan: bool) -> IndexResult<()> {
        self.check_online()?;
        self.state
            .lock()
            .unwrap()
            .imported
            .push((address.to_string(), label.to_string(), rescan));
        Ok(())
    }

    async fn list_unspent(
        &self,
        min_conf: u32,
        max_conf: u32,
        addresses: &[String],
    ) -> IndexResult<Vec<PeerUnspent>> {
        self.check_online()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .unspent
            .iter()
            .filter(|u| u.confirmations >= min_conf && u.confirmations <= max_conf)
            .filter(|u| {
                u.address
                    .as_ref()
                    .map(|a| addresses.contains(a))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn list_transactions(
        &self,
        _label: &str,
        count: usize,
        skip: usize,
        _include_watch_only: bool,
    ) -> IndexResult<Vec<PeerWalletTx>> {
        self.check_online()?;
        let state = self.state.lock().unwrap();
        Ok(state.wallet_txs.iter().skip(skip).take(count).cloned().collect())
    }

    async fn send_raw_transaction(&self, tx_hex: &str) -> IndexResult<Txid> {
        self.check_online()?;
        self.state.lock().unwrap().broadcast.push(tx_hex.to_string());
        Ok(Txid::all_zeros())
    }

    async fn get_info(&self) -> IndexResult<PeerInfo> {
        self.check_online()?;
        let state = self.state.lock().unwrap();
        let tip = state.chain.keys().max().copied().unwrap_or(0);
        Ok(PeerInfo {
            chain: "regtest".to_string(),
            blocks: tip as u64,
            headers: tip as u64,
            best_block_hash: state
                .chain
                .get(&tip)
                .map(|b| b.block_hash().to_string())
                .unwrap_or_default(),
            verification_progress: 1.0,
            initial_block_download: false,
        })
    }

    async fn is_busy(&self) -> IndexResult<bool> {
        self.check_online()?;
        let mut state = self.state.lock().unwrap();
        if state.busy_polls > 0 {
            state.busy_polls -= 1;
            return Ok(true);
        }
        Ok(false)
    }
}
