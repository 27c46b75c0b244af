use crate::error::IndexResult;
use bitcoincore_rpc::bitcoin::{Block, BlockHash, Transaction, Txid};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One entry of `listunspent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerUnspent {
    pub txid: String,
    pub vout: u32,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(rename = "scriptPubKey", default)]
    pub script_pub_key: String,
    // BTC
    pub amount: f64,
    pub confirmations: u32,
}

/// One entry of `listtransactions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerWalletTx {
    pub txid: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub confirmations: i64,
}

/// Subset of `getblockchaininfo`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PeerInfo {
    pub chain: String,
    pub blocks: u64,
    pub headers: u64,
    #[serde(rename = "bestblockhash")]
    pub best_block_hash: String,
    #[serde(rename = "verificationprogress")]
    pub verification_progress: f64,
    #[serde(rename = "initialblockdownload", default)]
    pub initial_block_download: bool,
}

/// Request/response access to the full node. `get_block_hash` reports a
/// height beyond the tip as `IndexError::HeightNotFound`, every other
/// failure is `IndexError::PeerUnavailable`.
#[async_trait::async_trait]
pub trait PeerClient: Send + Sync {
    async fn get_block_hash(&self, height: u32) -> IndexResult<BlockHash>;
    async fn get_block(&self, hash: &BlockHash) -> IndexResult<Block>;

    async fn get_raw_mempool(&self) -> IndexResult<Vec<Txid>>;
    async fn get_raw_transaction(&self, txid: &Txid) -> IndexResult<Transaction>;

    async fn import_address(&self, address: &str, label: &str, rescan: bool) -> IndexResult<()>;
    async fn list_unspent(
        &self,
        min_conf: u32,
        max_conf: u32,
        addresses: &[String],
    ) -> IndexResult<Vec<PeerUnspent>>;
    async fn list_transactions(
        &self,
        label: &str,
        count: usize,
        skip: usize,
        include_watch_only: bool,
    ) -> IndexResult<Vec<PeerWalletTx>>;

    async fn send_raw_transaction(&self, tx_hex: &str) -> IndexResult<Txid>;
    async fn get_info(&self) -> IndexResult<PeerInfo>;

    // True while the wallet is rescanning after an address import
    async fn is_busy(&self) -> IndexResult<bool>;
}

pub type PeerClientRef = Arc<Box<dyn PeerClient>>;
