use super::client::{PeerClient, PeerInfo, PeerUnspent, PeerWalletTx};
use crate::error::{IndexError, IndexResult};
use bitcoincore_rpc::bitcoin::{Block, BlockHash, Transaction, Txid};
use bitcoincore_rpc::{Auth, Client, RpcApi};
use serde_json::{Value, json};
use std::sync::{Arc, RwLock};

// bitcoind RPC_INVALID_PARAMETER, returned by getblockhash past the tip
const RPC_INVALID_PARAMETER: i32 = -8;

pub struct BTCRpcClient {
    rpc_url: String,
    auth: Auth,
    client: RwLock<Option<Arc<Client>>>,
}

impl BTCRpcClient {
    pub fn new(rpc_url: String, auth: Auth) -> Self {
        // The client is created on demand, the auth cookie file may not exist
        // until bitcoind has started
        Self {
            rpc_url,
            auth,
            client: RwLock::new(None),
        }
    }

    fn update_client(&self) -> IndexResult<Arc<Client>> {
        let new_client = Client::new(&self.rpc_url, self.auth.clone()).map_err(|e| {
            let msg = format!("Failed to update BTC RPC client: {}", e);
            error!("{}", msg);
            IndexError::PeerUnavailable(msg)
        })?;

        let arc_client = Arc::new(new_client);
        *self.client.write().unwrap() = Some(arc_client.clone());

        info!("BTC RPC client updated: {}", self.rpc_url);
        Ok(arc_client)
    }

    fn client(&self) -> IndexResult<Arc<Client>> {
        if let Some(client) = &*self.client.read().unwrap() {
            return Ok(client.clone());
        }

        warn!("BTC RPC client is not initialized, creating it");
        self.update_client()
    }

    fn is_auth_cookie(&self) -> bool {
        matches!(self.auth, Auth::CookieFile(_))
    }

    fn on_error(&self, error: &bitcoincore_rpc::Error) {
        if let bitcoincore_rpc::Error::JsonRpc(bitcoincore_rpc::jsonrpc::Error::Transport(_)) =
            error
        {
            // bitcoind may have restarted with a new auth cookie
            if self.is_auth_cookie() {
                let _ = self.update_client();
            }
        }
    }

    fn is_invalid_parameter(error: &bitcoincore_rpc::Error) -> bool {
        matches!(
            error,
            bitcoincore_rpc::Error::JsonRpc(bitcoincore_rpc::jsonrpc::Error::Rpc(e))
                if e.code == RPC_INVALID_PARAMETER
        )
    }

    // Runs a blocking RPC call on the blocking pool
    async fn call_blocking<T, F>(&self, name: &'static str, f: F) -> Result<T, RpcFailure>
    where
        T: Send + 'static,
        F: FnOnce(&Client) -> Result<T, bitcoincore_rpc::Error> + Send + 'static,
    {
        let client = self.client().map_err(RpcFailure::Local)?;
        let ret = tokio::task::spawn_blocking(move || f(&*client))
            .await
            .map_err(|e| {
                let msg = format!("{} task join error: {}", name, e);
                error!("{}", msg);
                RpcFailure::Local(IndexError::PeerUnavailable(msg))
            })?;

        ret.map_err(|e| {
            self.on_error(&e);
            RpcFailure::Rpc(e)
        })
    }

    async fn call<T, F>(&self, name: &'static str, f: F) -> IndexResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Client) -> Result<T, bitcoincore_rpc::Error> + Send + 'static,
    {
        self.call_blocking(name, f).await.map_err(|e| e.into_index_error(name))
    }
}

enum RpcFailure {
    Local(IndexError),
    Rpc(bitcoincore_rpc::Error),
}

impl RpcFailure {
    fn into_index_error(self, name: &str) -> IndexError {
        match self {
            RpcFailure::Local(e) => e,
            RpcFailure::Rpc(e) => {
                let msg = format!("{} failed: {}", name, e);
                error!("{}", msg);
                IndexError::PeerUnavailable(msg)
            }
        }
    }
}

#[async_trait::async_trait]
impl PeerClient for BTCRpcClient {
    async fn get_block_hash(&self, height: u32) -> IndexResult<BlockHash> {
        let ret = self
            .call_blocking("getblockhash", move |c| c.get_block_hash(height as u64))
            .await;

        match ret {
            Ok(hash) => Ok(hash),
            Err(RpcFailure::Rpc(e)) if Self::is_invalid_parameter(&e) => {
                debug!("Block height {} not found: {}", height, e);
                Err(IndexError::HeightNotFound(height))
            }
            Err(e) => Err(e.into_index_error("getblockhash")),
        }
    }

    async fn get_block(&self, hash: &BlockHash) -> IndexResult<Block> {
        let hash = *hash;
        self.call("getblock", move |c| c.get_block(&hash)).await
    }

    async fn get_raw_mempool(&self) -> IndexResult<Vec<Txid>> {
        self.call("getrawmempool", |c| c.get_raw_mempool()).await
    }

    async fn get_raw_transaction(&self, txid: &Txid) -> IndexResult<Transaction> {
        let txid = *txid;
        self.call("getrawtransaction", move |c| c.get_raw_transaction(&txid, None))
            .await
    }

    async fn import_address(&self, address: &str, label: &str, rescan: bool) -> IndexResult<()> {
        let args = [json!(address), json!(label), json!(rescan)];
        self.call("importaddress", move |c| c.call::<Value>("importaddress", &args))
            .await?;

        Ok(())
    }

    async fn list_unspent(
        &self,
        min_conf: u32,
        max_conf: u32,
        addresses: &[String],
    ) -> IndexResult<Vec<PeerUnspent>> {
        let args = [json!(min_conf), json!(max_conf), json!(addresses)];
        self.call("listunspent", move |c| c.call("listunspent", &args))
            .await
    }

    async fn list_transactions(
        &self,
        label: &str,
        count: usize,
        skip: usize,
        include_watch_only: bool,
    ) -> IndexResult<Vec<PeerWalletTx>> {
        let args = [
            json!(label),
            json!(count),
            json!(skip),
            json!(include_watch_only),
        ];
        self.call("listtransactions", move |c| c.call("listtransactions", &args))
            .await
    }

    async fn send_raw_transaction(&self, tx_hex: &str) -> IndexResult<Txid> {
        let tx_hex = tx_hex.to_string();
        self.call("sendrawtransaction", move |c| {
            c.send_raw_transaction(tx_hex.as_str())
        })
        .await
    }

    async fn get_info(&self) -> IndexResult<PeerInfo> {
        self.call("getblockchaininfo", |c| c.call("getblockchaininfo", &[]))
            .await
    }

    async fn is_busy(&self) -> IndexResult<bool> {
        let info: Value = self
            .call("getwalletinfo", |c| c.call("getwalletinfo", &[]))
            .await?;

        // `scanning` is false when idle and an object while rescanning
        Ok(info.get("scanning").map(|s| s.is_object()).unwrap_or(false))
    }
}
