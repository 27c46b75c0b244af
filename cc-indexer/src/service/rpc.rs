use crate::btc::CCTransaction;
use crate::query::{AddressUtxo, ImportResult, NodeInfo};
use jsonrpc_core::{BoxFuture, Result as JsonResult};
use jsonrpc_derive::rpc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAddressesUtxosParams {
    pub addresses: Vec<String>,

    // Optional, defaults to 0 so mempool outputs are included
    #[serde(default)]
    pub num_of_confirmations: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAddressesTransactionsParams {
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransmitParams {
    pub tx_hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportAddressesParams {
    pub addresses: Vec<String>,

    #[serde(default)]
    pub reindex: bool,
}

#[rpc(server)]
pub trait CCIndexerRpc {
    /// Unspent outputs of the given addresses with their colored assets
    #[rpc(name = "getAddressesUtxos")]
    fn get_addresses_utxos(
        &self,
        params: GetAddressesUtxosParams,
    ) -> BoxFuture<JsonResult<Vec<AddressUtxo>>>;

    /// Wallet history of the given addresses, enriched with colored assets
    #[rpc(name = "getAddressesTransactions")]
    fn get_addresses_transactions(
        &self,
        params: GetAddressesTransactionsParams,
    ) -> BoxFuture<JsonResult<Vec<CCTransaction>>>;

    /// Broadcasts a raw transaction, returns its txid
    #[rpc(name = "transmit")]
    fn transmit(&self, params: TransmitParams) -> BoxFuture<JsonResult<String>>;

    #[rpc(name = "getInfo")]
    fn get_info(&self) -> BoxFuture<JsonResult<NodeInfo>>;

    #[rpc(name = "importAddresses")]
    fn import_addresses(&self, params: ImportAddressesParams)
    -> BoxFuture<JsonResult<ImportResult>>;

    #[rpc(name = "stop")]
    fn stop(&self) -> JsonResult<()>;
}
