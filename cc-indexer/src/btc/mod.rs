mod client;
#[cfg(test)]
pub mod mock;
mod rpc;
pub mod tx;

pub use client::*;
pub use rpc::*;
pub use tx::*;

use crate::config::IndexerConfigRef;
use std::sync::Arc;

pub fn create_btc_rpc_client(config: &IndexerConfigRef) -> PeerClientRef {
    let rpc_url = config.btc.rpc_url();
    let auth = config.btc.auth();
    info!("Using bitcoind at {}", rpc_url);

    let client = BTCRpcClient::new(rpc_url, auth);
    Arc::new(Box::new(client) as Box<dyn PeerClient>)
}
