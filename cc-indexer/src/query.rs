use crate::btc::{CCTransaction, PeerClientRef, PeerInfo, PeerUnspent};
use crate::cc::{AssetAllocation, AssetCodecRef};
use crate::config::IndexerConfigRef;
use crate::db::{StateStoreRef, output_ref};
use crate::error::{IndexError, IndexResult};
use crate::index::enrich_transaction;
use crate::status::{SyncInfo, SyncStatusManagerRef};
use bitcoincore_rpc::bitcoin::Txid;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

// bitcoind's listunspent default upper bound
const MAX_CONFIRMATIONS: u32 = 9_999_999;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressUtxo {
    #[serde(flatten)]
    pub utxo: PeerUnspent,
    pub assets: Vec<AssetAllocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportResult {
    pub imported: Vec<String>,
    pub skipped: Vec<String>,
    pub rescan: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    #[serde(flatten)]
    pub peer: PeerInfo,
    pub indexer: SyncInfo,
}

fn require_addresses(addresses: &[String]) -> IndexResult<()> {
    if addresses.is_empty() || addresses.iter().any(|a| a.trim().is_empty()) {
        return Err(IndexError::InvalidParams(
            "addresses must be a non-empty list of addresses".to_string(),
        ));
    }
    Ok(())
}

/// Read side of the indexer. Never writes asset state, only the imported
/// address list.
pub struct QueryFacade {
    config: IndexerConfigRef,
    peer: PeerClientRef,
    store: StateStoreRef,
    codec: AssetCodecRef,
    status: SyncStatusManagerRef,
}

impl QueryFacade {
    pub fn new(
        config: IndexerConfigRef,
        peer: PeerClientRef,
        store: StateStoreRef,
        codec: AssetCodecRef,
        status: SyncStatusManagerRef,
    ) -> Self {
        Self {
            config,
            peer,
            store,
            codec,
            status,
        }
    }

    pub async fn get_addresses_utxos(
        &self,
        addresses: &[String],
        min_confirmations: Option<u32>,
    ) -> IndexResult<Vec<AddressUtxo>> {
        require_addresses(addresses)?;

        let unspent = self
            .peer
            .list_unspent(min_confirmations.unwrap_or(0), MAX_CONFIRMATIONS, addresses)
            .await?;

        let mut ret = Vec::with_capacity(unspent.len());
        for utxo in unspent {
            let assets = self
                .store
                .get_asset_holding(&output_ref(&utxo.txid, utxo.vout))?
                .map(|h| h.assets)
                .unwrap_or_default();
            ret.push(AddressUtxo { utxo, assets });
        }

        Ok(ret)
    }

    /// Wallet history of the given addresses, confirmed and unconfirmed, each
    /// transaction enriched with the holdings currently stored for its
    /// inputs and outputs.
    pub async fn get_addresses_transactions(
        &self,
        addresses: &[String],
    ) -> IndexResult<Vec<CCTransaction>> {
        require_addresses(addresses)?;
        let wanted: HashSet<&str> = addresses.iter().map(|a| a.as_str()).collect();
        let page_size = self.config.sync.history_page_size.max(1);

        let mut seen = HashSet::new();
        let mut txids = Vec::new();
        let mut skip = 0;
        loop {
            let page = self
                .peer
                .list_transactions(&self.config.sync.import_label, page_size, skip, true)
                .await?;
            let count = page.len();

            for entry in page {
                let matches = entry
                    .address
                    .as_deref()
                    .map(|a| wanted.contains(a))
                    .unwrap_or(false);
                if matches && seen.insert(entry.txid.clone()) {
                    txids.push(entry.txid);
                }
            }

            if count < page_size {
                break;
            }
            skip += count;
        }

        let ids = txids
            .iter()
            .map(|txid| {
                Txid::from_str(txid).map_err(|e| {
                    let msg = format!("Peer returned invalid txid {}: {}", txid, e);
                    error!("{}", msg);
                    IndexError::PeerUnavailable(msg)
                })
            })
            .collect::<IndexResult<Vec<Txid>>>()?;

        let raw_txs =
            futures::future::try_join_all(ids.iter().map(|id| self.peer.get_raw_transaction(id)))
                .await?;

        let network = self.config.btc.network();
        let mut ret = Vec::with_capacity(raw_txs.len());
        for raw_tx in &raw_txs {
            let mut tx = CCTransaction::decode(raw_tx, network, &**self.codec);
            enrich_transaction(&self.store, &mut tx)?;
            ret.push(tx);
        }

        Ok(ret)
    }

    pub async fn transmit(&self, tx_hex: &str) -> IndexResult<String> {
        if tx_hex.trim().is_empty() {
            return Err(IndexError::InvalidParams("txHex is required".to_string()));
        }

        let txid = self.peer.send_raw_transaction(tx_hex.trim()).await?;
        info!("Broadcast transaction {}", txid);
        Ok(txid.to_string())
    }

    /// Register watch addresses with the node. With `reindex` the last import
    /// triggers a rescan and the sync engine waits until the node is idle.
    pub async fn import_addresses(
        &self,
        addresses: &[String],
        reindex: bool,
    ) -> IndexResult<ImportResult> {
        require_addresses(addresses)?;

        let imported = self.store.get_imported_addresses()?;
        let mut pending = Vec::new();
        let mut skipped = Vec::new();
        for address in addresses {
            if imported.contains(address) || pending.contains(address) {
                skipped.push(address.clone());
            } else {
                pending.push(address.clone());
            }
        }

        let label = &self.config.sync.import_label;
        let batch_size = self.config.sync.import_batch_size.max(1);
        let total = pending.len();
        let mut done = 0;

        for batch in pending.chunks(batch_size) {
            for address in batch {
                done += 1;
                let rescan = reindex && done == total;
                if rescan {
                    self.status.request_rescan();
                }
                self.peer.import_address(address, label, rescan).await?;
            }

            self.store.add_imported_addresses(batch)?;
            debug!("Imported {}/{} addresses", done, total);
        }

        info!(
            "Imported {} addresses, skipped {}, rescan: {}",
            total,
            skipped.len(),
            reindex && total > 0
        );

        Ok(ImportResult {
            imported: pending,
            skipped,
            rescan: reindex && total > 0,
        })
    }

    pub async fn get_info(&self) -> IndexResult<NodeInfo> {
        let peer = self.peer.get_info().await?;
        Ok(NodeInfo {
            peer,
            indexer: self.status.get_info(),
        })
    }
}

pub type QueryFacadeRef = Arc<QueryFacade>;
