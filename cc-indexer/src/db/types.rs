use crate::cc::AssetAllocation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `txid:vout`, the primary key of the asset map.
pub fn output_ref(txid: &str, vout: u32) -> String {
    format!("{}:{}", txid, vout)
}

/// Assets held by one output reference, tagged with the height of the block
/// that produced them (`MEMPOOL_BLOCK_HEIGHT` for mempool transactions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetHolding {
    pub assets: Vec<AssetAllocation>,
    pub block_height: i64,
}

pub type HoldingMap = BTreeMap<String, AssetHolding>;

/// State changes of one block or one mempool transaction.
/// `unused` holds the entries to create, `used` the consumed entries as they
/// were before, so a revert can put them back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoDelta {
    pub used: HoldingMap,
    pub unused: HoldingMap,
}

impl UtxoDelta {
    pub fn is_empty(&self) -> bool {
        self.used.is_empty() && self.unused.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockUndo {
    pub used: HoldingMap,
    pub unused: HoldingMap,
    pub txids: Vec<String>,
}

impl BlockUndo {
    pub fn new(delta: UtxoDelta, txids: Vec<String>) -> Self {
        Self {
            used: delta.used,
            unused: delta.unused,
            txids,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub height: u32,
    pub hash: Option<String>,
    pub timestamp: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMempoolTx {
    pub txid: String,
    pub colored: bool,
}

/// Mempool transactions applied on top of the confirmed state, in
/// application order, and the ones scheduled for reversal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MempoolBookkeeping {
    pub parsed: Vec<ParsedMempoolTx>,
    pub to_revert: Vec<String>,
}

impl MempoolBookkeeping {
    pub fn is_parsed(&self, txid: &str) -> bool {
        self.parsed.iter().any(|p| p.txid == txid)
    }

    pub fn mark_parsed(&mut self, txid: String, colored: bool) {
        if !self.is_parsed(&txid) {
            self.parsed.push(ParsedMempoolTx { txid, colored });
        }
    }

    pub fn remove(&mut self, txid: &str) -> Option<ParsedMempoolTx> {
        let pos = self.parsed.iter().position(|p| p.txid == txid)?;
        Some(self.parsed.remove(pos))
    }
}
