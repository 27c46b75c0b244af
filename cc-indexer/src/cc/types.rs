use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggregationPolicy {
    Aggregatable,
    HybridAggregatable,
    Dispersed,
}

impl AggregationPolicy {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => AggregationPolicy::Aggregatable,
            1 => AggregationPolicy::HybridAggregatable,
            _ => AggregationPolicy::Dispersed,
        }
    }

    pub fn to_bits(&self) -> u8 {
        match self {
            AggregationPolicy::Aggregatable => 0,
            AggregationPolicy::HybridAggregatable => 1,
            AggregationPolicy::Dispersed => 2,
        }
    }
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        AggregationPolicy::Aggregatable
    }
}

/// One asset amount attached to an output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetAllocation {
    pub asset_id: String,
    pub amount: u64,
    pub issue_txid: String,
    pub divisibility: u8,
    pub lock_status: bool,
    pub aggregation_policy: AggregationPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferKind {
    Issuance,
    Transfer,
    Burn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    // Last output of the range when `range` is set
    pub output: u32,
    // Percentage of the current source when `percent` is set
    pub amount: u64,
    pub range: bool,
    pub percent: bool,
    pub skip: bool,
    pub burn: bool,
}

/// Decoded asset transfer instructions of a colored transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferDescriptor {
    pub protocol: u16,
    pub version: u8,
    pub opcode: u8,
    pub kind: TransferKind,

    pub torrent_hash: Option<String>,
    pub sha2: Option<String>,

    // Issuance only
    pub amount: Option<u64>,
    pub divisibility: u8,
    pub lock_status: bool,
    pub aggregation_policy: AggregationPolicy,

    pub payments: Vec<Payment>,
}
