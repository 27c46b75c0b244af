use super::assets::compute_assets_outputs;
use super::payload::decode_payload;
use super::types::{AssetAllocation, TransferDescriptor};
use crate::btc::CCTransaction;
use crate::error::IndexResult;
use std::sync::Arc;

/// Decoding of embedded asset metadata and per-output allocation. The engine
/// only talks to this trait, the wire format stays behind it.
pub trait AssetCodec: Send + Sync {
    fn decode(&self, payload: &[u8]) -> IndexResult<TransferDescriptor>;

    /// One allocation list per output, computed from the inputs' resolved assets.
    fn assets_outputs(
        &self,
        tx: &CCTransaction,
        descriptor: &TransferDescriptor,
    ) -> Vec<Vec<AssetAllocation>>;
}

pub type AssetCodecRef = Arc<Box<dyn AssetCodec>>;

/// Colored coins OP_RETURN protocol as issued by the Colu tooling.
#[derive(Debug, Default, Clone)]
pub struct ColuCodec;

impl AssetCodec for ColuCodec {
    fn decode(&self, payload: &[u8]) -> IndexResult<TransferDescriptor> {
        decode_payload(payload)
    }

    fn assets_outputs(
        &self,
        tx: &CCTransaction,
        descriptor: &TransferDescriptor,
    ) -> Vec<Vec<AssetAllocation>> {
        compute_assets_outputs(tx, descriptor)
    }
}

pub fn create_default_codec() -> AssetCodecRef {
    Arc::new(Box::new(ColuCodec) as Box<dyn AssetCodec>)
}
