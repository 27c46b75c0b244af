use crate::btc::CCTransaction;
use crate::cc::AssetCodec;
use crate::db::{AssetHolding, StateStore, UtxoDelta, output_ref};
use crate::error::IndexResult;

/// Resolve the assets carried by every input. Outputs created earlier in the
/// same block or delta are looked up in `delta.unused` first, then in the
/// store. Consumed holdings are recorded in `delta.used`.
pub fn resolve_inputs(
    store: &StateStore,
    tx: &mut CCTransaction,
    delta: &mut UtxoDelta,
) -> IndexResult<()> {
    for input in tx.vin.iter_mut() {
        if input.coinbase {
            continue;
        }

        let key = output_ref(&input.txid, input.vout);
        let holding = match delta.unused.get(&key) {
            Some(holding) => Some(holding.clone()),
            None => store.get_asset_holding(&key)?,
        };

        let holding = match holding {
            Some(holding) if !holding.assets.is_empty() => holding,
            _ => continue,
        };

        input.assets = holding.assets.clone();
        // Keep the oldest value, it is what a revert has to restore
        delta.used.entry(key).or_insert(holding);
    }

    Ok(())
}

/// Compute the asset allocation of a colored transaction's outputs and stage
/// the non-empty ones in `delta.unused`.
pub fn stage_outputs(
    codec: &dyn AssetCodec,
    tx: &mut CCTransaction,
    block_height: i64,
    delta: &mut UtxoDelta,
) {
    let descriptor = match &tx.ccdata {
        Some(descriptor) => descriptor,
        None => return,
    };

    let outputs = codec.assets_outputs(tx, descriptor);
    for (n, assets) in outputs.into_iter().enumerate() {
        if assets.is_empty() {
            continue;
        }

        let Some(output) = tx.vout.get_mut(n) else {
            warn!("Codec returned assets for missing output {}:{}", tx.txid, n);
            continue;
        };
        output.assets = assets.clone();

        delta.unused.insert(
            output_ref(&tx.txid, n as u32),
            AssetHolding {
                assets,
                block_height,
            },
        );
    }
}

/// Full per-transaction step shared by block application and the mempool.
pub fn process_transaction(
    store: &StateStore,
    codec: &dyn AssetCodec,
    tx: &mut CCTransaction,
    block_height: i64,
    delta: &mut UtxoDelta,
) -> IndexResult<()> {
    resolve_inputs(store, tx, delta)?;
    stage_outputs(codec, tx, block_height, delta);

    Ok(())
}

// Live holding first, then the holding the output had when it was spent
fn lookup_holding(store: &StateStore, key: &str) -> IndexResult<Option<AssetHolding>> {
    match store.get_asset_holding(key)? {
        Some(holding) => Ok(Some(holding)),
        None => store.get_spent_holding(key),
    }
}

/// Copy stored holdings onto the inputs and outputs of a transaction, for
/// read-side enrichment. Spent outputs resolve to the holding they carried.
/// Nothing is written.
pub fn enrich_transaction(store: &StateStore, tx: &mut CCTransaction) -> IndexResult<()> {
    for input in tx.vin.iter_mut().filter(|i| !i.coinbase) {
        if let Some(holding) = lookup_holding(store, &output_ref(&input.txid, input.vout))? {
            input.assets = holding.assets;
        }
    }

    for output in tx.vout.iter_mut() {
        if let Some(holding) = lookup_holding(store, &output_ref(&tx.txid, output.n))? {
            output.assets = holding.assets;
        }
    }

    Ok(())
}
