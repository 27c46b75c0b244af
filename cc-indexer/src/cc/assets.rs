use super::types::{AggregationPolicy, AssetAllocation, Payment, TransferDescriptor, TransferKind};
use crate::btc::CCTransaction;
use bitcoincore_rpc::bitcoin::hashes::{Hash, hash160};

/// Asset id of an issuance: lock prefix plus hash160 of the first input's output reference.
pub fn issued_asset_id(tx: &CCTransaction, lock_status: bool) -> String {
    let seed = match tx.vin.first() {
        Some(input) => format!("{}:{}", input.txid, input.vout),
        None => tx.txid.clone(),
    };

    let hash = hash160::Hash::hash(seed.as_bytes());
    let prefix = if lock_status { "La" } else { "Ua" };
    format!("{}{:x}", prefix, hash)
}

fn issued_asset(tx: &CCTransaction, desc: &TransferDescriptor) -> Option<AssetAllocation> {
    if desc.kind != TransferKind::Issuance {
        return None;
    }

    let amount = desc.amount.unwrap_or(0);
    Some(AssetAllocation {
        asset_id: issued_asset_id(tx, desc.lock_status),
        amount,
        issue_txid: tx.txid.clone(),
        divisibility: desc.divisibility,
        lock_status: desc.lock_status,
        aggregation_policy: desc.aggregation_policy,
    })
}

fn push_merged(output: &mut Vec<AssetAllocation>, alloc: AssetAllocation) {
    if alloc.amount == 0 {
        return;
    }

    if alloc.aggregation_policy == AggregationPolicy::Aggregatable {
        // A sum past u64::MAX stays as a separate allocation
        if let Some(last) = output.iter_mut().find(|a| {
            a.asset_id == alloc.asset_id
                && a.aggregation_policy == AggregationPolicy::Aggregatable
                && a.amount.checked_add(alloc.amount).is_some()
        }) {
            last.amount += alloc.amount;
            return;
        }
    }

    output.push(alloc);
}

struct Allocator<'a> {
    tx: &'a CCTransaction,
    sources: Vec<AssetAllocation>,
    cursor: usize,
    outputs: Vec<Vec<AssetAllocation>>,
}

impl<'a> Allocator<'a> {
    fn new(tx: &'a CCTransaction, desc: &TransferDescriptor) -> Self {
        let mut sources = Vec::new();
        if let Some(issued) = issued_asset(tx, desc) {
            sources.push(issued);
        }
        for input in &tx.vin {
            sources.extend(input.assets.iter().cloned());
        }

        Self {
            tx,
            sources,
            cursor: 0,
            outputs: vec![Vec::new(); tx.vout.len()],
        }
    }

    fn skip_exhausted(&mut self) {
        while self.cursor < self.sources.len() && self.sources[self.cursor].amount == 0 {
            self.cursor += 1;
        }
    }

    // Returns false when the payment invalidates the whole transfer
    fn pay(&mut self, payment: &Payment) -> bool {
        self.skip_exhausted();
        if self.cursor >= self.sources.len() {
            return false;
        }

        let available = self.sources[self.cursor].amount;
        let amount = if payment.percent {
            match u64::try_from(available as u128 * payment.amount as u128 / 100) {
                Ok(amount) => amount,
                Err(_) => return false,
            }
        } else {
            payment.amount
        };

        if payment.burn {
            if amount > available {
                return false;
            }
            self.sources[self.cursor].amount -= amount;
        } else {
            let first = if payment.range { 0 } else { payment.output as usize };
            let last = payment.output as usize;
            if last >= self.outputs.len() {
                return false;
            }

            let count = (last - first + 1) as u64;
            let total = match amount.checked_mul(count) {
                Some(total) if total <= available => total,
                _ => return false,
            };

            for n in first..=last {
                let mut alloc = self.sources[self.cursor].clone();
                alloc.amount = amount;
                push_merged(&mut self.outputs[n], alloc);
            }
            self.sources[self.cursor].amount -= total;
        }

        if payment.skip || self.sources[self.cursor].amount == 0 {
            self.cursor += 1;
        }

        true
    }

    fn finish(mut self) -> Vec<Vec<AssetAllocation>> {
        let leftovers: Vec<AssetAllocation> = self
            .sources
            .drain(..)
            .filter(|s| s.amount > 0)
            .collect();

        if let Some(last) = self.tx.last_payable_output() {
            for alloc in leftovers {
                push_merged(&mut self.outputs[last], alloc);
            }
        }

        self.outputs
    }
}

// Invalid transfers move every input asset to the last payable output
fn fallback_outputs(tx: &CCTransaction) -> Vec<Vec<AssetAllocation>> {
    let mut outputs = vec![Vec::new(); tx.vout.len()];
    if let Some(last) = tx.last_payable_output() {
        for input in &tx.vin {
            for alloc in &input.assets {
                push_merged(&mut outputs[last], alloc.clone());
            }
        }
    }

    outputs
}

/// Assign assets to every output of a colored transaction whose inputs have
/// already been resolved. The result has one entry per output.
pub fn compute_assets_outputs(
    tx: &CCTransaction,
    desc: &TransferDescriptor,
) -> Vec<Vec<AssetAllocation>> {
    let mut allocator = Allocator::new(tx, desc);
    for payment in &desc.payments {
        if !allocator.pay(payment) {
            warn!(
                "Invalid payment {:?} in tx {}, moving input assets to last output",
                payment, tx.txid
            );
            return fallback_outputs(tx);
        }
    }

    allocator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btc::{CCInput, CCOutput, ScriptPubKey};

    fn output(n: u32, script_type: &str) -> CCOutput {
        CCOutput {
            n,
            value: 600,
            script_pub_key: ScriptPubKey {
                asm: String::new(),
                hex: String::new(),
                script_type: script_type.to_string(),
                addresses: Vec::new(),
            },
            assets: Vec::new(),
        }
    }

    fn asset(id: &str, amount: u64) -> AssetAllocation {
        AssetAllocation {
            asset_id: id.to_string(),
            amount,
            issue_txid: "aa".repeat(32),
            divisibility: 0,
            lock_status: false,
            aggregation_policy: AggregationPolicy::Aggregatable,
        }
    }

    fn tx(inputs: Vec<Vec<AssetAllocation>>, outputs: usize) -> CCTransaction {
        let mut vout: Vec<CCOutput> = (0..outputs as u32).map(|n| output(n, "pubkeyhash")).collect();
        vout.push(output(outputs as u32, "nulldata"));

        CCTransaction {
            txid: "bb".repeat(32),
            version: 2,
            locktime: 0,
            vin: inputs
                .into_iter()
                .enumerate()
                .map(|(i, assets)| CCInput {
                    txid: "cc".repeat(32),
                    vout: i as u32,
                    sequence: u32::MAX,
                    coinbase: false,
                    assets,
                })
                .collect(),
            vout,
            ccdata: None,
        }
    }

    fn payment(output: u32, amount: u64) -> Payment {
        Payment {
            output,
            amount,
            range: false,
            percent: false,
            skip: false,
            burn: false,
        }
    }

    fn descriptor(kind: TransferKind, amount: Option<u64>, payments: Vec<Payment>) -> TransferDescriptor {
        TransferDescriptor {
            protocol: 0x4343,
            version: 2,
            opcode: match kind {
                TransferKind::Issuance => 0x05,
                TransferKind::Transfer => 0x15,
                TransferKind::Burn => 0x25,
            },
            kind,
            torrent_hash: None,
            sha2: None,
            amount,
            divisibility: 0,
            lock_status: false,
            aggregation_policy: AggregationPolicy::Aggregatable,
            payments,
        }
    }

    #[test]
    fn test_issuance_with_leftover() {
        let t = tx(vec![vec![]], 2);
        let desc = descriptor(TransferKind::Issuance, Some(100), vec![payment(0, 60)]);
        let outputs = compute_assets_outputs(&t, &desc);

        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[0].len(), 1);
        assert_eq!(outputs[0][0].amount, 60);
        assert!(outputs[0][0].asset_id.starts_with("Ua"));
        assert_eq!(outputs[0][0].issue_txid, t.txid);
        // Leftover goes to the last non OP_RETURN output
        assert_eq!(outputs[1][0].amount, 40);
        assert!(outputs[2].is_empty());
    }

    #[test]
    fn test_transfer_across_sources() {
        let t = tx(vec![vec![asset("A", 10)], vec![asset("B", 5)]], 3);
        let desc = descriptor(
            TransferKind::Transfer,
            None,
            vec![payment(0, 10), payment(1, 2), payment(2, 3)],
        );
        let outputs = compute_assets_outputs(&t, &desc);

        assert_eq!(outputs[0], vec![asset("A", 10)]);
        assert_eq!(outputs[1], vec![asset("B", 2)]);
        assert_eq!(outputs[2], vec![asset("B", 3)]);
    }

    #[test]
    fn test_skip_range_and_percent() {
        let t = tx(vec![vec![asset("A", 10), asset("B", 8)]], 3);

        let mut skip = payment(0, 4);
        skip.skip = true;
        let mut range = payment(1, 50);
        range.range = true;
        range.percent = true;
        let desc = descriptor(TransferKind::Transfer, None, vec![skip, range]);
        let outputs = compute_assets_outputs(&t, &desc);

        // 4 of A, then the rest of A is left over
        assert_eq!(outputs[0], vec![asset("A", 4), asset("B", 4)]);
        assert_eq!(outputs[1], vec![asset("B", 4)]);
        assert_eq!(outputs[2], vec![asset("A", 6)]);
    }

    #[test]
    fn test_burn() {
        let t = tx(vec![vec![asset("A", 10)]], 1);
        let mut burn = payment(31, 4);
        burn.burn = true;
        let desc = descriptor(TransferKind::Burn, None, vec![burn]);
        let outputs = compute_assets_outputs(&t, &desc);

        assert_eq!(outputs[0], vec![asset("A", 6)]);
    }

    #[test]
    fn test_invalid_transfer_falls_back() {
        let t = tx(vec![vec![asset("A", 10)]], 2);

        // Too much
        let desc = descriptor(TransferKind::Issuance, Some(5), vec![payment(0, 5), payment(0, 11)]);
        let outputs = compute_assets_outputs(&t, &desc);
        assert!(outputs[0].is_empty());
        assert_eq!(outputs[1], vec![asset("A", 10)]);

        // Unknown output
        let desc = descriptor(TransferKind::Transfer, None, vec![payment(9, 1)]);
        let outputs = compute_assets_outputs(&t, &desc);
        assert_eq!(outputs[1], vec![asset("A", 10)]);

        // Nothing to pay from
        let desc = descriptor(TransferKind::Transfer, None, vec![payment(0, 10), payment(0, 1)]);
        let outputs = compute_assets_outputs(&t, &desc);
        assert_eq!(outputs[1], vec![asset("A", 10)]);
    }

    #[test]
    fn test_aggregation() {
        let mut dispersed = asset("D", 3);
        dispersed.aggregation_policy = AggregationPolicy::Dispersed;
        let t = tx(vec![vec![asset("A", 2)], vec![asset("A", 3), dispersed.clone()]], 1);
        let desc = descriptor(TransferKind::Transfer, None, vec![]);
        let outputs = compute_assets_outputs(&t, &desc);

        assert_eq!(outputs[0], vec![asset("A", 5), dispersed]);
    }

    #[test]
    fn test_percent_of_large_issuance() {
        // Issue 1e19 (4 byte amount), pay 50% to output 0
        let data = [0x43, 0x43, 0x02, 0x05, 0x60, 0x02, 0x71, 0x0F, 0x20, 0x32, 0x00];
        let desc = crate::cc::decode_payload(&data).unwrap();
        assert_eq!(desc.amount, Some(10_000_000_000_000_000_000));

        let t = tx(vec![vec![]], 2);
        let outputs = compute_assets_outputs(&t, &desc);
        assert_eq!(outputs[0].len(), 1);
        assert_eq!(outputs[0][0].amount, 5_000_000_000_000_000_000);
        assert_eq!(outputs[1][0].amount, 5_000_000_000_000_000_000);
        assert!(outputs[2].is_empty());
    }

    #[test]
    fn test_merge_overflow_keeps_allocations_apart() {
        let big = u64::MAX - 1;
        let t = tx(vec![vec![asset("A", big)], vec![asset("A", big)]], 1);
        let desc = descriptor(TransferKind::Transfer, None, vec![]);
        let outputs = compute_assets_outputs(&t, &desc);

        assert_eq!(outputs[0], vec![asset("A", big), asset("A", big)]);
    }

    #[test]
    fn test_asset_id_lock_prefix() {
        let t = tx(vec![vec![]], 1);
        let locked = issued_asset_id(&t, true);
        let unlocked = issued_asset_id(&t, false);
        assert!(locked.starts_with("La"));
        assert!(unlocked.starts_with("Ua"));
        assert_eq!(locked[2..], unlocked[2..]);
        assert_eq!(locked.len(), 2 + 40);
    }
}
