use crate::cc::{AssetAllocation, AssetCodec, TransferDescriptor, has_cc_marker};
use bitcoincore_rpc::bitcoin::opcodes::all::{OP_CHECKMULTISIG, OP_RETURN};
use bitcoincore_rpc::bitcoin::hex::DisplayHex;
use bitcoincore_rpc::bitcoin::script::Instruction;
use bitcoincore_rpc::bitcoin::{Address, Network, Script, Transaction};
use serde::{Deserialize, Serialize};

pub const SCRIPT_TYPE_NULLDATA: &str = "nulldata";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptPubKey {
    pub asm: String,
    pub hex: String,
    #[serde(rename = "type")]
    pub script_type: String,
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CCInput {
    pub txid: String,
    pub vout: u32,
    pub sequence: u32,
    pub coinbase: bool,
    pub assets: Vec<AssetAllocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CCOutput {
    pub n: u32,
    pub value: u64,
    pub script_pub_key: ScriptPubKey,
    pub assets: Vec<AssetAllocation>,
}

impl CCOutput {
    pub fn is_nulldata(&self) -> bool {
        self.script_pub_key.script_type == SCRIPT_TYPE_NULLDATA
    }
}

/// A transaction as the indexer sees it: decoded scripts, addresses, the
/// optional transfer descriptor and the assets resolved on every input/output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CCTransaction {
    pub txid: String,
    pub version: i32,
    pub locktime: u32,
    pub vin: Vec<CCInput>,
    pub vout: Vec<CCOutput>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ccdata: Option<TransferDescriptor>,
}

impl CCTransaction {
    pub fn decode(tx: &Transaction, network: Network, codec: &dyn AssetCodec) -> Self {
        let txid = tx.compute_txid().to_string();

        let vin = tx
            .input
            .iter()
            .map(|input| CCInput {
                txid: input.previous_output.txid.to_string(),
                vout: input.previous_output.vout,
                sequence: input.sequence.0,
                coinbase: input.previous_output.is_null(),
                assets: Vec::new(),
            })
            .collect();

        let vout = tx
            .output
            .iter()
            .enumerate()
            .map(|(n, output)| CCOutput {
                n: n as u32,
                value: output.value.to_sat(),
                script_pub_key: decode_script(&output.script_pubkey, network),
                assets: Vec::new(),
            })
            .collect();

        let ccdata = colored_data(&txid, tx, codec);

        Self {
            txid,
            version: tx.version.0,
            locktime: tx.lock_time.to_consensus_u32(),
            vin,
            vout,
            ccdata,
        }
    }

    pub fn is_colored(&self) -> bool {
        self.ccdata.is_some()
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].coinbase
    }

    /// Index of the last output that is not an OP_RETURN, where change and
    /// leftover assets go.
    pub fn last_payable_output(&self) -> Option<usize> {
        self.vout.iter().rposition(|o| !o.is_nulldata())
    }

    /// Addresses touched by the outputs, used to filter wallet history.
    pub fn output_addresses(&self) -> impl Iterator<Item = &String> {
        self.vout.iter().flat_map(|o| o.script_pub_key.addresses.iter())
    }
}

// First push data after OP_RETURN, if any
fn op_return_data(script: &Script) -> Option<Vec<u8>> {
    let mut instructions = script.instructions();
    match instructions.next() {
        Some(Ok(Instruction::Op(op))) if op == OP_RETURN => {}
        _ => return None,
    }

    instructions.find_map(|ins| match ins {
        Ok(Instruction::PushBytes(bytes)) if !bytes.is_empty() => Some(bytes.as_bytes().to_vec()),
        _ => None,
    })
}

/// Find and decode the colored payload of a transaction. Payloads that do not
/// carry the marker are ignored, payloads that fail to decode are logged and
/// the transaction is treated as uncolored.
pub fn colored_data(
    txid: &str,
    tx: &Transaction,
    codec: &dyn AssetCodec,
) -> Option<TransferDescriptor> {
    for output in &tx.output {
        let data = match op_return_data(&output.script_pubkey) {
            Some(data) => data,
            None => continue,
        };

        if !has_cc_marker(&data) {
            continue;
        }

        match codec.decode(&data) {
            Ok(descriptor) => return Some(descriptor),
            Err(e) => {
                warn!(
                    "Ignoring malformed asset metadata in tx {}: {}",
                    txid, e
                );
            }
        }
    }

    None
}

pub fn classify_script(script: &Script) -> &'static str {
    if script.is_p2pkh() {
        "pubkeyhash"
    } else if script.is_p2sh() {
        "scripthash"
    } else if script.is_p2wpkh() {
        "witness_v0_keyhash"
    } else if script.is_p2wsh() {
        "witness_v0_scripthash"
    } else if script.is_p2tr() {
        "witness_v1_taproot"
    } else if script.is_p2pk() {
        "pubkey"
    } else if script.is_op_return() {
        SCRIPT_TYPE_NULLDATA
    } else if is_bare_multisig(script) {
        "multisig"
    } else {
        "nonstandard"
    }
}

fn is_bare_multisig(script: &Script) -> bool {
    matches!(
        script.instructions().last(),
        Some(Ok(Instruction::Op(op))) if op == OP_CHECKMULTISIG
    )
}

pub fn decode_script(script: &Script, network: Network) -> ScriptPubKey {
    let addresses = match Address::from_script(script, network) {
        Ok(address) => vec![address.to_string()],
        Err(_) => Vec::new(),
    };

    ScriptPubKey {
        asm: script.to_asm_string(),
        hex: script.as_bytes().to_lower_hex_string(),
        script_type: classify_script(script).to_string(),
        addresses,
    }
}
