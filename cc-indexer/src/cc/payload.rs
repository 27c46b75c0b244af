use super::sffc::{sffc_decode, sffc_encode};
use super::types::{AggregationPolicy, Payment, TransferDescriptor, TransferKind};
use super::{CC_MARKER, has_cc_marker};
use crate::error::{IndexError, IndexResult};
use bitcoincore_rpc::bitcoin::hex::DisplayHex;

pub const CC_PROTOCOL: u16 = 0x4343;

const TORRENT_HASH_LEN: usize = 20;
const SHA2_LEN: usize = 32;

// Output index used by burn payments
pub const BURN_OUTPUT: u32 = 31;

fn malformed(msg: String) -> IndexError {
    IndexError::MalformedAssetMetadata(msg)
}

fn kind_of(opcode: u8) -> IndexResult<TransferKind> {
    match opcode & 0xF0 {
        0x00 => Ok(TransferKind::Issuance),
        0x10 => Ok(TransferKind::Transfer),
        0x20 => Ok(TransferKind::Burn),
        _ => Err(malformed(format!("Unknown opcode {:#04x}", opcode))),
    }
}

// Bytes of torrent hash and sha2 following the opcode
fn metadata_layout(opcode: u8) -> IndexResult<(usize, usize)> {
    match opcode & 0x0F {
        0x01 => Ok((TORRENT_HASH_LEN, SHA2_LEN)),
        0x02 | 0x03 => Ok((TORRENT_HASH_LEN, 0)),
        0x04..=0x06 => Ok((0, 0)),
        _ => Err(malformed(format!("Unknown opcode {:#04x}", opcode))),
    }
}

fn take<'a>(data: &'a [u8], pos: &mut usize, len: usize, what: &str) -> IndexResult<&'a [u8]> {
    if data.len() < *pos + len {
        return Err(malformed(format!(
            "Truncated {} at offset {}, need {} bytes",
            what, pos, len
        )));
    }

    let ret = &data[*pos..*pos + len];
    *pos += len;
    Ok(ret)
}

fn decode_payment(data: &[u8], pos: &mut usize, kind: TransferKind) -> IndexResult<Payment> {
    let flags = take(data, pos, 1, "payment")?[0];
    let skip = flags & 0x80 != 0;
    let range = flags & 0x40 != 0;
    let percent = flags & 0x20 != 0;

    let output = if range {
        let low = take(data, pos, 1, "payment range")?[0];
        (((flags & 0x1F) as u32) << 8) | low as u32
    } else {
        (flags & 0x1F) as u32
    };

    let amount = if percent {
        let pct = take(data, pos, 1, "payment percent")?[0];
        if pct > 100 {
            return Err(malformed(format!("Invalid payment percent {}", pct)));
        }
        pct as u64
    } else {
        let (amount, used) = sffc_decode(&data[*pos..])?;
        *pos += used;
        amount
    };

    Ok(Payment {
        output,
        amount,
        range,
        percent,
        skip,
        burn: kind == TransferKind::Burn && !range && output == BURN_OUTPUT,
    })
}

/// Parse an embedded payload into a transfer descriptor.
pub fn decode_payload(data: &[u8]) -> IndexResult<TransferDescriptor> {
    if !has_cc_marker(data) {
        return Err(malformed("Missing colored coins marker".to_string()));
    }

    let mut pos = CC_MARKER.len();
    let header = take(data, &mut pos, 2, "header")?;
    let version = header[0];
    let opcode = header[1];
    if version != 0x01 && version != 0x02 {
        return Err(malformed(format!("Unsupported protocol version {}", version)));
    }

    let kind = kind_of(opcode)?;
    let (torrent_len, sha2_len) = metadata_layout(opcode)?;

    let torrent_hash = if torrent_len > 0 {
        Some(take(data, &mut pos, torrent_len, "torrent hash")?.to_lower_hex_string())
    } else {
        None
    };
    let sha2 = if sha2_len > 0 {
        Some(take(data, &mut pos, sha2_len, "sha2")?.to_lower_hex_string())
    } else {
        None
    };

    let mut descriptor = TransferDescriptor {
        protocol: CC_PROTOCOL,
        version,
        opcode,
        kind,
        torrent_hash,
        sha2,
        amount: None,
        divisibility: 0,
        lock_status: false,
        aggregation_policy: AggregationPolicy::Aggregatable,
        payments: Vec::new(),
    };

    // Issuance ends with a flags byte after the payments
    let payments_end = if kind == TransferKind::Issuance {
        let (amount, used) = sffc_decode(&data[pos..])?;
        pos += used;
        descriptor.amount = Some(amount);

        if data.len() <= pos {
            return Err(malformed("Missing issuance flags".to_string()));
        }
        let flags = data[data.len() - 1];
        descriptor.divisibility = flags >> 5;
        descriptor.lock_status = flags & 0x10 != 0;
        descriptor.aggregation_policy = AggregationPolicy::from_bits(flags >> 2);

        data.len() - 1
    } else {
        data.len()
    };

    let body = &data[..payments_end];
    while pos < body.len() {
        let payment = decode_payment(body, &mut pos, kind)?;
        descriptor.payments.push(payment);
    }

    Ok(descriptor)
}

fn encode_hex_field(out: &mut Vec<u8>, value: &Option<String>, len: usize) -> IndexResult<()> {
    if len == 0 {
        return Ok(());
    }

    let hex = value
        .as_deref()
        .ok_or_else(|| malformed(format!("Opcode requires a {} byte hash", len)))?;
    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|b| u8::from_str_radix(b, 16).ok())
                .ok_or_else(|| malformed(format!("Invalid hex {}", hex)))
        })
        .collect::<IndexResult<Vec<u8>>>()?;
    if bytes.len() != len {
        return Err(malformed(format!("Expected {} hash bytes, got {}", len, bytes.len())));
    }

    out.extend_from_slice(&bytes);
    Ok(())
}

/// Serialize a descriptor back to its embedded payload form.
pub fn encode_payload(descriptor: &TransferDescriptor) -> IndexResult<Vec<u8>> {
    let mut out = Vec::with_capacity(16);
    out.extend_from_slice(&CC_MARKER);
    out.push(descriptor.version);
    out.push(descriptor.opcode);

    let (torrent_len, sha2_len) = metadata_layout(descriptor.opcode)?;
    encode_hex_field(&mut out, &descriptor.torrent_hash, torrent_len)?;
    encode_hex_field(&mut out, &descriptor.sha2, sha2_len)?;

    if descriptor.kind == TransferKind::Issuance {
        let amount = descriptor
            .amount
            .ok_or_else(|| malformed("Issuance without amount".to_string()))?;
        out.extend(sffc_encode(amount)?);
    }

    for payment in &descriptor.payments {
        let mut flags = 0u8;
        if payment.skip {
            flags |= 0x80;
        }
        if payment.percent {
            flags |= 0x20;
        }

        if payment.range {
            if payment.output > 0x1FFF {
                return Err(malformed(format!("Range output {} too large", payment.output)));
            }
            flags |= 0x40 | ((payment.output >> 8) as u8 & 0x1F);
            out.push(flags);
            out.push((payment.output & 0xFF) as u8);
        } else {
            if payment.output > 0x1F {
                return Err(malformed(format!("Output {} too large", payment.output)));
            }
            out.push(flags | payment.output as u8);
        }

        if payment.percent {
            out.push(payment.amount.min(100) as u8);
        } else {
            out.extend(sffc_encode(payment.amount)?);
        }
    }

    if descriptor.kind == TransferKind::Issuance {
        let flags = (descriptor.divisibility << 5)
            | if descriptor.lock_status { 0x10 } else { 0 }
            | (descriptor.aggregation_policy.to_bits() << 2);
        out.push(flags);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_transfer() {
        // CC v2 transfer without metadata: 5 units to output 0, 3 units to output 2
        let data = [0x43, 0x43, 0x02, 0x15, 0x00, 0x05, 0x02, 0x03];
        let descriptor = decode_payload(&data).unwrap();

        assert_eq!(descriptor.kind, TransferKind::Transfer);
        assert_eq!(descriptor.version, 2);
        assert!(descriptor.torrent_hash.is_none());
        assert_eq!(descriptor.payments.len(), 2);
        assert_eq!(descriptor.payments[0].output, 0);
        assert_eq!(descriptor.payments[0].amount, 5);
        assert_eq!(descriptor.payments[1].output, 2);
        assert_eq!(descriptor.payments[1].amount, 3);
    }

    #[test]
    fn test_decode_issuance_with_flags() {
        // Issue 1000 units (2 byte amount), pay 1000 to output 1,
        // divisibility 2, locked, dispersed
        let flags = (2 << 5) | 0x10 | (2 << 2);
        let data = [0x43, 0x43, 0x02, 0x05, 0x20, 0x13, 0x01, 0x20, 0x13, flags];
        let descriptor = decode_payload(&data).unwrap();

        assert_eq!(descriptor.kind, TransferKind::Issuance);
        assert_eq!(descriptor.amount, Some(1000));
        assert_eq!(descriptor.divisibility, 2);
        assert!(descriptor.lock_status);
        assert_eq!(descriptor.aggregation_policy, AggregationPolicy::Dispersed);
        assert_eq!(descriptor.payments.len(), 1);
        assert_eq!(descriptor.payments[0].output, 1);
        assert_eq!(descriptor.payments[0].amount, 1000);

        assert_eq!(encode_payload(&descriptor).unwrap(), data.to_vec());
    }

    #[test]
    fn test_decode_range_percent_and_burn() {
        // Burn tx: 50% range payment up to output 0x0102, then burn 4 units
        let data = [0x43, 0x43, 0x02, 0x25, 0x40 | 0x20 | 0x01, 0x02, 50, 0x1F, 0x04];
        let descriptor = decode_payload(&data).unwrap();

        assert_eq!(descriptor.kind, TransferKind::Burn);
        let first = &descriptor.payments[0];
        assert!(first.range && first.percent && !first.burn);
        assert_eq!(first.output, 0x0102);
        assert_eq!(first.amount, 50);

        let second = &descriptor.payments[1];
        assert!(second.burn);
        assert_eq!(second.amount, 4);
    }

    #[test]
    fn test_metadata_hashes() {
        let mut data = vec![0x43, 0x43, 0x02, 0x12];
        data.extend_from_slice(&[0xAB; 20]);
        data.extend_from_slice(&[0x00, 0x01]);

        let descriptor = decode_payload(&data).unwrap();
        assert_eq!(descriptor.torrent_hash, Some("ab".repeat(20)));
        assert!(descriptor.sha2.is_none());
        assert_eq!(descriptor.payments.len(), 1);
        assert_eq!(encode_payload(&descriptor).unwrap(), data);
    }

    #[test]
    fn test_malformed_payloads() {
        // Wrong marker
        assert!(decode_payload(&[0x43, 0x44, 0x02, 0x15, 0x00, 0x01]).is_err());
        // Unsupported version
        assert!(decode_payload(&[0x43, 0x43, 0x09, 0x15, 0x00, 0x01]).is_err());
        // Unknown opcode
        assert!(decode_payload(&[0x43, 0x43, 0x02, 0x35, 0x00, 0x01]).is_err());
        // Truncated torrent hash
        assert!(decode_payload(&[0x43, 0x43, 0x02, 0x12, 0xAB, 0xAB]).is_err());
        // Payment without amount
        assert!(decode_payload(&[0x43, 0x43, 0x02, 0x15, 0x00]).is_err());
        // Percent above 100
        assert!(decode_payload(&[0x43, 0x43, 0x02, 0x15, 0x20, 101]).is_err());
        // Header only
        assert!(decode_payload(&[0x43, 0x43]).is_err());
    }
}
