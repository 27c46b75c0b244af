//! Significant-figures float coding of asset amounts.
//!
//! The top three bits of the first byte select the total width, the remaining
//! bits hold `mantissa << exponent_bits | exponent`, value = mantissa * 10^exponent.

use crate::error::{IndexError, IndexResult};

struct SffcWidth {
    flag: u8,
    bytes: usize,
    exponent_bits: u32,
}

const WIDTHS: [SffcWidth; 7] = [
    SffcWidth { flag: 0b000, bytes: 1, exponent_bits: 0 },
    SffcWidth { flag: 0b001, bytes: 2, exponent_bits: 4 },
    SffcWidth { flag: 0b010, bytes: 3, exponent_bits: 4 },
    SffcWidth { flag: 0b011, bytes: 4, exponent_bits: 4 },
    SffcWidth { flag: 0b100, bytes: 5, exponent_bits: 3 },
    SffcWidth { flag: 0b101, bytes: 6, exponent_bits: 3 },
    SffcWidth { flag: 0b110, bytes: 7, exponent_bits: 0 },
];

impl SffcWidth {
    fn mantissa_bits(&self) -> u32 {
        (self.bytes * 8) as u32 - 3 - self.exponent_bits
    }
}

/// Decode an amount at the start of `data`, returns the value and bytes consumed.
pub fn sffc_decode(data: &[u8]) -> IndexResult<(u64, usize)> {
    let first = *data.first().ok_or_else(|| {
        IndexError::MalformedAssetMetadata("Missing amount".to_string())
    })?;

    let flag = first >> 5;
    let width = WIDTHS.iter().find(|w| w.flag == flag).ok_or_else(|| {
        IndexError::MalformedAssetMetadata(format!("Invalid amount width flag {:#05b}", flag))
    })?;

    if data.len() < width.bytes {
        return Err(IndexError::MalformedAssetMetadata(format!(
            "Amount needs {} bytes, {} left",
            width.bytes,
            data.len()
        )));
    }

    let mut raw: u64 = 0;
    for b in &data[..width.bytes] {
        raw = (raw << 8) | *b as u64;
    }
    raw &= (1u64 << (width.bytes * 8 - 3)) - 1;

    let exponent = raw & ((1u64 << width.exponent_bits) - 1);
    let mantissa = raw >> width.exponent_bits;

    let value = 10u64
        .checked_pow(exponent as u32)
        .and_then(|p| mantissa.checked_mul(p))
        .ok_or_else(|| {
            IndexError::MalformedAssetMetadata(format!(
                "Amount overflow: {}e{}",
                mantissa, exponent
            ))
        })?;

    Ok((value, width.bytes))
}

/// Encode an amount with the narrowest width that represents it exactly.
pub fn sffc_encode(value: u64) -> IndexResult<Vec<u8>> {
    for width in &WIDTHS {
        let max_exponent = (1u64 << width.exponent_bits) - 1;

        let mut mantissa = value;
        let mut exponent = 0u64;
        while exponent < max_exponent && mantissa != 0 && mantissa % 10 == 0 {
            mantissa /= 10;
            exponent += 1;
        }

        if mantissa >= (1u64 << width.mantissa_bits()) {
            continue;
        }

        let raw = ((width.flag as u64) << (width.bytes * 8 - 3))
            | (mantissa << width.exponent_bits)
            | exponent;
        let bytes = raw.to_be_bytes();
        return Ok(bytes[8 - width.bytes..].to_vec());
    }

    Err(IndexError::MalformedAssetMetadata(format!(
        "Amount {} cannot be encoded",
        value
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_single_byte() {
        assert_eq!(sffc_decode(&[0x00]).unwrap(), (0, 1));
        assert_eq!(sffc_decode(&[0x1f, 0xff]).unwrap(), (31, 1));
    }

    #[test]
    fn test_decode_with_exponent() {
        // flag 001, mantissa 1, exponent 3 => 1000
        let data = [0x20 | 0x00, 0x13];
        assert_eq!(sffc_decode(&data).unwrap(), (1000, 2));

        // flag 010, mantissa 0x1234, exponent 0
        let raw: u32 = (0b010 << 21) | (0x1234 << 4);
        let bytes = raw.to_be_bytes();
        assert_eq!(sffc_decode(&bytes[1..]).unwrap(), (0x1234, 3));
    }

    #[test]
    fn test_encode_picks_narrowest_width() {
        assert_eq!(sffc_encode(7).unwrap(), vec![0x07]);
        assert_eq!(sffc_encode(1000).unwrap(), vec![0x20, 0x13]);
        assert_eq!(sffc_encode(100_000_000).unwrap().len(), 2);
        assert_eq!(sffc_encode(123_456_789).unwrap().len(), 5);

        for value in [0u64, 32, 511, 21_000_000, 1_234_567_890_123] {
            let encoded = sffc_encode(value).unwrap();
            assert_eq!(sffc_decode(&encoded).unwrap(), (value, encoded.len()));
        }
    }

    #[test]
    fn test_decode_errors() {
        assert!(sffc_decode(&[]).is_err());
        // Width flag 111 is reserved
        assert!(sffc_decode(&[0xe0, 0, 0, 0, 0, 0, 0, 0]).is_err());
        // Truncated two byte amount
        assert!(sffc_decode(&[0x20]).is_err());
    }
}
