mod assets;
mod codec;
mod payload;
mod sffc;
mod types;

pub use assets::*;
pub use codec::*;
pub use payload::*;
pub use sffc::*;
pub use types::*;

/// Leading bytes of an embedded colored coins payload ("CC").
pub const CC_MARKER: [u8; 2] = [0x43, 0x43];

/// Version gate: only payloads starting with the marker are handed to the codec.
pub fn has_cc_marker(data: &[u8]) -> bool {
    data.len() >= CC_MARKER.len() && data[..CC_MARKER.len()] == CC_MARKER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cc_marker() {
        assert!(has_cc_marker(&[0x43, 0x43, 0x02, 0x10]));
        assert!(has_cc_marker(&[0x43, 0x43]));
        assert!(!has_cc_marker(&[0x43]));
        assert!(!has_cc_marker(&[0x43, 0x44, 0x02, 0x10]));
        assert!(!has_cc_marker(&[]));
    }
}
