//! Unified public key encoding (spec §4.2): a single 65-byte buffer
//! `0x01 || x25519_pub(32) || ed25519_pub(32)`. Legacy 64-byte encodings
//! (version byte absent) are accepted read-only.
//!
//! Fixed-offset encode/decode in the style of `network/packet.rs`'s
//! `Packet::serialize`/`deserialize` (explicit offsets, explicit error enum),
//! generalized from that packet's framing to this smaller pubkey buffer.

use thiserror::Error;

pub const UNIFIED_PUBKEY_VERSION: u8 = 0x01;
pub const UNIFIED_PUBKEY_LEN: usize = 65;
const LEGACY_PUBKEY_LEN: usize = 64;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PubKeyError {
    #[error("unified pubkey buffer has invalid length {0}")]
    InvalidLength(usize),
    #[error("unsupported unified pubkey version byte {0:#04x}")]
    UnsupportedVersion(u8),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnifiedPubKeys {
    pub x25519: [u8; 32],
    pub ed25519: [u8; 32],
}

impl UnifiedPubKeys {
    /// New emissions are always the 65-byte versioned form.
    pub fn to_bytes(&self) -> [u8; UNIFIED_PUBKEY_LEN] {
        let mut out = [0u8; UNIFIED_PUBKEY_LEN];
        out[0] = UNIFIED_PUBKEY_VERSION;
        out[1..33].copy_from_slice(&self.x25519);
        out[33..65].copy_from_slice(&self.ed25519);
        out
    }

    /// Accepts both the 65-byte versioned form and the legacy 64-byte form
    /// (no version byte, x25519 || ed25519 directly).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PubKeyError> {
        match bytes.len() {
            UNIFIED_PUBKEY_LEN => {
                if bytes[0] != UNIFIED_PUBKEY_VERSION {
                    return Err(PubKeyError::UnsupportedVersion(bytes[0]));
                }
                let mut x25519 = [0u8; 32];
                let mut ed25519 = [0u8; 32];
                x25519.copy_from_slice(&bytes[1..33]);
                ed25519.copy_from_slice(&bytes[33..65]);
                Ok(Self { x25519, ed25519 })
            }
            LEGACY_PUBKEY_LEN => {
                let mut x25519 = [0u8; 32];
                let mut ed25519 = [0u8; 32];
                x25519.copy_from_slice(&bytes[0..32]);
                ed25519.copy_from_slice(&bytes[32..64]);
                Ok(Self { x25519, ed25519 })
            }
            other => Err(PubKeyError::InvalidLength(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_65_byte_form() {
        let pk = UnifiedPubKeys {
            x25519: [1u8; 32],
            ed25519: [2u8; 32],
        };
        let bytes = pk.to_bytes();
        assert_eq!(bytes.len(), UNIFIED_PUBKEY_LEN);
        assert_eq!(bytes[0], UNIFIED_PUBKEY_VERSION);
        let decoded = UnifiedPubKeys::from_bytes(&bytes).unwrap();
        assert_eq!(pk, decoded);
    }

    #[test]
    fn accepts_legacy_64_byte_form() {
        let mut legacy = [0u8; 64];
        legacy[..32].copy_from_slice(&[3u8; 32]);
        legacy[32..].copy_from_slice(&[4u8; 32]);
        let decoded = UnifiedPubKeys::from_bytes(&legacy).unwrap();
        assert_eq!(decoded.x25519, [3u8; 32]);
        assert_eq!(decoded.ed25519, [4u8; 32]);
    }

    #[test]
    fn rejects_bad_length() {
        let bytes = [0u8; 10];
        assert_eq!(UnifiedPubKeys::from_bytes(&bytes), Err(PubKeyError::InvalidLength(10)));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = [0u8; UNIFIED_PUBKEY_LEN];
        bytes[0] = 0x02;
        assert_eq!(
            UnifiedPubKeys::from_bytes(&bytes),
            Err(PubKeyError::UnsupportedVersion(0x02))
        );
    }
}
