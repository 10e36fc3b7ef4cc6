//! Ratchet message binary framing (spec §4.2). Bit-exact layout — this is an
//! interoperability surface, do not change offsets or sizes.
//!
//! ```text
//! offset  size    field
//! 0       1       version byte (0x01)
//! 1       64      Ed25519 signature over bytes [65..end]
//! 65      32      sender's current DH public key
//! 97      4       pn (uint32 big-endian) — previous sending chain length
//! 101     4       n  (uint32 big-endian) — msg number in current sending chain
//! 105     24      XSalsa20 nonce
//! 129     var     Poly1305-MAC'd ciphertext
//! ```
//!
//! Fixed-offset serialize/deserialize in the style of
//! `network/packet.rs::Packet::{serialize,deserialize}` — explicit offset
//! constants, an explicit error enum, and a round-trip/tamper-detection test
//! suite, generalized from that file's fixed 8192-byte frame to this
//! variable-length ratchet message.

use thiserror::Error;

pub const VERSION: u8 = 0x01;
const VERSION_OFFSET: usize = 0;
const SIGNATURE_OFFSET: usize = 1;
const SIGNATURE_LEN: usize = 64;
const DH_OFFSET: usize = SIGNATURE_OFFSET + SIGNATURE_LEN; // 65
const DH_LEN: usize = 32;
const PN_OFFSET: usize = DH_OFFSET + DH_LEN; // 97
const N_OFFSET: usize = PN_OFFSET + 4; // 101
const NONCE_OFFSET: usize = N_OFFSET + 4; // 105
const NONCE_LEN: usize = 24;
pub const CIPHERTEXT_OFFSET: usize = NONCE_OFFSET + NONCE_LEN; // 129
pub const FIXED_HEADER_LEN: usize = CIPHERTEXT_OFFSET; // 129
pub const MAC_LEN: usize = 16;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("message shorter than the fixed 129-byte header")]
    TooShort,
    #[error("unsupported ratchet message version {0:#04x}")]
    UnsupportedVersion(u8),
    #[error("ciphertext shorter than the 16-byte Poly1305 tag")]
    CiphertextTooShort,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RatchetHeader {
    pub dh: [u8; 32],
    pub pn: u32,
    pub n: u32,
}

impl RatchetHeader {
    /// encoded_header = dh || u32BE(pn) || u32BE(n), 40 bytes.
    pub fn encode(&self) -> [u8; 40] {
        let mut out = [0u8; 40];
        out[..32].copy_from_slice(&self.dh);
        out[32..36].copy_from_slice(&self.pn.to_be_bytes());
        out[36..40].copy_from_slice(&self.n.to_be_bytes());
        out
    }
}

#[derive(Clone, Debug)]
pub struct RatchetMessage {
    pub signature: [u8; 64],
    pub header: RatchetHeader,
    pub nonce: [u8; 24],
    /// nonce||ciphertext payload (ciphertext includes the trailing 16-byte MAC).
    pub ciphertext: Vec<u8>,
}

impl RatchetMessage {
    /// signed_bytes = encoded_header || nonce || ciphertext — what the
    /// Ed25519 signature covers (auth-before-ratchet, §4.5 step 1).
    pub fn signed_bytes(&self) -> Vec<u8> {
        let encoded = self.header.encode();
        let mut out = Vec::with_capacity(encoded.len() + self.nonce.len() + self.ciphertext.len());
        out.extend_from_slice(&encoded);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FIXED_HEADER_LEN + self.ciphertext.len());
        out.push(VERSION);
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.header.dh);
        out.extend_from_slice(&self.header.pn.to_be_bytes());
        out.extend_from_slice(&self.header.n.to_be_bytes());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        debug_assert_eq!(out.len(), FIXED_HEADER_LEN + self.ciphertext.len());
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < FIXED_HEADER_LEN {
            return Err(CodecError::TooShort);
        }
        if bytes[VERSION_OFFSET] != VERSION {
            return Err(CodecError::UnsupportedVersion(bytes[VERSION_OFFSET]));
        }

        let mut signature = [0u8; 64];
        signature.copy_from_slice(&bytes[SIGNATURE_OFFSET..SIGNATURE_OFFSET + SIGNATURE_LEN]);

        let mut dh = [0u8; 32];
        dh.copy_from_slice(&bytes[DH_OFFSET..DH_OFFSET + DH_LEN]);

        let pn = u32::from_be_bytes(bytes[PN_OFFSET..PN_OFFSET + 4].try_into().unwrap());
        let n = u32::from_be_bytes(bytes[N_OFFSET..N_OFFSET + 4].try_into().unwrap());

        let mut nonce = [0u8; 24];
        nonce.copy_from_slice(&bytes[NONCE_OFFSET..NONCE_OFFSET + NONCE_LEN]);

        let ciphertext = bytes[CIPHERTEXT_OFFSET..].to_vec();
        if ciphertext.len() < MAC_LEN {
            return Err(CodecError::CiphertextTooShort);
        }

        Ok(RatchetMessage {
            signature,
            header: RatchetHeader { dh, pn, n },
            nonce,
            ciphertext,
        })
    }
}
