//! Data model (spec §3): RatchetSession, PendingMessage, SkippedKey.
//!
//! Serde derives and the `to_bytes`/`from_bytes`-style manual layout idea are
//! grounded on `crypto/ratchet.rs::RatchetState` (the teacher's own
//! export/import struct for persisted ratchet state) and
//! `protocol/message.rs` (bincode + serde_json dual serialization, and
//! `serde_big_array::BigArray` for fixed large arrays).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// conversationId = keccak256(sorted_concat(topic_outbound, topic_inbound)).
/// "Sorted" means lexicographic order of the two 32-byte topics, so either
/// peer computes the same id regardless of which topic it calls "outbound".
pub fn compute_conversation_id(topic_a: &[u8; 32], topic_b: &[u8; 32]) -> [u8; 32] {
    let mut buf = [0u8; 64];
    if topic_a <= topic_b {
        buf[..32].copy_from_slice(topic_a);
        buf[32..].copy_from_slice(topic_b);
    } else {
        buf[..32].copy_from_slice(topic_b);
        buf[32..].copy_from_slice(topic_a);
    }
    let digest = Keccak256::digest(buf);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// A message key derived but not yet consumed (§3 SkippedKey).
#[derive(Clone, Serialize, Deserialize)]
pub struct SkippedKey {
    pub dh_pub_hex: String,
    pub msg_number: u32,
    pub message_key: [u8; 32],
    pub created_at: DateTime<Utc>,
}

impl Drop for SkippedKey {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.message_key.zeroize();
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PendingStatus {
    Preparing,
    Submitted,
    Confirmed,
    Failed,
}

/// Two-phase-commit record (§3 PendingMessage / §4.8 Pending Manager).
#[derive(Clone, Serialize, Deserialize)]
pub struct PendingMessage {
    pub id: String,
    pub conversation_id: [u8; 32],
    pub topic: [u8; 32],
    pub payload: Vec<u8>,
    pub plaintext: Vec<u8>,
    pub session_state_before: Vec<u8>,
    pub session_state_after: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub tx_hash: Option<[u8; 32]>,
    pub status: PendingStatus,
}

/// The full state of a Double Ratchet conversation (§3 RatchetSession).
#[derive(Clone, Serialize, Deserialize)]
pub struct RatchetSession {
    pub conversation_id: [u8; 32],

    // Identity — immutable handshake-era reference pair.
    pub my_address: [u8; 20],
    pub contact_address: [u8; 20],
    pub topic_outbound: [u8; 32],
    pub topic_inbound: [u8; 32],
    pub my_signing_key: [u8; 32],
    pub contact_signing_key: [u8; 32],

    // Root state.
    pub root_key: [u8; 32],

    // DH state. `dh_their_public` is `None` until the first inbound DH-ratchet
    // key is observed — a responder has not seen one at init time, and this
    // distinguishes "no key yet" from "some concrete key", forcing the first
    // inbound message to always run the DH step (§4.5 DH step detection).
    pub dh_my_secret: [u8; 32],
    pub dh_my_public: [u8; 32],
    pub dh_their_public: Option<[u8; 32]>,

    // Sending chain.
    pub sending_chain_key: Option<[u8; 32]>,
    pub sending_msg_number: u32,

    // Receiving chain.
    pub receiving_chain_key: Option<[u8; 32]>,
    pub receiving_msg_number: u32,

    // Skip state.
    pub previous_chain_length: u32,
    pub skipped_keys: Vec<SkippedKey>,

    // Topic state.
    pub current_topic_outbound: [u8; 32],
    pub current_topic_inbound: [u8; 32],
    pub next_topic_outbound: Option<[u8; 32]>,
    pub next_topic_inbound: Option<[u8; 32]>,
    pub previous_topic_inbound: Option<[u8; 32]>,
    pub previous_topic_expiry: Option<DateTime<Utc>>,
    pub topic_epoch: u32,

    // Metadata.
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub epoch: u32,
}

impl Drop for RatchetSession {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.root_key.zeroize();
        self.dh_my_secret.zeroize();
        self.my_signing_key.zeroize();
        if let Some(ref mut k) = self.sending_chain_key {
            k.zeroize();
        }
        if let Some(ref mut k) = self.receiving_chain_key {
            k.zeroize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_id_order_independent() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_eq!(compute_conversation_id(&a, &b), compute_conversation_id(&b, &a));
    }

    #[test]
    fn conversation_id_sensitive_to_inputs() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        let c = [3u8; 32];
        assert_ne!(compute_conversation_id(&a, &b), compute_conversation_id(&a, &c));
    }
}
