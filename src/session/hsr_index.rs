//! HSR Tag Index (spec §4.9): O(1) matching of inbound HandshakeResponse
//! events against outstanding handshake initiations.
//!
//! Grounded on `crypto/replay_cache.rs`'s tag→value `lru::LruCache`, reused
//! here for the steady-state tag→address cache that backs the cold-path
//! decrypt-and-decapsulate scan.

use std::collections::HashMap;
use std::sync::Mutex;

use lru::LruCache;
use std::num::NonZeroUsize;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::crypto::constant_time::eq_32;
use crate::crypto::kem::{kem_decapsulate, KEM_CIPHERTEXT_BYTES, KEM_SECRET_KEY_BYTES};
use crate::crypto::schedule::{classical_hsr_tag, hybrid_hsr_tag};
use crate::protocol::handshake::decrypt_response;

const TAG_CACHE_CAPACITY: usize = 4096;

fn x25519_dh(secret: &[u8; 32], public: &[u8; 32]) -> [u8; 32] {
    let s = StaticSecret::from(*secret);
    let p = PublicKey::from(*public);
    *s.diffie_hellman(&p).as_bytes()
}

/// A pending outbound handshake this node initiated and is waiting on a
/// response for.
#[derive(Clone)]
pub struct PendingHandshake {
    pub address: [u8; 20],
    pub handshake_secret: [u8; 32],
    pub kem_secret: [u8; KEM_SECRET_KEY_BYTES],
}

pub struct HsrTagIndex {
    pending: Mutex<HashMap<[u8; 20], PendingHandshake>>,
    tag_cache: Mutex<LruCache<[u8; 32], [u8; 20]>>,
    /// §9 open question: whether the pre-hybrid classical tag is still
    /// accepted for contacts that initiated before the hybrid upgrade.
    /// Defaults to false — see DESIGN.md.
    accept_legacy_tag: bool,
}

impl HsrTagIndex {
    pub fn new(accept_legacy_tag: bool) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            tag_cache: Mutex::new(LruCache::new(NonZeroUsize::new(TAG_CACHE_CAPACITY).unwrap())),
            accept_legacy_tag,
        }
    }

    pub fn insert_pending(&self, entry: PendingHandshake) {
        self.pending.lock().unwrap().insert(entry.address, entry);
    }

    pub fn remove_pending(&self, address: &[u8; 20]) -> Option<PendingHandshake> {
        self.pending.lock().unwrap().remove(address)
    }

    /// Step 1 of §4.9: tag→address cache hit.
    fn cache_lookup(&self, tag: &[u8; 32]) -> Option<[u8; 20]> {
        self.tag_cache.lock().unwrap().get(tag).copied()
    }

    /// Match an inbound HandshakeResponse's `inResponseTo` tag against the
    /// set of pending contacts this node is still waiting on.
    ///
    /// `r_tag` is the on-chain tag pubkey (`R_tag`), deliberately distinct
    /// from the confidential ratchet-ephemeral pubkey embedded inside the
    /// encrypted envelope (§4.4 "Distinct tag vs ratchet keypairs").
    pub fn match_response(
        &self,
        in_response_to_tag: &[u8; 32],
        r_tag: &[u8; 32],
        encrypted_payload: &[u8],
    ) -> Option<[u8; 20]> {
        if let Some(addr) = self.cache_lookup(in_response_to_tag) {
            return Some(addr);
        }

        let candidates: Vec<PendingHandshake> = self.pending.lock().unwrap().values().cloned().collect();

        for candidate in candidates {
            let (content, _epk) = match decrypt_response(&candidate.handshake_secret, encrypted_payload, None) {
                Ok(v) => v,
                Err(_) => continue,
            };

            let ecdh_shared = x25519_dh(&candidate.handshake_secret, r_tag);

            let expected_tag = match content.kem_ciphertext {
                Some(ct) => {
                    let ct: [u8; KEM_CIPHERTEXT_BYTES] = ct;
                    match kem_decapsulate(&candidate.kem_secret, &ct) {
                        Ok(kem_shared) => match hybrid_hsr_tag(&ecdh_shared, &kem_shared) {
                            Ok(t) => t,
                            Err(_) => continue,
                        },
                        Err(_) => continue,
                    }
                }
                None => {
                    if !self.accept_legacy_tag {
                        continue;
                    }
                    match classical_hsr_tag(&ecdh_shared) {
                        Ok(t) => t,
                        Err(_) => continue,
                    }
                }
            };

            self.tag_cache
                .lock()
                .unwrap()
                .put(expected_tag, candidate.address);

            if eq_32(&expected_tag, in_response_to_tag) {
                return Some(candidate.address);
            }
        }

        None
    }
}
