//! HKDF-SHA256 key schedule (spec §4.1).
//!
//! Every derivation here is domain-separated by a literal info label; the
//! labels and lengths below are an interoperability surface and must not be
//! changed. Adapted from `encryption.rs::derive_root_key`'s use of
//! `hkdf::Hkdf<Sha256>` — that function already derived a single root key
//! this way, generalized here into the full root/chain/hybrid/tag/topic
//! family the ratchet and handshake engines need.

use hkdf::Hkdf;
use sha2::Sha256;
use sha3::{Digest, Keccak256};
use zeroize::Zeroize;

use crate::error::{Result, VerbethError};

const ROOT_INFO: &[u8] = b"verbeth:root:v1";
const CHAIN_INFO: &[u8] = b"verbeth:chain:v1";
const HYBRID_INFO: &[u8] = b"VerbethHybrid";
const EPHEMERAL_INFO: &[u8] = b"VerbethEphemeral";
const HSR_HYBRID_INFO: &[u8] = b"verbeth:hsr-hybrid:v1";
const HSR_CLASSICAL_INFO: &[u8] = b"verbeth:hsr";

/// Direction label used in topic derivation; spelled out in full per §4.1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopicDirection {
    Outbound,
    Inbound,
}

impl TopicDirection {
    fn info_label(self) -> Vec<u8> {
        match self {
            TopicDirection::Outbound => b"verbeth:topic:outbound:v1".to_vec(),
            TopicDirection::Inbound => b"verbeth:topic:inbound:v1".to_vec(),
        }
    }
}

fn hkdf_expand(ikm: &[u8], salt: &[u8], info: &[u8], out: &mut [u8]) -> Result<()> {
    let salt_opt = if salt.is_empty() { None } else { Some(salt) };
    let hk = Hkdf::<Sha256>::new(salt_opt, ikm);
    hk.expand(info, out)
        .map_err(|_| VerbethError::Crypto("HKDF expand failed (output too long)".into()))
}

/// Root-chain step: HKDF(ikm=dhOutput, salt=rootKey, info="verbeth:root:v1", L=64).
/// Returns (new_root_key, new_chain_key).
pub fn root_chain_step(root_key: &[u8; 32], dh_output: &[u8; 32]) -> Result<([u8; 32], [u8; 32])> {
    let mut okm = [0u8; 64];
    hkdf_expand(dh_output, root_key, ROOT_INFO, &mut okm)?;
    let mut new_root = [0u8; 32];
    let mut new_chain = [0u8; 32];
    new_root.copy_from_slice(&okm[..32]);
    new_chain.copy_from_slice(&okm[32..]);
    okm.zeroize();
    Ok((new_root, new_chain))
}

/// Chain step: HKDF(ikm=chainKey, salt=∅, info="verbeth:chain:v1", L=64).
/// Returns (new_chain_key, message_key). message_key must be consumed once.
pub fn chain_step(chain_key: &[u8; 32]) -> Result<([u8; 32], [u8; 32])> {
    let mut okm = [0u8; 64];
    hkdf_expand(chain_key, &[], CHAIN_INFO, &mut okm)?;
    let mut new_chain = [0u8; 32];
    let mut message_key = [0u8; 32];
    new_chain.copy_from_slice(&okm[..32]);
    message_key.copy_from_slice(&okm[32..]);
    okm.zeroize();
    Ok((new_chain, message_key))
}

/// Initial root key for a hybrid (classical + ML-KEM) handshake.
/// ikm = x25519_shared || kem_shared. HKDF(ikm, salt=zeros(32), info="VerbethHybrid", L=32).
pub fn hybrid_initial_root_key(x25519_shared: &[u8; 32], kem_shared: &[u8; 32]) -> Result<[u8; 32]> {
    let mut ikm = Vec::with_capacity(64);
    ikm.extend_from_slice(x25519_shared);
    ikm.extend_from_slice(kem_shared);
    let salt = [0u8; 32];
    let mut out = [0u8; 32];
    let r = hkdf_expand(&ikm, &salt, HYBRID_INFO, &mut out);
    ikm.zeroize();
    r?;
    Ok(out)
}

/// Initial root key for a classical-only (no ML-KEM public key offered) handshake.
/// HKDF(x25519_shared, ∅, "VerbethEphemeral", 32).
pub fn ephemeral_initial_root_key(x25519_shared: &[u8; 32]) -> Result<[u8; 32]> {
    let mut out = [0u8; 32];
    hkdf_expand(x25519_shared, &[], EPHEMERAL_INFO, &mut out)?;
    Ok(out)
}

/// Hybrid HSR tag: HKDF(ikm=kem_shared, salt=ecdh_shared, info="verbeth:hsr-hybrid:v1", L=32),
/// then keccak256 of the output.
pub fn hybrid_hsr_tag(ecdh_shared: &[u8; 32], kem_shared: &[u8; 32]) -> Result<[u8; 32]> {
    let mut okm = [0u8; 32];
    hkdf_expand(kem_shared, ecdh_shared, HSR_HYBRID_INFO, &mut okm)?;
    let mut hasher = Keccak256::new();
    hasher.update(okm);
    let digest = hasher.finalize();
    okm.zeroize();
    let mut tag = [0u8; 32];
    tag.copy_from_slice(&digest);
    Ok(tag)
}

/// Legacy classical (KEM-free) HSR tag, retained read-only for compatibility (§9 open
/// question). HKDF(ikm=ecdh_shared, salt=∅, info="verbeth:hsr", L=32), then keccak256.
pub fn classical_hsr_tag(ecdh_shared: &[u8; 32]) -> Result<[u8; 32]> {
    let mut okm = [0u8; 32];
    hkdf_expand(ecdh_shared, &[], HSR_CLASSICAL_INFO, &mut okm)?;
    let mut hasher = Keccak256::new();
    hasher.update(okm);
    let digest = hasher.finalize();
    okm.zeroize();
    let mut tag = [0u8; 32];
    tag.copy_from_slice(&digest);
    Ok(tag)
}

/// Topic derivation: HKDF(ikm=dh_shared, salt, info="verbeth:topic:<direction>:v1", L=32),
/// then keccak256-wrapped to match the on-chain bytes32 topic format.
pub fn derive_topic(dh_shared: &[u8; 32], direction: TopicDirection, salt: &[u8]) -> Result<[u8; 32]> {
    let info = direction.info_label();
    let mut okm = [0u8; 32];
    hkdf_expand(dh_shared, salt, &info, &mut okm)?;
    let mut hasher = Keccak256::new();
    hasher.update(okm);
    let digest = hasher.finalize();
    okm.zeroize();
    let mut topic = [0u8; 32];
    topic.copy_from_slice(&digest);
    Ok(topic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_chain_step_is_deterministic() {
        let root = [1u8; 32];
        let dh = [2u8; 32];
        let (r1, c1) = root_chain_step(&root, &dh).unwrap();
        let (r2, c2) = root_chain_step(&root, &dh).unwrap();
        assert_eq!(r1, r2);
        assert_eq!(c1, c2);
        assert_ne!(r1, c1);
    }

    #[test]
    fn chain_step_advances_and_differs_from_message_key() {
        let chain = [5u8; 32];
        let (new_chain, mk) = chain_step(&chain).unwrap();
        assert_ne!(new_chain, chain);
        assert_ne!(new_chain, mk);
    }

    #[test]
    fn hybrid_and_ephemeral_roots_differ() {
        let shared = [9u8; 32];
        let kem = [7u8; 32];
        let hybrid = hybrid_initial_root_key(&shared, &kem).unwrap();
        let classical = ephemeral_initial_root_key(&shared).unwrap();
        assert_ne!(hybrid, classical);
    }

    #[test]
    fn hybrid_tag_sensitive_to_kem_shared() {
        let ecdh = [3u8; 32];
        let kem1 = [1u8; 32];
        let kem2 = [2u8; 32];
        let t1 = hybrid_hsr_tag(&ecdh, &kem1).unwrap();
        let t2 = hybrid_hsr_tag(&ecdh, &kem2).unwrap();
        assert_ne!(t1, t2);
    }

    #[test]
    fn topic_directions_differ() {
        let dh = [4u8; 32];
        let salt = b"conversation-salt";
        let out = derive_topic(&dh, TopicDirection::Outbound, salt).unwrap();
        let inb = derive_topic(&dh, TopicDirection::Inbound, salt).unwrap();
        assert_ne!(out, inb);
    }

    #[test]
    fn classical_and_hybrid_tags_differ() {
        let ecdh = [8u8; 32];
        let kem = [6u8; 32];
        let classical = classical_hsr_tag(&ecdh).unwrap();
        let hybrid = hybrid_hsr_tag(&ecdh, &kem).unwrap();
        assert_ne!(classical, hybrid);
    }
}
