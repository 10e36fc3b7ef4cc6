//! Identity Binding (spec §4.3): deterministic derivation of
//! X25519 + Ed25519 + session-secp256k1 keys from a wallet seed signature,
//! and the binding-proof message format that ties those keys to an
//! executor address on-chain.
//!
//! Grounded on `crypto/signing.rs` (Ed25519 keypair construction) and
//! `protocol/contact.rs::serialize_for_signing` (manual plaintext-message
//! assembly for a signed proof) — both generalized to the seed-derivation and
//! binding-proof formats this spec requires, which the teacher's Solana-era
//! code does not.

use ed25519_dalek::{SigningKey, VerifyingKey};
use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Result, VerbethError};

const SEED_SALT: &[u8] = b"verbeth/seed-sig-v1";
const IKM_INFO: &[u8] = b"verbeth/ikm";
const X25519_LABEL: &[u8] = b"verbeth-x25519-v1";
const ED25519_LABEL: &[u8] = b"verbeth-ed25519-v1";
const SESSION_SECP256K1_LABEL: &[u8] = b"verbeth-session-secp256k1-v1";

const KEY_BINDING_HEADER: &str = "VerbEth Key Binding v1";

/// secp256k1 curve order / 2, used to canonicalize ECDSA `s` to its low value
/// (malleability fix — the wallet signer MAY produce either root of s).
const SECP256K1_N: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe,
    0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41, 0x41,
];
const SECP256K1_HALF_N: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b, 0x20, 0xa0,
];

/// The full derived identity keyset. Lives only as long as the application
/// needs it in memory; the caller is responsible for persisting the public
/// halves and zeroizing the secrets when done (Drop handles the rest).
#[derive(Clone, zeroize::Zeroize)]
#[zeroize(drop)]
pub struct IdentityKeyPair {
    pub x25519_secret: [u8; 32],
    #[zeroize(skip)]
    pub x25519_public: [u8; 32],
    pub ed25519_seed: [u8; 32],
    #[zeroize(skip)]
    pub ed25519_public: [u8; 32],
    pub session_secp256k1_secret: [u8; 32],
}

impl IdentityKeyPair {
    pub fn x25519_static_secret(&self) -> StaticSecret {
        StaticSecret::from(self.x25519_secret)
    }

    pub fn ed25519_signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.ed25519_seed)
    }
}

/// The literal message the wallet signs to produce the deterministic seed
/// signature. Byte-exact per §4.3.
pub fn seed_message(addr_lower: &str) -> String {
    format!("VerbEth Identity Seed v1\nAddress: {}\nContext: verbeth", addr_lower)
}

/// Canonicalize a 65-byte ECDSA signature (r || s || v) to low-s form.
/// If `s > N/2`, replace `s` with `N - s` and flip the recovery bit.
pub fn canonicalize_signature(sig: &[u8; 65]) -> [u8; 65] {
    let mut out = *sig;
    let s = &sig[32..64];
    if s > &SECP256K1_HALF_N[..] {
        let new_s = sub_mod_n(s);
        out[32..64].copy_from_slice(&new_s);
        out[64] ^= 1;
    }
    out
}

/// Big-endian 256-bit subtraction: N - s, where s < N is guaranteed by a
/// valid ECDSA signature.
fn sub_mod_n(s: &[u8]) -> [u8; 32] {
    let mut result = [0u8; 32];
    let mut borrow: i16 = 0;
    for i in (0..32).rev() {
        let n_byte = SECP256K1_N[i] as i16;
        let s_byte = s[i] as i16;
        let mut diff = n_byte - s_byte - borrow;
        if diff < 0 {
            diff += 256;
            borrow = 1;
        } else {
            borrow = 0;
        }
        result[i] = diff as u8;
    }
    result
}

/// Assemble IKM from the canonical signature, the seed message hash, and the
/// address, per §4.3: ikm_input = canonical_sig || sha256(seed_message) ||
/// utf8("verbeth/addr:"||addr_lower); IKM = HKDF(ikm_input, salt, info, 32).
pub fn derive_ikm(canonical_sig: &[u8; 65], seed_msg: &str, addr_lower: &str) -> Result<[u8; 32]> {
    let seed_hash = Sha256::digest(seed_msg.as_bytes());
    let mut ikm_input = Vec::with_capacity(65 + 32 + 13 + addr_lower.len());
    ikm_input.extend_from_slice(canonical_sig);
    ikm_input.extend_from_slice(&seed_hash);
    ikm_input.extend_from_slice(format!("verbeth/addr:{}", addr_lower).as_bytes());

    let hk = Hkdf::<Sha256>::new(Some(SEED_SALT), &ikm_input);
    ikm_input.zeroize();

    let mut ikm = [0u8; 32];
    hk.expand(IKM_INFO, &mut ikm)
        .map_err(|_| VerbethError::Crypto("IKM expansion failed".into()))?;
    Ok(ikm)
}

/// Derive the three independent keys from IKM, each via its own HKDF label
/// with an empty salt. Each intermediate buffer is wrapped in `Zeroizing` so
/// an early return on any `hk.expand` failure still wipes whatever was
/// already derived, rather than dropping it as a plain, unzeroized array.
pub fn derive_identity_keypair(ikm: &[u8; 32]) -> Result<IdentityKeyPair> {
    let hk = Hkdf::<Sha256>::new(None, ikm);

    let mut x25519_secret = Zeroizing::new([0u8; 32]);
    hk.expand(X25519_LABEL, &mut *x25519_secret)
        .map_err(|_| VerbethError::Crypto("x25519 key derivation failed".into()))?;

    let mut ed25519_seed = Zeroizing::new([0u8; 32]);
    hk.expand(ED25519_LABEL, &mut *ed25519_seed)
        .map_err(|_| VerbethError::Crypto("ed25519 key derivation failed".into()))?;

    let mut session_secp256k1_secret = Zeroizing::new([0u8; 32]);
    hk.expand(SESSION_SECP256K1_LABEL, &mut *session_secp256k1_secret)
        .map_err(|_| VerbethError::Crypto("session secp256k1 derivation failed".into()))?;

    let x25519_public = X25519PublicKey::from(&StaticSecret::from(*x25519_secret)).to_bytes();
    let signing_key = SigningKey::from_bytes(&ed25519_seed);
    let ed25519_public = VerifyingKey::from(&signing_key).to_bytes();

    Ok(IdentityKeyPair {
        x25519_secret: *x25519_secret,
        x25519_public,
        ed25519_seed: *ed25519_seed,
        ed25519_public,
        session_secp256k1_secret: *session_secp256k1_secret,
    })
}

/// End-to-end derivation: seed signature in, full keypair out. The caller
/// supplies the raw 65-byte wallet signature over `seed_message(addr_lower)`.
pub fn derive_from_seed_signature(raw_sig: &[u8; 65], addr_lower: &str) -> Result<IdentityKeyPair> {
    let msg = seed_message(addr_lower);
    let canonical = canonicalize_signature(raw_sig);
    let mut ikm = derive_ikm(&canonical, &msg, addr_lower)?;
    let keypair = derive_identity_keypair(&ikm);
    ikm.zeroize();
    keypair
}

/// The binding-proof plaintext message (§4.3/§4.10). Field order and labels
/// are the verification surface; do not reorder.
pub fn binding_message(
    addr_lower: &str,
    ed25519_pub_hex: &str,
    x25519_pub_hex: &str,
    executor_addr_hex: &str,
    chain_id: Option<u64>,
    rp_id: Option<&str>,
) -> String {
    let mut lines = vec![
        KEY_BINDING_HEADER.to_string(),
        format!("Address: {}", addr_lower),
        format!("PkEd25519: {}", ed25519_pub_hex),
        format!("PkX25519: {}", x25519_pub_hex),
        format!("ExecutorAddres: {}", executor_addr_hex),
    ];
    if let Some(cid) = chain_id {
        lines.push(format!("ChainId: {}", cid));
    }
    if let Some(rp) = rp_id {
        lines.push(format!("RpId: {}", rp));
    }
    lines.join("\n")
}
