//! Verifier (spec §4.10): identity-binding proof verification and ratchet
//! message signature verification.
//!
//! The line-parsing/field-comparison steps are pure core logic; final
//! signature verification is delegated to the host's `Signer`
//! (`interfaces::Signer`) because EIP-1271 smart-contract verification
//! requires an RPC call, which is out of scope (§1). `verify_eip191` below is
//! a ready-made pure-math EIP-191 recoverer a host can use to implement the
//! EOA half of that trait without needing its own secp256k1 stack — grounded
//! on `crypto/signing.rs`'s Ed25519 verify wrapper, generalized to secp256k1
//! recovery since the teacher never targeted Ethereum identities.

use ed25519_dalek::{Signature as EdSignature, Verifier as _, VerifyingKey};
use k256::ecdsa::{RecoveryId, Signature as K256Signature, VerifyingKey as K256VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::error::{Result, VerbethError};
use crate::interfaces::Signer;

pub struct ExpectedKeys<'a> {
    pub x25519_pub_hex: &'a str,
    pub ed25519_pub_hex: &'a str,
}

#[derive(Default)]
pub struct VerifyContext {
    pub chain_id: Option<u64>,
    pub rp_id: Option<String>,
}

/// keccak256("\x19Ethereum Signed Message:\n" || len(message) || message),
/// the EIP-191 `personal_sign` prehash.
pub fn eip191_hash(message: &str) -> [u8; 32] {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    let mut hasher = Keccak256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(message.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Recover the 20-byte Ethereum address that produced `sig` over `message`
/// under the EIP-191 personal_sign scheme.
pub fn recover_eip191_address(message: &str, sig: &[u8; 65]) -> Result<[u8; 20]> {
    let hash = eip191_hash(message);
    let recovery_id = RecoveryId::from_byte(normalize_recovery_byte(sig[64]))
        .ok_or_else(|| VerbethError::Crypto("invalid recovery id".into()))?;
    let signature = K256Signature::from_slice(&sig[..64])
        .map_err(|_| VerbethError::Crypto("invalid ECDSA signature encoding".into()))?;

    let verifying_key = K256VerifyingKey::recover_from_prehash(&hash, &signature, recovery_id)
        .map_err(|_| VerbethError::InvalidProof)?;

    let encoded = verifying_key.to_encoded_point(false);
    let pubkey_bytes = encoded.as_bytes(); // 0x04 || X(32) || Y(32)
    let mut hasher = Keccak256::new();
    hasher.update(&pubkey_bytes[1..]);
    let digest = hasher.finalize();

    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    Ok(address)
}

fn normalize_recovery_byte(v: u8) -> u8 {
    // Ethereum signatures carry v as 27/28 (legacy) or 0/1 (EIP-155 stripped).
    if v >= 27 {
        v - 27
    } else {
        v
    }
}

/// Pure-math EIP-191 verification (no EIP-1271 fallback). Suitable as the
/// EOA half of a host `Signer` implementation.
pub fn verify_eip191(address: &[u8; 20], message: &str, sig: &[u8; 65]) -> Result<bool> {
    match recover_eip191_address(message, sig) {
        Ok(recovered) => Ok(&recovered == address),
        Err(_) => Ok(false),
    }
}

/// Steps 1-4 of §4.10: parse the binding-proof message and compare its
/// fields against what was presented on the wire. Returns the parsed
/// `(address, ed25519_hex, x25519_hex)` triple on success, so the caller can
/// feed the signature check into a `Signer`.
pub fn check_binding_fields(
    message: &str,
    expected_address_lower: &str,
    expected_keys: &ExpectedKeys,
    expected_executor_addr_lower: &str,
    context: &VerifyContext,
) -> Result<()> {
    let mut lines = message.lines();
    let header = lines.next().ok_or(VerbethError::InvalidProof)?;
    if header != "VerbEth Key Binding v1" {
        return Err(VerbethError::InvalidProof);
    }

    let mut fields = std::collections::HashMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(": ") {
            fields.insert(key, value);
        }
    }

    let address = fields.get("Address").copied().ok_or(VerbethError::InvalidProof)?;
    if address.to_lowercase() != expected_address_lower.to_lowercase() {
        return Err(VerbethError::InvalidProof);
    }

    let pk_ed25519 = fields.get("PkEd25519").copied().ok_or(VerbethError::InvalidProof)?;
    if pk_ed25519 != expected_keys.ed25519_pub_hex {
        return Err(VerbethError::InvalidProof);
    }

    let pk_x25519 = fields.get("PkX25519").copied().ok_or(VerbethError::InvalidProof)?;
    if pk_x25519 != expected_keys.x25519_pub_hex {
        return Err(VerbethError::InvalidProof);
    }

    let executor_addr = fields
        .get("ExecutorAddres")
        .copied()
        .ok_or(VerbethError::InvalidProof)?;
    if executor_addr.to_lowercase() != expected_executor_addr_lower.to_lowercase() {
        return Err(VerbethError::InvalidProof);
    }

    if let Some(chain_id) = context.chain_id {
        let expected = chain_id.to_string();
        if fields.get("ChainId") != Some(&expected.as_str()) {
            return Err(VerbethError::InvalidProof);
        }
    }
    if let Some(rp_id) = &context.rp_id {
        if fields.get("RpId") != Some(&rp_id.as_str()) {
            return Err(VerbethError::InvalidProof);
        }
    }

    Ok(())
}

/// Full identity-binding proof verification (§4.10 steps 1-5): field checks
/// plus delegated signature verification.
pub fn verify_identity_proof(
    message: &str,
    signature: &[u8; 65],
    expected_address_lower: &str,
    expected_keys: &ExpectedKeys,
    expected_executor_addr_lower: &str,
    context: &VerifyContext,
    signer: &dyn Signer,
) -> Result<()> {
    check_binding_fields(
        message,
        expected_address_lower,
        expected_keys,
        expected_executor_addr_lower,
        context,
    )?;

    let address_bytes = hex_to_address(expected_address_lower)?;
    let ok = signer.verify_signature(&address_bytes, message.as_bytes(), signature)?;
    if !ok {
        return Err(VerbethError::InvalidProof);
    }
    Ok(())
}

fn hex_to_address(addr_lower: &str) -> Result<[u8; 20]> {
    let stripped = addr_lower.strip_prefix("0x").unwrap_or(addr_lower);
    let bytes = hex::decode(stripped).map_err(|_| VerbethError::InvalidProof)?;
    if bytes.len() != 20 {
        return Err(VerbethError::InvalidProof);
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Message signature verification (ratchet auth-before-ratchet, §4.5/§4.10):
/// Ed25519.verify(sig, encoded_header||nonce||ciphertext, contactSigningKey).
/// Constant-time, O(1) — `ed25519_dalek`'s verify already runs in constant
/// time over the signature check itself.
pub fn verify_message_signature(
    signing_key: &VerifyingKey,
    signed_bytes: &[u8],
    signature: &[u8; 64],
) -> bool {
    let sig = EdSignature::from_bytes(signature);
    signing_key.verify(signed_bytes, &sig).is_ok()
}
