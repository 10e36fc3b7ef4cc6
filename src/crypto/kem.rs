//! ML-KEM-768 key encapsulation (NIST FIPS 203).
//!
//! Adapted from `pqc/hybrid_kem.rs` and `pqc/types.rs`, which combined X25519
//! with Kyber-1024 via `pqc_kyber`. The handshake engine here needs a bare
//! ML-KEM-768 keypair/encapsulate/decapsulate primitive — the X25519 leg and
//! the secret-combining step both live in `schedule.rs` instead, since the
//! spec's root-key derivation (§4.1) combines them through HKDF directly
//! rather than through a KEM-internal combiner. Sized per spec §6/glossary:
//! 1184 B public key, 1088 B ciphertext, 32 B shared secret.

use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{Encoded, EncodedSizeUser, KemCore, MlKem768};
use rand_core::CryptoRngCore;
use thiserror::Error;
use zeroize::Zeroize;

pub const KEM_PUBLIC_KEY_BYTES: usize = 1184;
pub const KEM_SECRET_KEY_BYTES: usize = 2400;
pub const KEM_CIPHERTEXT_BYTES: usize = 1088;
pub const KEM_SHARED_SECRET_BYTES: usize = 32;

#[derive(Error, Debug)]
pub enum KemError {
    #[error("ML-KEM key generation failed")]
    KeyGenFailed,
    #[error("ML-KEM encapsulation failed")]
    EncapsulationFailed,
    #[error("ML-KEM decapsulation failed")]
    DecapsulationFailed,
    #[error("invalid ML-KEM key or ciphertext length")]
    InvalidLength,
}

pub type Result<T> = std::result::Result<T, KemError>;

/// A fresh ML-KEM-768 keypair. Generated randomly per handshake; spec does not
/// require deterministic KEM keys (unlike the identity X25519/Ed25519 keys).
#[derive(Clone, zeroize::Zeroize)]
#[zeroize(drop)]
pub struct KemKeypair {
    pub public: [u8; KEM_PUBLIC_KEY_BYTES],
    pub secret: [u8; KEM_SECRET_KEY_BYTES],
}

pub fn generate_kem_keypair(rng: &mut impl CryptoRngCore) -> Result<KemKeypair> {
    let (dk, ek) = MlKem768::generate(rng);
    let ek_bytes = ek.as_bytes();
    let dk_bytes = dk.as_bytes();

    let mut public = [0u8; KEM_PUBLIC_KEY_BYTES];
    let mut secret = [0u8; KEM_SECRET_KEY_BYTES];
    if ek_bytes.len() != KEM_PUBLIC_KEY_BYTES || dk_bytes.len() != KEM_SECRET_KEY_BYTES {
        return Err(KemError::KeyGenFailed);
    }
    public.copy_from_slice(ek_bytes.as_slice());
    secret.copy_from_slice(dk_bytes.as_slice());
    Ok(KemKeypair { public, secret })
}

/// Encapsulate to a peer's ML-KEM-768 public key, producing (ciphertext, shared_secret).
pub fn kem_encapsulate(
    their_public: &[u8; KEM_PUBLIC_KEY_BYTES],
    rng: &mut impl CryptoRngCore,
) -> Result<([u8; KEM_CIPHERTEXT_BYTES], [u8; KEM_SHARED_SECRET_BYTES])> {
    let ek_encoded = Encoded::<<MlKem768 as KemCore>::EncapsulationKey>::try_from(their_public.as_slice())
        .map_err(|_| KemError::InvalidLength)?;
    let ek = <MlKem768 as KemCore>::EncapsulationKey::from_bytes(&ek_encoded);

    let (ct, shared) = ek
        .encapsulate(rng)
        .map_err(|_| KemError::EncapsulationFailed)?;

    if ct.len() != KEM_CIPHERTEXT_BYTES || shared.len() != KEM_SHARED_SECRET_BYTES {
        return Err(KemError::EncapsulationFailed);
    }
    let mut ct_bytes = [0u8; KEM_CIPHERTEXT_BYTES];
    let mut shared_bytes = [0u8; KEM_SHARED_SECRET_BYTES];
    ct_bytes.copy_from_slice(ct.as_slice());
    shared_bytes.copy_from_slice(shared.as_slice());
    Ok((ct_bytes, shared_bytes))
}

/// Decapsulate a ciphertext with our secret key, recovering the shared secret.
pub fn kem_decapsulate(
    our_secret: &[u8; KEM_SECRET_KEY_BYTES],
    ciphertext: &[u8; KEM_CIPHERTEXT_BYTES],
) -> Result<[u8; KEM_SHARED_SECRET_BYTES]> {
    let dk_encoded = Encoded::<<MlKem768 as KemCore>::DecapsulationKey>::try_from(our_secret.as_slice())
        .map_err(|_| KemError::InvalidLength)?;
    let dk = <MlKem768 as KemCore>::DecapsulationKey::from_bytes(&dk_encoded);

    let ct_encoded = ml_kem::Ciphertext::<MlKem768>::try_from(ciphertext.as_slice())
        .map_err(|_| KemError::InvalidLength)?;

    let shared = dk
        .decapsulate(&ct_encoded)
        .map_err(|_| KemError::DecapsulationFailed)?;

    if shared.len() != KEM_SHARED_SECRET_BYTES {
        return Err(KemError::DecapsulationFailed);
    }
    let mut shared_bytes = [0u8; KEM_SHARED_SECRET_BYTES];
    shared_bytes.copy_from_slice(shared.as_slice());
    Ok(shared_bytes)
}

/// Zeroize a transient shared-secret buffer once it has been folded into the key schedule.
pub fn wipe_shared_secret(mut secret: [u8; KEM_SHARED_SECRET_BYTES]) {
    secret.zeroize();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn keypair_has_expected_sizes() {
        let mut rng = OsRng;
        let kp = generate_kem_keypair(&mut rng).unwrap();
        assert_eq!(kp.public.len(), KEM_PUBLIC_KEY_BYTES);
        assert_eq!(kp.secret.len(), KEM_SECRET_KEY_BYTES);
    }

    #[test]
    fn encapsulate_decapsulate_roundtrip() {
        let mut rng = OsRng;
        let kp = generate_kem_keypair(&mut rng).unwrap();
        let (ct, shared1) = kem_encapsulate(&kp.public, &mut rng).unwrap();
        assert_eq!(ct.len(), KEM_CIPHERTEXT_BYTES);
        let shared2 = kem_decapsulate(&kp.secret, &ct).unwrap();
        assert_eq!(shared1, shared2);
    }

    #[test]
    fn wrong_secret_key_yields_different_secret() {
        let mut rng = OsRng;
        let kp1 = generate_kem_keypair(&mut rng).unwrap();
        let kp2 = generate_kem_keypair(&mut rng).unwrap();
        let (ct, shared1) = kem_encapsulate(&kp1.public, &mut rng).unwrap();
        let shared2 = kem_decapsulate(&kp2.secret, &ct).unwrap();
        assert_ne!(shared1, shared2);
    }
}
