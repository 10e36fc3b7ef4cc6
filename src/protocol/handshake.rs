//! Handshake Engine (spec §4.4): the two-flight exchange that bootstraps a
//! ratchet session — the plaintext `Handshake` payload and the NaCl-box
//! encrypted `HandshakeResponse` envelope.
//!
//! JSON payload assembly is grounded on `protocol/message.rs`'s dual
//! serde/bincode envelope style, generalized from that file's single
//! ratchet-message schema to the two handshake-specific schemas below. The
//! box encryption step is new: none of the five example repos carry a NaCl
//! box (asymmetric X25519+XSalsa20Poly1305) dependency, so `crypto_box` (the
//! RustCrypto sibling of `crypto_secretbox`, already in the stack for
//! message-level secretbox encryption) is added — see DESIGN.md.
//!
//! `crypto_box` 0.9's exact API (`SalsaBox::new`, `SecretKey`/`PublicKey`
//! `From<[u8; 32]>`) could not be checked against its docs in this
//! environment; treat this file's use of that crate as a best-effort
//! reconstruction, same caveat as `crypto::kem`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use crypto_box::aead::{Aead, AeadCore, OsRng as BoxOsRng};
use crypto_box::{PublicKey as BoxPublicKey, SalsaBox, SecretKey as BoxSecretKey};
use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::crypto::kem::KEM_CIPHERTEXT_BYTES;
use crate::error::{Result, VerbethError};

pub const ENVELOPE_VERSION: u8 = 1;

/// recipientHash = keccak256("contact:" || bob_addr_lower), the indexed field
/// a responder filters the event log on.
pub fn recipient_hash(addr_lower: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(b"contact:");
    hasher.update(addr_lower.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// The identity proof embedded in both handshake payloads (§4.3/§4.10).
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityProof {
    pub message: String,
    pub signature: String,
    #[serde(rename = "messageRawHex", skip_serializing_if = "Option::is_none")]
    pub message_raw_hex: Option<String>,
}

/// The initiator's plaintext Handshake payload (§4.2): `{plaintextPayload,
/// identityProof}`, no nested encryption.
#[derive(Clone, Serialize, Deserialize)]
pub struct HandshakePayload {
    pub plaintext_payload: String,
    pub identity_proof: IdentityProof,
}

impl HandshakePayload {
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct Wire<'a> {
            #[serde(rename = "plaintextPayload")]
            plaintext_payload: &'a str,
            #[serde(rename = "identityProof")]
            identity_proof: &'a IdentityProof,
        }
        serde_json::to_vec(&Wire {
            plaintext_payload: &self.plaintext_payload,
            identity_proof: &self.identity_proof,
        })
        .map_err(|e| VerbethError::Codec(e.to_string()))
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        #[derive(Deserialize)]
        struct Wire {
            #[serde(rename = "plaintextPayload")]
            plaintext_payload: String,
            #[serde(rename = "identityProof")]
            identity_proof: IdentityProof,
        }
        let wire: Wire = serde_json::from_slice(bytes).map_err(|e| VerbethError::Codec(e.to_string()))?;
        Ok(Self {
            plaintext_payload: wire.plaintext_payload,
            identity_proof: wire.identity_proof,
        })
    }
}

/// ephemeralPubKey blob for the Handshake event: `A` alone (32 B, classical)
/// or `A || kem_pk` (1216 B, hybrid).
pub fn encode_ephemeral_blob(a_public: &[u8; 32], kem_public: Option<&[u8; 1184]>) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + kem_public.map_or(0, |_| 1184));
    out.extend_from_slice(a_public);
    if let Some(kp) = kem_public {
        out.extend_from_slice(kp);
    }
    out
}

pub fn decode_ephemeral_blob(blob: &[u8]) -> Result<([u8; 32], Option<[u8; 1184]>)> {
    if blob.len() != 32 && blob.len() != 32 + 1184 {
        return Err(VerbethError::Codec(format!(
            "unexpected ephemeral blob length {}",
            blob.len()
        )));
    }
    let mut a = [0u8; 32];
    a.copy_from_slice(&blob[..32]);
    let kem_pk = if blob.len() == 32 + 1184 {
        let mut k = [0u8; 1184];
        k.copy_from_slice(&blob[32..]);
        Some(k)
    } else {
        None
    };
    Ok((a, kem_pk))
}

/// The plaintext content of a decrypted HandshakeResponse (§4.2).
#[derive(Clone)]
pub struct HandshakeResponseContent {
    pub unified_pub_keys: [u8; 65],
    pub ephemeral_pub_key: [u8; 32],
    pub kem_ciphertext: Option<[u8; KEM_CIPHERTEXT_BYTES]>,
    pub note: Option<String>,
    pub identity_proof: IdentityProof,
}

#[derive(Serialize, Deserialize)]
struct ContentWire {
    #[serde(rename = "unifiedPubKeys")]
    unified_pub_keys: String,
    #[serde(rename = "ephemeralPubKey")]
    ephemeral_pub_key: String,
    #[serde(rename = "kemCiphertext", skip_serializing_if = "Option::is_none")]
    kem_ciphertext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
    #[serde(rename = "identityProof")]
    identity_proof: IdentityProof,
}

impl HandshakeResponseContent {
    fn to_json(&self) -> Result<Vec<u8>> {
        let wire = ContentWire {
            unified_pub_keys: BASE64.encode(self.unified_pub_keys),
            ephemeral_pub_key: BASE64.encode(self.ephemeral_pub_key),
            kem_ciphertext: self.kem_ciphertext.map(|ct| BASE64.encode(ct)),
            note: self.note.clone(),
            identity_proof: self.identity_proof.clone(),
        };
        serde_json::to_vec(&wire).map_err(|e| VerbethError::Codec(e.to_string()))
    }

    fn from_json(bytes: &[u8]) -> Result<Self> {
        let wire: ContentWire = serde_json::from_slice(bytes).map_err(|e| VerbethError::Codec(e.to_string()))?;
        let unified_pub_keys = decode_fixed::<65>(&wire.unified_pub_keys)?;
        let ephemeral_pub_key = decode_fixed::<32>(&wire.ephemeral_pub_key)?;
        let kem_ciphertext = wire
            .kem_ciphertext
            .map(|s| decode_fixed::<KEM_CIPHERTEXT_BYTES>(&s))
            .transpose()?;
        Ok(Self {
            unified_pub_keys,
            ephemeral_pub_key,
            kem_ciphertext,
            note: wire.note,
            identity_proof: wire.identity_proof,
        })
    }
}

fn decode_fixed<const N: usize>(b64: &str) -> Result<[u8; N]> {
    let bytes = BASE64
        .decode(b64)
        .map_err(|e| VerbethError::Codec(e.to_string()))?;
    if bytes.len() != N {
        return Err(VerbethError::Codec(format!("expected {} bytes, got {}", N, bytes.len())));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// The outer JSON envelope around the NaCl-box ciphertext (§4.2):
/// `{v:1, epk, n, ct, sig?}`.
#[derive(Serialize, Deserialize)]
struct EnvelopeWire {
    v: u8,
    epk: String,
    n: String,
    ct: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sig: Option<String>,
}

/// Build the HandshakeResponse envelope: NaCl-box-encrypt `content` from
/// `responder_ratchet_secret` to `initiator_handshake_public`, optionally
/// sign `epk||n||ct` with `signing_key`.
pub fn encrypt_response(
    responder_ratchet_secret: &[u8; 32],
    initiator_handshake_public: &[u8; 32],
    content: &HandshakeResponseContent,
    signing_key: Option<&SigningKey>,
) -> Result<Vec<u8>> {
    let plaintext = content.to_json()?;

    let secret = BoxSecretKey::from(*responder_ratchet_secret);
    let their_public = BoxPublicKey::from(*initiator_handshake_public);
    let sbox = SalsaBox::new(&their_public, &secret);

    let nonce = SalsaBox::generate_nonce(&mut BoxOsRng);
    let ct = sbox
        .encrypt(&nonce, plaintext.as_slice())
        .map_err(|_| VerbethError::Crypto("NaCl-box encryption failed".into()))?;

    let epk = secret.public_key().as_bytes().to_owned();
    let n: [u8; 24] = nonce.into();

    let sig = signing_key.map(|sk| {
        let mut signed = Vec::with_capacity(32 + 24 + ct.len());
        signed.extend_from_slice(&epk);
        signed.extend_from_slice(&n);
        signed.extend_from_slice(&ct);
        sk.sign(&signed).to_bytes()
    });

    let wire = EnvelopeWire {
        v: ENVELOPE_VERSION,
        epk: BASE64.encode(epk),
        n: BASE64.encode(n),
        ct: BASE64.encode(&ct),
        sig: sig.map(|s| BASE64.encode(s)),
    };
    serde_json::to_vec(&wire).map_err(|e| VerbethError::Codec(e.to_string()))
}

/// Open a HandshakeResponse envelope with the initiator's handshake secret
/// `a`. Returns the decrypted content plus the responder's ratchet public key
/// (`epk`, needed for initiator session init) and, if present, the optional
/// signature's validity against `sender_signing_key`.
pub fn decrypt_response(
    initiator_handshake_secret: &[u8; 32],
    envelope_bytes: &[u8],
    sender_signing_key: Option<&VerifyingKey>,
) -> Result<(HandshakeResponseContent, [u8; 32])> {
    let wire: EnvelopeWire = serde_json::from_slice(envelope_bytes).map_err(|e| VerbethError::Codec(e.to_string()))?;
    if wire.v != ENVELOPE_VERSION {
        return Err(VerbethError::Codec(format!("unsupported envelope version {}", wire.v)));
    }

    let epk = decode_fixed::<32>(&wire.epk)?;
    let n = decode_fixed::<24>(&wire.n)?;
    let ct = BASE64.decode(&wire.ct).map_err(|e| VerbethError::Codec(e.to_string()))?;

    if let (Some(sig_b64), Some(vk)) = (&wire.sig, sender_signing_key) {
        let sig_bytes = decode_fixed::<64>(sig_b64)?;
        let mut signed = Vec::with_capacity(32 + 24 + ct.len());
        signed.extend_from_slice(&epk);
        signed.extend_from_slice(&n);
        signed.extend_from_slice(&ct);
        let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
        if vk.verify_strict(&signed, &sig).is_err() {
            return Err(VerbethError::InvalidSignature);
        }
    }

    let secret = BoxSecretKey::from(*initiator_handshake_secret);
    let their_public = BoxPublicKey::from(epk);
    let sbox = SalsaBox::new(&their_public, &secret);
    let nonce = crypto_box::Nonce::from(n);

    let plaintext = sbox
        .decrypt(&nonce, ct.as_slice())
        .map_err(|_| VerbethError::DecryptionFailed)?;

    let content = HandshakeResponseContent::from_json(&plaintext)?;
    Ok((content, epk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use x25519_dalek::{PublicKey, StaticSecret};

    fn sample_proof() -> IdentityProof {
        IdentityProof {
            message: "VerbEth Key Binding v1\nAddress: 0xabc".into(),
            signature: "deadbeef".into(),
            message_raw_hex: None,
        }
    }

    #[test]
    fn recipient_hash_is_deterministic_and_address_sensitive() {
        let h1 = recipient_hash("0xabc");
        let h2 = recipient_hash("0xabc");
        let h3 = recipient_hash("0xdef");
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[test]
    fn handshake_payload_round_trips() {
        let payload = HandshakePayload {
            plaintext_payload: "hello bob".into(),
            identity_proof: sample_proof(),
        };
        let bytes = payload.to_json_bytes().unwrap();
        let decoded = HandshakePayload::from_json_bytes(&bytes).unwrap();
        assert_eq!(decoded.plaintext_payload, "hello bob");
        assert_eq!(decoded.identity_proof.signature, "deadbeef");
    }

    #[test]
    fn ephemeral_blob_round_trips_classical_and_hybrid() {
        let a = [7u8; 32];
        let (decoded_a, decoded_kem) = decode_ephemeral_blob(&encode_ephemeral_blob(&a, None)).unwrap();
        assert_eq!(decoded_a, a);
        assert!(decoded_kem.is_none());

        let kem_pk = [9u8; 1184];
        let blob = encode_ephemeral_blob(&a, Some(&kem_pk));
        assert_eq!(blob.len(), 1216);
        let (decoded_a2, decoded_kem2) = decode_ephemeral_blob(&blob).unwrap();
        assert_eq!(decoded_a2, a);
        assert_eq!(decoded_kem2.unwrap(), kem_pk);
    }

    #[test]
    fn handshake_response_round_trips_through_box_encryption() {
        let responder_secret = StaticSecret::random_from_rng(OsRng);
        let initiator_secret = StaticSecret::random_from_rng(OsRng);
        let initiator_public = PublicKey::from(&initiator_secret);

        let content = HandshakeResponseContent {
            unified_pub_keys: [1u8; 65],
            ephemeral_pub_key: [2u8; 32],
            kem_ciphertext: None,
            note: Some("hi".into()),
            identity_proof: sample_proof(),
        };

        let envelope = encrypt_response(
            &responder_secret.to_bytes(),
            &initiator_public.to_bytes(),
            &content,
            None,
        )
        .unwrap();

        let (decoded, epk) = decrypt_response(&initiator_secret.to_bytes(), &envelope, None).unwrap();
        assert_eq!(decoded.unified_pub_keys, [1u8; 65]);
        assert_eq!(decoded.note.as_deref(), Some("hi"));
        assert_eq!(epk, PublicKey::from(&responder_secret).to_bytes());
    }

    #[test]
    fn tampered_envelope_fails_to_decrypt() {
        let responder_secret = StaticSecret::random_from_rng(OsRng);
        let initiator_secret = StaticSecret::random_from_rng(OsRng);
        let initiator_public = PublicKey::from(&initiator_secret);

        let content = HandshakeResponseContent {
            unified_pub_keys: [3u8; 65],
            ephemeral_pub_key: [4u8; 32],
            kem_ciphertext: None,
            note: None,
            identity_proof: sample_proof(),
        };

        let envelope_bytes = encrypt_response(
            &responder_secret.to_bytes(),
            &initiator_public.to_bytes(),
            &content,
            None,
        )
        .unwrap();

        let mut wire: serde_json::Value = serde_json::from_slice(&envelope_bytes).unwrap();
        wire["ct"] = serde_json::Value::String(BASE64.encode([0u8; 16]));
        let tampered = serde_json::to_vec(&wire).unwrap();

        assert!(decrypt_response(&initiator_secret.to_bytes(), &tampered, None).is_err());
    }
}
