//! Ratchet Engine (spec §4.5): Double Ratchet with ephemeral-only initial
//! secret, DH step detection, skip-key handling, and auth-before-ratchet.
//!
//! Structurally grounded on this file's own `PQDoubleRatchet`
//! (`init_alice`/`init_bob`, `encrypt`/`decrypt`, `dh_ratchet_step`,
//! `skip_message_keys`) — the control flow below follows that shape, but the
//! KDFs are swapped for `schedule.rs`'s HKDF-SHA256 derivations (the
//! original blake3-based root/chain KDFs are not used), and the AEAD is
//! NaCl-box (XSalsa20-Poly1305 via `crypto_secretbox`) rather than
//! XChaCha20Poly1305, per the wire-format requirement in §4.2/§6.

use chrono::{DateTime, Duration, Utc};
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Key as SecretboxKey, Nonce as SecretboxNonce, XSalsa20Poly1305};
use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::crypto::schedule::{chain_step, ephemeral_initial_root_key, hybrid_initial_root_key, root_chain_step};
use crate::crypto::topic::{initial_topics, rotate_topics, PREVIOUS_TOPIC_GRACE};
use crate::crypto::verify::verify_message_signature;
use crate::error::{Result, VerbethError};
use crate::protocol::codec::{RatchetHeader, RatchetMessage};
use crate::session::types::{compute_conversation_id, RatchetSession, SkippedKey};

pub const MAX_SKIPPED_KEYS: usize = 1000;
pub const MAX_SKIP_PER_MESSAGE: u32 = 100_000;

fn skipped_key_max_age() -> Duration {
    Duration::hours(24)
}

fn x25519_dh(secret: &[u8; 32], public: &[u8; 32]) -> [u8; 32] {
    let s = StaticSecret::from(*secret);
    let p = PublicKey::from(*public);
    *s.diffie_hellman(&p).as_bytes()
}

/// Initiator init (§4.5). `handshake_secret`/`handshake_public` are the
/// initiator's handshake ephemeral (a, A). Per the standard X3DH/Double
/// Ratchet convention, Alice's first ratchet sending epoch reuses this same
/// keypair rather than minting an unrelated one — this is the only reading
/// under which Bob, who has not yet seen any fresh key from Alice, can derive
/// matching initial topics at response-emission time. Bob's side
/// (`responder_init`) leaves its mirror image of this key unset so that her
/// first inbound message is guaranteed to run the DH step. See DESIGN.md.
#[allow(clippy::too_many_arguments)]
pub fn initiator_init(
    handshake_secret: &[u8; 32],
    handshake_public: &[u8; 32],
    responder_ratchet_public: &[u8; 32],
    kem_shared: Option<[u8; 32]>,
    my_address: [u8; 20],
    contact_address: [u8; 20],
    topic_outbound: [u8; 32],
    topic_inbound: [u8; 32],
    my_signing_key: [u8; 32],
    contact_signing_key: [u8; 32],
) -> Result<RatchetSession> {
    let x25519_shared = x25519_dh(handshake_secret, responder_ratchet_public);

    let initial_root = match &kem_shared {
        Some(k) => hybrid_initial_root_key(&x25519_shared, k)?,
        None => ephemeral_initial_root_key(&x25519_shared)?,
    };

    let dh_my_secret = *handshake_secret;
    let dh_my_public = *handshake_public;

    let dh_send = x25519_dh(&dh_my_secret, responder_ratchet_public);
    let (root_key, sending_chain_key) = root_chain_step(&initial_root, &dh_send)?;

    let conversation_id = compute_conversation_id(&topic_outbound, &topic_inbound);
    let (current_topic_outbound, current_topic_inbound) = initial_topics(&dh_send, &conversation_id, false)?;

    let now = Utc::now();
    Ok(RatchetSession {
        conversation_id,
        my_address,
        contact_address,
        topic_outbound,
        topic_inbound,
        my_signing_key,
        contact_signing_key,
        root_key,
        dh_my_secret,
        dh_my_public,
        dh_their_public: Some(*responder_ratchet_public),
        sending_chain_key: Some(sending_chain_key),
        sending_msg_number: 0,
        receiving_chain_key: None,
        receiving_msg_number: 0,
        previous_chain_length: 0,
        skipped_keys: Vec::new(),
        current_topic_outbound,
        current_topic_inbound,
        next_topic_outbound: None,
        next_topic_inbound: None,
        previous_topic_inbound: None,
        previous_topic_expiry: None,
        topic_epoch: 0,
        created_at: now,
        updated_at: now,
        epoch: 0,
    })
}

/// Responder init (§4.5), run at HandshakeResponse emission time, before any
/// message has been exchanged.
#[allow(clippy::too_many_arguments)]
pub fn responder_init(
    responder_ratchet_secret: &[u8; 32],
    responder_ratchet_public: &[u8; 32],
    initiator_handshake_public: &[u8; 32],
    kem_shared: Option<[u8; 32]>,
    my_address: [u8; 20],
    contact_address: [u8; 20],
    topic_outbound: [u8; 32],
    topic_inbound: [u8; 32],
    my_signing_key: [u8; 32],
    contact_signing_key: [u8; 32],
) -> Result<RatchetSession> {
    let x25519_shared = x25519_dh(responder_ratchet_secret, initiator_handshake_public);

    let initial_root = match &kem_shared {
        Some(k) => hybrid_initial_root_key(&x25519_shared, k)?,
        None => ephemeral_initial_root_key(&x25519_shared)?,
    };

    let conversation_id = compute_conversation_id(&topic_outbound, &topic_inbound);
    let (current_topic_outbound, current_topic_inbound) = initial_topics(&x25519_shared, &conversation_id, true)?;

    let now = Utc::now();
    Ok(RatchetSession {
        conversation_id,
        my_address,
        contact_address,
        topic_outbound,
        topic_inbound,
        my_signing_key,
        contact_signing_key,
        root_key: initial_root,
        dh_my_secret: *responder_ratchet_secret,
        dh_my_public: *responder_ratchet_public,
        // Unset: Bob has not yet seen any ratchet key from Alice (only her
        // handshake key, consumed above for the initial root derivation).
        // Leaving this `None` guarantees her first inbound message runs the
        // DH step, which is the only place `receiving_chain_key` is derived.
        dh_their_public: None,
        sending_chain_key: None,
        sending_msg_number: 0,
        receiving_chain_key: None,
        receiving_msg_number: 0,
        previous_chain_length: 0,
        skipped_keys: Vec::new(),
        current_topic_outbound,
        current_topic_inbound,
        next_topic_outbound: None,
        next_topic_inbound: None,
        previous_topic_inbound: None,
        previous_topic_expiry: None,
        topic_epoch: 0,
        created_at: now,
        updated_at: now,
        epoch: 0,
    })
}

/// Encrypt a plaintext payload, returning the advanced session and the wire
/// message (§4.5 Encrypt).
pub fn encrypt(session: &RatchetSession, plaintext: &[u8]) -> Result<(RatchetSession, RatchetMessage)> {
    let sending_chain_key = session.sending_chain_key.ok_or(VerbethError::SessionNotReady)?;

    let (new_sending_chain_key, mut message_key) = chain_step(&sending_chain_key)?;

    let header = RatchetHeader {
        dh: session.dh_my_public,
        pn: session.previous_chain_length,
        n: session.sending_msg_number,
    };

    let mut nonce_bytes = [0u8; 24];
    OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = XSalsa20Poly1305::new(SecretboxKey::from_slice(&message_key));
    let nonce = SecretboxNonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| VerbethError::Crypto("secretbox encryption failed".into()))?;

    let encoded_header = header.encode();
    let mut signed_bytes = Vec::with_capacity(encoded_header.len() + 24 + ciphertext.len());
    signed_bytes.extend_from_slice(&encoded_header);
    signed_bytes.extend_from_slice(&nonce_bytes);
    signed_bytes.extend_from_slice(&ciphertext);

    let signing_key = SigningKey::from_bytes(&session.my_signing_key);
    let signature = signing_key.sign(&signed_bytes).to_bytes();

    message_key.zeroize();

    let mut new_session = session.clone();
    new_session.sending_chain_key = Some(new_sending_chain_key);
    new_session.sending_msg_number += 1;
    new_session.updated_at = Utc::now();

    let message = RatchetMessage {
        signature,
        header,
        nonce: nonce_bytes,
        ciphertext,
    };

    Ok((new_session, message))
}

/// Opaque decrypt: any recoverable cryptographic failure yields `None` so a
/// caller cannot distinguish the cause (§7: no decryption oracle leakage).
pub fn decrypt(session: &RatchetSession, message: &RatchetMessage) -> Option<(RatchetSession, Vec<u8>)> {
    try_decrypt(session, message).ok()
}

fn try_decrypt(session: &RatchetSession, message: &RatchetMessage) -> Result<(RatchetSession, Vec<u8>)> {
    // 1. Auth-before-ratchet: verify the signature before touching any state.
    let signing_key = VerifyingKey::from_bytes(&session.contact_signing_key)
        .map_err(|_| VerbethError::InvalidSignature)?;
    if !verify_message_signature(&signing_key, &message.signed_bytes(), &message.signature) {
        return Err(VerbethError::InvalidSignature);
    }

    let header = message.header;

    // 2. Sanity cap on how far we're asked to skip.
    let skip_needed = header.n.saturating_sub(session.receiving_msg_number);
    if skip_needed > MAX_SKIP_PER_MESSAGE || header.pn > MAX_SKIP_PER_MESSAGE {
        return Err(VerbethError::ExcessiveSkip(skip_needed.max(header.pn)));
    }

    let mut session = session.clone();

    // 3. Skipped-key fast path.
    let dh_hex = hex::encode(header.dh);
    if let Some(pos) = session
        .skipped_keys
        .iter()
        .position(|k| k.dh_pub_hex == dh_hex && k.msg_number == header.n)
    {
        let entry = session.skipped_keys.remove(pos);
        let plaintext = open_secretbox(&entry.message_key, &message.nonce, &message.ciphertext)?;
        session.updated_at = Utc::now();
        return Ok((session, plaintext));
    }

    // 4. DH step detection: the sender published a new ratchet public key
    // (or this is the first message this side has ever received).
    if session.dh_their_public != Some(header.dh) {
        if session.receiving_chain_key.is_some() {
            let receiving_msg_number = session.receiving_msg_number;
            skip_messages(&mut session, receiving_msg_number, header.pn)?;
        }

        let dh_receive = x25519_dh(&session.dh_my_secret, &header.dh);
        let (root_key_mid, receiving_chain_key) = root_chain_step(&session.root_key, &dh_receive)?;

        let new_secret = StaticSecret::random_from_rng(OsRng);
        let new_public = PublicKey::from(&new_secret);
        let new_secret_bytes = new_secret.to_bytes();

        let dh_send = x25519_dh(&new_secret_bytes, &header.dh);
        let (root_key_final, sending_chain_key) = root_chain_step(&root_key_mid, &dh_send)?;

        let rotation = rotate_topics(&dh_receive, &dh_send, &session.conversation_id)?;
        session.previous_topic_inbound = Some(session.current_topic_inbound);
        session.previous_topic_expiry = Some(Utc::now() + PREVIOUS_TOPIC_GRACE);
        session.current_topic_outbound = rotation.new_topic_outbound;
        session.current_topic_inbound = rotation.new_topic_inbound;
        session.next_topic_outbound = Some(rotation.next_topic_outbound);
        session.next_topic_inbound = Some(rotation.next_topic_inbound);
        session.topic_epoch += 1;

        session.root_key = root_key_final;
        session.receiving_chain_key = Some(receiving_chain_key);
        session.sending_chain_key = Some(sending_chain_key);
        session.dh_my_secret = new_secret_bytes;
        session.dh_my_public = new_public.to_bytes();
        session.dh_their_public = Some(header.dh);
        session.previous_chain_length = session.sending_msg_number;
        session.sending_msg_number = 0;
        session.receiving_msg_number = 0;
    }

    // 5. Within-epoch skip.
    if header.n > session.receiving_msg_number {
        let receiving_msg_number = session.receiving_msg_number;
        skip_messages(&mut session, receiving_msg_number, header.n)?;
    }

    // 6. Derive this message's key.
    let receiving_chain_key = session.receiving_chain_key.ok_or(VerbethError::SessionNotReady)?;
    let (new_receiving_chain_key, message_key) = chain_step(&receiving_chain_key)?;

    // 7. Decrypt.
    let plaintext = open_secretbox(&message_key, &message.nonce, &message.ciphertext)?;

    // 8. Commit.
    session.receiving_chain_key = Some(new_receiving_chain_key);
    session.receiving_msg_number = header.n + 1;
    session.updated_at = Utc::now();

    Ok((session, plaintext))
}

fn open_secretbox(key: &[u8; 32], nonce: &[u8; 24], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XSalsa20Poly1305::new(SecretboxKey::from_slice(key));
    let n = SecretboxNonce::from_slice(nonce);
    cipher
        .decrypt(n, ciphertext)
        .map_err(|_| VerbethError::DecryptionFailed)
}

/// Derive and store skip keys for message numbers in `[start, until)` on the
/// epoch the session's receiving chain currently belongs to, pruning to the
/// most-recent `MAX_SKIPPED_KEYS` entries by age (§4.5 Skip messages).
fn skip_messages(session: &mut RatchetSession, start: u32, until: u32) -> Result<()> {
    let dh_their_public = session.dh_their_public.ok_or(VerbethError::SessionNotReady)?;
    let dh_hex = hex::encode(dh_their_public);
    let mut chain_key = session.receiving_chain_key.ok_or(VerbethError::SessionNotReady)?;

    let now = Utc::now();
    for i in start..until {
        let (next_chain, message_key) = chain_step(&chain_key)?;
        chain_key = next_chain;
        session.skipped_keys.push(SkippedKey {
            dh_pub_hex: dh_hex.clone(),
            msg_number: i,
            message_key,
            created_at: now,
        });
    }
    session.receiving_chain_key = Some(chain_key);

    prune_skipped_keys(session, now);
    Ok(())
}

fn prune_skipped_keys(session: &mut RatchetSession, now: DateTime<Utc>) {
    let max_age = skipped_key_max_age();
    session.skipped_keys.retain(|k| now - k.created_at <= max_age);

    if session.skipped_keys.len() > MAX_SKIPPED_KEYS {
        session.skipped_keys.sort_by_key(|k| k.created_at);
        let excess = session.skipped_keys.len() - MAX_SKIPPED_KEYS;
        session.skipped_keys.drain(0..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;
    use x25519_dalek::{PublicKey, StaticSecret};

    fn bootstrap_pair() -> (RatchetSession, RatchetSession) {
        let a_secret = StaticSecret::random_from_rng(OsRng);
        let a_public = PublicKey::from(&a_secret);
        let r_secret = StaticSecret::random_from_rng(OsRng);
        let r_public = PublicKey::from(&r_secret);

        let alice_sign = SigningKey::generate(&mut OsRng);
        let bob_sign = SigningKey::generate(&mut OsRng);

        let topic_outbound = [1u8; 32];
        let topic_inbound = [2u8; 32];

        let alice = initiator_init(
            &a_secret.to_bytes(),
            &a_public.to_bytes(),
            &r_public.to_bytes(),
            None,
            [1u8; 20],
            [2u8; 20],
            topic_outbound,
            topic_inbound,
            alice_sign.to_bytes(),
            bob_sign.verifying_key().to_bytes(),
        )
        .unwrap();

        let bob = responder_init(
            &r_secret.to_bytes(),
            &r_public.to_bytes(),
            &a_public.to_bytes(),
            None,
            [2u8; 20],
            [1u8; 20],
            topic_inbound,
            topic_outbound,
            bob_sign.to_bytes(),
            alice_sign.verifying_key().to_bytes(),
        )
        .unwrap();

        (alice, bob)
    }

    #[test]
    fn encrypt_advances_sending_chain() {
        let (alice, _bob) = bootstrap_pair();
        let (alice2, msg0) = encrypt(&alice, b"hello").unwrap();
        assert_eq!(alice2.sending_msg_number, 1);
        let signed = msg0.signed_bytes();
        assert_eq!(&signed[..32], &alice.dh_my_public[..]);
    }

    #[test]
    fn first_message_round_trips_and_triggers_dh_step() {
        let (alice, bob) = bootstrap_pair();
        let (alice2, msg0) = encrypt(&alice, b"hello").unwrap();
        let (bob2, plaintext) = decrypt(&bob, &msg0).expect("bob should decrypt alice's first message");
        assert_eq!(plaintext, b"hello");
        assert_eq!(bob2.topic_epoch, 1);
        assert_eq!(alice2.sending_msg_number, 1);
    }

    #[test]
    fn back_and_forth_exchange_round_trips() {
        let (alice, bob) = bootstrap_pair();
        let (alice, msg0) = encrypt(&alice, b"ping").unwrap();
        let (bob, pt0) = decrypt(&bob, &msg0).unwrap();
        assert_eq!(pt0, b"ping");

        let (bob, msg1) = encrypt(&bob, b"pong").unwrap();
        let (alice, pt1) = decrypt(&alice, &msg1).unwrap();
        assert_eq!(pt1, b"pong");

        let (_alice, msg2) = encrypt(&alice, b"ping again").unwrap();
        let (_bob, pt2) = decrypt(&bob, &msg2).unwrap();
        assert_eq!(pt2, b"ping again");
    }

    #[test]
    fn out_of_order_message_is_recovered_via_skipped_keys() {
        let (alice, bob) = bootstrap_pair();
        let (alice, msg0) = encrypt(&alice, b"one").unwrap();
        let (alice, msg1) = encrypt(&alice, b"two").unwrap();
        let (_alice, msg2) = encrypt(&alice, b"three").unwrap();

        let (bob, pt2) = decrypt(&bob, &msg2).expect("message 2 arrives first");
        assert_eq!(pt2, b"three");
        assert_eq!(bob.skipped_keys.len(), 2);

        let (bob, pt0) = decrypt(&bob, &msg0).expect("message 0 recovered from skip cache");
        assert_eq!(pt0, b"one");
        assert_eq!(bob.skipped_keys.len(), 1);

        let (bob, pt1) = decrypt(&bob, &msg1).expect("message 1 recovered from skip cache");
        assert_eq!(pt1, b"two");
        assert!(bob.skipped_keys.is_empty());
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let (alice, bob) = bootstrap_pair();
        let (_alice2, mut msg0) = encrypt(&alice, b"hello").unwrap();
        let last = msg0.ciphertext.len() - 1;
        msg0.ciphertext[last] ^= 0xFF;
        assert!(decrypt(&bob, &msg0).is_none());
    }

    #[test]
    fn forged_signature_is_rejected() {
        let (alice, bob) = bootstrap_pair();
        let (_alice2, mut msg0) = encrypt(&alice, b"hello").unwrap();
        msg0.signature[0] ^= 0xFF;
        assert!(decrypt(&bob, &msg0).is_none());
    }

    #[test]
    fn excessive_skip_is_rejected() {
        let (alice, bob) = bootstrap_pair();
        let (_alice2, mut msg) = encrypt(&alice, b"hi").unwrap();
        msg.header.n = MAX_SKIP_PER_MESSAGE + 1;
        assert!(decrypt(&bob, &msg).is_none());
    }
}
