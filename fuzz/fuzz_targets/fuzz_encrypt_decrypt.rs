#![no_main]
use libfuzzer_sys::fuzz_target;
use verbeth_core::crypto::{decrypt, encrypt, initiator_init, responder_init};
use x25519_dalek::{PublicKey, StaticSecret};

fuzz_target!(|data: &[u8]| {
    if data.len() < 64 {
        return;
    }

    let mut a_secret = [0u8; 32];
    a_secret.copy_from_slice(&data[..32]);
    let mut r_secret = [0u8; 32];
    r_secret.copy_from_slice(&data[32..64]);
    let plaintext = &data[64..];

    let a_secret = StaticSecret::from(a_secret);
    let a_public = PublicKey::from(&a_secret);
    let r_secret = StaticSecret::from(r_secret);
    let r_public = PublicKey::from(&r_secret);

    let alice_sign = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
    let bob_sign = ed25519_dalek::SigningKey::from_bytes(&[8u8; 32]);

    let alice = initiator_init(
        &a_secret.to_bytes(),
        &a_public.to_bytes(),
        &r_public.to_bytes(),
        None,
        [1u8; 20],
        [2u8; 20],
        [3u8; 32],
        [4u8; 32],
        alice_sign.to_bytes(),
        bob_sign.verifying_key().to_bytes(),
    );
    let bob = responder_init(
        &r_secret.to_bytes(),
        &r_public.to_bytes(),
        &a_public.to_bytes(),
        None,
        [2u8; 20],
        [1u8; 20],
        [4u8; 32],
        [3u8; 32],
        bob_sign.to_bytes(),
        alice_sign.verifying_key().to_bytes(),
    );

    if let (Ok(alice), Ok(bob)) = (alice, bob) {
        if let Ok((_alice2, msg)) = encrypt(&alice, plaintext) {
            if let Some((_bob2, decrypted)) = decrypt(&bob, &msg) {
                assert_eq!(decrypted, plaintext, "round-trip mismatch");
            }
        }
    }
});
