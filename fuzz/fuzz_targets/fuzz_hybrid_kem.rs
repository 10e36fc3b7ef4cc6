#![no_main]
use libfuzzer_sys::fuzz_target;
use rand_chacha::ChaChaRng;
use rand_core::SeedableRng;
use verbeth_core::crypto::{generate_kem_keypair, kem_decapsulate, kem_encapsulate};

fuzz_target!(|data: &[u8]| {
    if data.len() < 32 {
        return;
    }

    let mut seed = [0u8; 32];
    seed.copy_from_slice(&data[..32]);
    let mut rng = ChaChaRng::from_seed(seed);

    if let Ok(keypair) = generate_kem_keypair(&mut rng) {
        if let Ok((ciphertext, shared1)) = kem_encapsulate(&keypair.public, &mut rng) {
            let shared2 =
                kem_decapsulate(&keypair.secret, &ciphertext).expect("decapsulation of valid ciphertext must succeed");
            assert_eq!(shared1, shared2, "shared secret mismatch");
        }
    }

    // Decapsulating arbitrary ciphertext bytes against a fresh keypair must not panic.
    if data.len() >= 32 + verbeth_core::crypto::kem::KEM_CIPHERTEXT_BYTES {
        if let Ok(keypair) = generate_kem_keypair(&mut rng) {
            let mut ct = [0u8; verbeth_core::crypto::kem::KEM_CIPHERTEXT_BYTES];
            ct.copy_from_slice(&data[32..32 + verbeth_core::crypto::kem::KEM_CIPHERTEXT_BYTES]);
            let _ = kem_decapsulate(&keypair.secret, &ct);
        }
    }
});
