// Crate-level lint configuration — suppress stylistic warnings that don't affect correctness.
// Security-relevant lints (unsafe, unchecked, etc.) remain enforced.
#![allow(
    clippy::empty_line_after_doc_comments,
    clippy::doc_lazy_continuation,
    clippy::too_many_arguments,
    clippy::type_complexity,
    clippy::inherent_to_string,
    clippy::manual_strip,
    clippy::needless_range_loop
)]

pub mod crypto;
pub mod error;
pub mod interfaces;
pub mod protocol;
pub mod session;

// Re-export main types
pub use crypto::{
    decrypt, derive_from_seed_signature, derive_identity_keypair, encrypt, generate_kem_keypair,
    initiator_init, kem_decapsulate, kem_encapsulate, responder_init, verify_eip191,
    verify_identity_proof, verify_message_signature, IdentityKeyPair, KemKeypair,
};
pub use error::{Result, VerbethError};
pub use interfaces::{Executor, PendingStore, SessionStore, Signer, TxHandle};
pub use protocol::{
    decrypt_response, encrypt_response, recipient_hash, HandshakePayload, HandshakeResponseContent,
    IdentityProof, RatchetHeader, RatchetMessage, UnifiedPubKeys,
};
pub use session::{
    compute_conversation_id, HsrTagIndex, PendingHandshake, PendingManager, PendingMessage,
    PendingStatus, RatchetSession, SessionManager, SessionMatchKind, SkippedKey,
};

// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version
pub fn get_version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let version = get_version();
        assert!(!version.is_empty());
    }
}
