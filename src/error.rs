//! Crate-wide error taxonomy.
//!
//! Mirrors the disposition table of the error-handling design: each variant
//! names a failure kind that the rest of the crate reacts to differently
//! (reject-and-continue vs. surface-to-caller vs. propagate). Individual
//! modules keep their own narrower `thiserror` enums for construction-site
//! detail and convert into this one at call boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerbethError {
    #[error("Ed25519 signature verification failed")]
    InvalidSignature,

    #[error("identity binding proof invalid")]
    InvalidProof,

    #[error("ML-KEM decapsulation failed")]
    InvalidKemCiphertext,

    #[error("ratchet decryption failed (MAC mismatch)")]
    DecryptionFailed,

    #[error("skip distance {0} exceeds MAX_SKIP_PER_MESSAGE")]
    ExcessiveSkip(u32),

    #[error("no session matches inbound topic")]
    NoSession,

    #[error("encrypt attempted before first DH step")]
    SessionNotReady,

    #[error("storage adapter failure: {0}")]
    StorageFailure(String),

    #[error("transaction submission failed: {0}")]
    ExecutorFailure(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("cryptographic primitive error: {0}")]
    Crypto(String),
}

pub type Result<T> = std::result::Result<T, VerbethError>;
