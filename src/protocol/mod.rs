pub mod codec;
pub mod handshake;
pub mod pubkey;

pub use codec::{RatchetHeader, RatchetMessage};
pub use handshake::{
    decode_ephemeral_blob, decrypt_response, encode_ephemeral_blob, encrypt_response,
    recipient_hash, HandshakePayload, HandshakeResponseContent, IdentityProof,
};
pub use pubkey::UnifiedPubKeys;
