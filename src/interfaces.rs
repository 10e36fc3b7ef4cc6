//! External collaborator contracts (spec §6). None of these are implemented
//! by this crate — the event-log sink, RPC layer, persistence, UI, rate
//! limiting, and account-abstraction executor are all explicitly out of
//! scope (§1). This module only specifies the trait boundaries the core
//! consumes or assumes, the way `storage/mod.rs` documents a storage
//! contract without implementing a database.

use crate::error::Result;
use crate::session::types::{PendingMessage, PendingStatus, RatchetSession};

/// Implemented by the host application's wallet/signer layer.
/// `verify_signature` covers both EIP-191 (personal_sign, pure math) and
/// EIP-1271 (smart-contract signers, which requires an RPC `eth_call` and is
/// therefore necessarily a host responsibility, not core crypto).
pub trait Signer {
    fn sign_message(&self, plaintext: &[u8]) -> Result<[u8; 65]>;
    fn verify_signature(&self, address: &[u8; 20], message: &[u8], signature: &[u8; 65]) -> Result<bool>;
}

/// Implemented by the host's transaction-submission layer (EOA, session-key
/// module, or ERC-4337 bundler — indistinguishable from the core's view).
pub trait TxHandle {
    fn hash(&self) -> [u8; 32];
}

pub trait Executor {
    type Handle: TxHandle;

    fn send_message(
        &self,
        ciphertext: &[u8],
        topic: &[u8; 32],
        timestamp: u64,
        nonce: u128,
    ) -> Result<Self::Handle>;

    fn initiate_handshake(
        &self,
        recipient_hash: &[u8; 32],
        pub_keys: &[u8],
        ephemeral_pub_key: &[u8],
        plaintext_payload: &[u8],
    ) -> Result<Self::Handle>;

    fn respond_to_handshake(
        &self,
        in_response_to: &[u8; 32],
        responder_ephemeral_r: &[u8; 32],
        ciphertext: &[u8],
    ) -> Result<Self::Handle>;
}

/// Implemented by the host's persistence layer (IndexedDB/SQL/KV).
pub trait SessionStore {
    fn get(&self, conversation_id: &[u8; 32]) -> Result<Option<RatchetSession>>;
    /// Must check current/next/previous topic slots (§4.6 three-slot validity).
    fn get_by_inbound_topic(&self, topic: &[u8; 32]) -> Result<Option<RatchetSession>>;
    fn save(&self, session: &RatchetSession) -> Result<()>;
}

pub trait PendingStore {
    fn save(&self, pending: &PendingMessage) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<PendingMessage>>;
    fn get_by_tx_hash(&self, hash: &[u8; 32]) -> Result<Option<PendingMessage>>;
    fn update_status(&self, id: &str, status: PendingStatus, tx_hash: Option<[u8; 32]>) -> Result<()>;
    fn delete(&self, id: &str) -> Result<()>;
    fn get_by_conversation(&self, conversation_id: &[u8; 32]) -> Result<Vec<PendingMessage>>;
    /// Every pending record regardless of conversation, needed by
    /// `cleanup_stale_pending` (§4.8 / §5 Timeouts) to find and drop records
    /// older than `max_age`.
    fn list_all(&self) -> Result<Vec<PendingMessage>>;
}
