//! Pending Manager (spec §4.8): two-phase-commit coordinator for outbound
//! messages, serialized per conversationId.
//!
//! Grounded on `encryption.rs`'s `PENDING_RATCHETS` advance-then-confirm
//! bookkeeping, with the opposite polarity the spec requires: the teacher
//! defers committing ratchet state until an ack arrives, this commits the
//! advanced session immediately on prepare (burning the slot) and never
//! rolls it back — see SPEC_FULL.md's "why slot-burning is safe" rationale,
//! carried over from spec.md §4.8 verbatim.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::crypto::ratchet;
use crate::error::{Result, VerbethError};
use crate::interfaces::{Executor, PendingStore, TxHandle};
use crate::session::manager::SessionManager;
use crate::session::types::{PendingMessage, PendingStatus};

pub struct PendingManager<'a> {
    store: &'a dyn PendingStore,
    sessions: &'a SessionManager<'a>,
    conversation_locks: Mutex<HashMap<[u8; 32], Arc<Mutex<()>>>>,
}

impl<'a> PendingManager<'a> {
    pub fn new(store: &'a dyn PendingStore, sessions: &'a SessionManager<'a>) -> Self {
        Self {
            store,
            sessions,
            conversation_locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, conversation_id: &[u8; 32]) -> Arc<Mutex<()>> {
        self.conversation_locks
            .lock()
            .unwrap()
            .entry(*conversation_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Step 1 (Prepare): ratchet-encrypt under the conversation's exclusive
    /// lock, persist the advanced session immediately, then write the
    /// PendingMessage row before any dispatch is attempted.
    pub fn prepare(&self, conversation_id: &[u8; 32], plaintext: &[u8]) -> Result<(PendingMessage, Vec<u8>)> {
        let lock = self.lock_for(conversation_id);
        let _guard = lock.lock().unwrap();

        let session = self
            .sessions
            .get_by_conversation(conversation_id)?
            .ok_or(VerbethError::NoSession)?;

        let session_state_before = serde_json::to_vec(&session).map_err(|e| VerbethError::Codec(e.to_string()))?;
        let (advanced_session, message) = ratchet::encrypt(&session, plaintext)?;
        let wire = message.serialize();
        let session_state_after =
            serde_json::to_vec(&advanced_session).map_err(|e| VerbethError::Codec(e.to_string()))?;

        // Commit the advanced session before the transaction is even built —
        // forward secrecy does not wait on submission success.
        self.sessions.save(&advanced_session)?;

        let pending = PendingMessage {
            id: Uuid::new_v4().to_string(),
            conversation_id: *conversation_id,
            topic: advanced_session.current_topic_outbound,
            payload: wire.clone(),
            plaintext: plaintext.to_vec(),
            session_state_before,
            session_state_after,
            created_at: Utc::now(),
            tx_hash: None,
            status: PendingStatus::Preparing,
        };
        self.store.save(&pending)?;

        log::debug!(
            "pending {}: prepared for conversation {}",
            pending.id,
            hex::encode(conversation_id)
        );
        Ok((pending, wire))
    }

    /// Step 2 (Submit): dispatch via the host executor.
    pub fn submit<E: Executor>(
        &self,
        pending_id: &str,
        executor: &E,
        timestamp: u64,
        nonce: u128,
    ) -> Result<()> {
        let pending = self.store.get(pending_id)?.ok_or(VerbethError::NoSession)?;

        match executor.send_message(&pending.payload, &pending.topic, timestamp, nonce) {
            Ok(handle) => {
                self.store
                    .update_status(pending_id, PendingStatus::Submitted, Some(handle.hash()))?;
                log::debug!("pending {}: submitted as tx {}", pending_id, hex::encode(handle.hash()));
                Ok(())
            }
            Err(e) => {
                self.store.update_status(pending_id, PendingStatus::Failed, None)?;
                log::warn!("pending {}: submission failed: {}", pending_id, e);
                Err(e)
            }
        }
    }

    /// Step 3 (Confirm): the on-chain event echoing this tx was observed.
    pub fn confirm(&self, tx_hash: &[u8; 32]) -> Result<Option<PendingMessage>> {
        let pending = self.store.get_by_tx_hash(tx_hash)?;
        if let Some(ref p) = pending {
            self.store.delete(&p.id)?;
            log::debug!("pending {}: confirmed, record cleared", p.id);
        }
        Ok(pending)
    }

    /// Step 4 (Revert): the tx never confirmed. Session state is retained —
    /// the receiver's skip-key machinery absorbs the gap.
    pub fn revert(&self, pending_id: &str) -> Result<()> {
        self.store.delete(pending_id)?;
        log::debug!("pending {}: reverted (session state retained)", pending_id);
        Ok(())
    }

    /// Drop pending records older than `max_age` regardless of status
    /// (§5 Timeouts).
    pub fn cleanup_stale_pending(&self, max_age: Duration) -> Result<usize> {
        let now = Utc::now();
        let mut dropped = 0;
        for pending in self.store.list_all()? {
            if now - pending.created_at > max_age {
                self.store.delete(&pending.id)?;
                dropped += 1;
            }
        }
        if dropped > 0 {
            log::debug!("cleanup_stale_pending: dropped {} stale record(s)", dropped);
        }
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VerbethError;
    use crate::interfaces::SessionStore;
    use crate::session::types::RatchetSession;
    use std::sync::Mutex as StdMutex;

    struct MemSessionStore(StdMutex<HashMap<[u8; 32], RatchetSession>>);
    impl SessionStore for MemSessionStore {
        fn get(&self, id: &[u8; 32]) -> Result<Option<RatchetSession>> {
            Ok(self.0.lock().unwrap().get(id).cloned())
        }
        fn get_by_inbound_topic(&self, _topic: &[u8; 32]) -> Result<Option<RatchetSession>> {
            Ok(None)
        }
        fn save(&self, session: &RatchetSession) -> Result<()> {
            self.0.lock().unwrap().insert(session.conversation_id, session.clone());
            Ok(())
        }
    }

    struct MemPendingStore(StdMutex<HashMap<String, PendingMessage>>);
    impl PendingStore for MemPendingStore {
        fn save(&self, pending: &PendingMessage) -> Result<()> {
            self.0.lock().unwrap().insert(pending.id.clone(), pending.clone());
            Ok(())
        }
        fn get(&self, id: &str) -> Result<Option<PendingMessage>> {
            Ok(self.0.lock().unwrap().get(id).cloned())
        }
        fn get_by_tx_hash(&self, hash: &[u8; 32]) -> Result<Option<PendingMessage>> {
            Ok(self
                .0
                .lock()
                .unwrap()
                .values()
                .find(|p| p.tx_hash.as_ref() == Some(hash))
                .cloned())
        }
        fn update_status(&self, id: &str, status: PendingStatus, tx_hash: Option<[u8; 32]>) -> Result<()> {
            if let Some(p) = self.0.lock().unwrap().get_mut(id) {
                p.status = status;
                if tx_hash.is_some() {
                    p.tx_hash = tx_hash;
                }
            }
            Ok(())
        }
        fn delete(&self, id: &str) -> Result<()> {
            self.0.lock().unwrap().remove(id);
            Ok(())
        }
        fn get_by_conversation(&self, conversation_id: &[u8; 32]) -> Result<Vec<PendingMessage>> {
            Ok(self
                .0
                .lock()
                .unwrap()
                .values()
                .filter(|p| &p.conversation_id == conversation_id)
                .cloned()
                .collect())
        }
        fn list_all(&self) -> Result<Vec<PendingMessage>> {
            Ok(self.0.lock().unwrap().values().cloned().collect())
        }
    }

    struct FakeHandle([u8; 32]);
    impl TxHandle for FakeHandle {
        fn hash(&self) -> [u8; 32] {
            self.0
        }
    }
    struct FakeExecutor {
        fail: bool,
    }
    impl Executor for FakeExecutor {
        type Handle = FakeHandle;
        fn send_message(&self, _ct: &[u8], _topic: &[u8; 32], _ts: u64, _nonce: u128) -> Result<FakeHandle> {
            if self.fail {
                Err(VerbethError::ExecutorFailure("boom".into()))
            } else {
                Ok(FakeHandle([42u8; 32]))
            }
        }
        fn initiate_handshake(&self, _rh: &[u8; 32], _pk: &[u8], _epk: &[u8], _pt: &[u8]) -> Result<FakeHandle> {
            unimplemented!()
        }
        fn respond_to_handshake(&self, _irt: &[u8; 32], _r: &[u8; 32], _ct: &[u8]) -> Result<FakeHandle> {
            unimplemented!()
        }
    }

    fn sample_session() -> RatchetSession {
        let now = Utc::now();
        RatchetSession {
            conversation_id: [1u8; 32],
            my_address: [1u8; 20],
            contact_address: [2u8; 20],
            topic_outbound: [3u8; 32],
            topic_inbound: [4u8; 32],
            my_signing_key: ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng).to_bytes(),
            contact_signing_key: [6u8; 32],
            root_key: [7u8; 32],
            dh_my_secret: [8u8; 32],
            dh_my_public: [9u8; 32],
            dh_their_public: Some([10u8; 32]),
            sending_chain_key: Some([11u8; 32]),
            sending_msg_number: 0,
            receiving_chain_key: Some([12u8; 32]),
            receiving_msg_number: 0,
            previous_chain_length: 0,
            skipped_keys: Vec::new(),
            current_topic_outbound: [13u8; 32],
            current_topic_inbound: [14u8; 32],
            next_topic_outbound: None,
            next_topic_inbound: None,
            previous_topic_inbound: None,
            previous_topic_expiry: None,
            topic_epoch: 0,
            created_at: now,
            updated_at: now,
            epoch: 0,
        }
    }

    #[test]
    fn prepare_burns_a_slot_and_persists_pending_row() {
        let session_store = MemSessionStore(StdMutex::new(HashMap::new()));
        session_store.save(&sample_session()).unwrap();
        let sessions = SessionManager::new(&session_store);
        let pending_store = MemPendingStore(StdMutex::new(HashMap::new()));
        let manager = PendingManager::new(&pending_store, &sessions);

        let (pending, _wire) = manager.prepare(&[1u8; 32], b"hi").unwrap();
        assert_eq!(pending.status, PendingStatus::Preparing);

        let advanced = sessions.get_by_conversation(&[1u8; 32]).unwrap().unwrap();
        assert_eq!(advanced.sending_msg_number, 1);
    }

    #[test]
    fn submit_success_marks_submitted_with_tx_hash() {
        let session_store = MemSessionStore(StdMutex::new(HashMap::new()));
        session_store.save(&sample_session()).unwrap();
        let sessions = SessionManager::new(&session_store);
        let pending_store = MemPendingStore(StdMutex::new(HashMap::new()));
        let manager = PendingManager::new(&pending_store, &sessions);

        let (pending, _wire) = manager.prepare(&[1u8; 32], b"hi").unwrap();
        manager
            .submit(&pending.id, &FakeExecutor { fail: false }, 0, 0)
            .unwrap();

        let updated = pending_store.get(&pending.id).unwrap().unwrap();
        assert_eq!(updated.status, PendingStatus::Submitted);
        assert_eq!(updated.tx_hash, Some([42u8; 32]));
    }

    #[test]
    fn submit_failure_marks_failed_and_retains_session_state() {
        let session_store = MemSessionStore(StdMutex::new(HashMap::new()));
        session_store.save(&sample_session()).unwrap();
        let sessions = SessionManager::new(&session_store);
        let pending_store = MemPendingStore(StdMutex::new(HashMap::new()));
        let manager = PendingManager::new(&pending_store, &sessions);

        let (pending, _wire) = manager.prepare(&[1u8; 32], b"hi").unwrap();
        assert!(manager.submit(&pending.id, &FakeExecutor { fail: true }, 0, 0).is_err());

        let updated = pending_store.get(&pending.id).unwrap().unwrap();
        assert_eq!(updated.status, PendingStatus::Failed);
        let advanced = sessions.get_by_conversation(&[1u8; 32]).unwrap().unwrap();
        assert_eq!(advanced.sending_msg_number, 1, "slot stays burned on submit failure");
    }

    #[test]
    fn confirm_deletes_record_by_tx_hash() {
        let session_store = MemSessionStore(StdMutex::new(HashMap::new()));
        session_store.save(&sample_session()).unwrap();
        let sessions = SessionManager::new(&session_store);
        let pending_store = MemPendingStore(StdMutex::new(HashMap::new()));
        let manager = PendingManager::new(&pending_store, &sessions);

        let (pending, _wire) = manager.prepare(&[1u8; 32], b"hi").unwrap();
        manager
            .submit(&pending.id, &FakeExecutor { fail: false }, 0, 0)
            .unwrap();

        let confirmed = manager.confirm(&[42u8; 32]).unwrap();
        assert!(confirmed.is_some());
        assert!(pending_store.get(&pending.id).unwrap().is_none());
    }

    #[test]
    fn cleanup_stale_pending_drops_old_records_only() {
        let session_store = MemSessionStore(StdMutex::new(HashMap::new()));
        session_store.save(&sample_session()).unwrap();
        let sessions = SessionManager::new(&session_store);
        let pending_store = MemPendingStore(StdMutex::new(HashMap::new()));
        let manager = PendingManager::new(&pending_store, &sessions);

        let (pending, _wire) = manager.prepare(&[1u8; 32], b"hi").unwrap();
        let mut stale = pending_store.get(&pending.id).unwrap().unwrap();
        stale.created_at = Utc::now() - Duration::hours(48);
        pending_store.save(&stale).unwrap();

        let dropped = manager.cleanup_stale_pending(Duration::hours(24)).unwrap();
        assert_eq!(dropped, 1);
        assert!(pending_store.get(&pending.id).unwrap().is_none());
    }
}
