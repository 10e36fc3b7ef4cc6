//! Session Manager (spec §4.7): a session cache and topic router sitting
//! between the ratchet engine and the storage adapter.
//!
//! Grounded on `crypto/replay_cache.rs`'s `lru::LruCache` + mutex pattern for
//! a process-wide, partition-friendly cache in front of a slower backing
//! store, generalized here from replay-window bookkeeping to full
//! `RatchetSession` caching with three-slot topic routing (§4.6) and
//! next-slot promotion.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use crate::crypto::topic::{match_inbound_topic, TopicMatchKind};
use crate::error::Result;
use crate::interfaces::SessionStore;
use crate::session::types::RatchetSession;

/// How an inbound message's topic matched a session's slots (§4.6).
pub use crate::crypto::topic::TopicMatchKind as SessionMatchKind;

pub struct SessionManager<'a> {
    store: &'a dyn SessionStore,
    cache: Mutex<HashMap<[u8; 32], RatchetSession>>,
}

impl<'a> SessionManager<'a> {
    pub fn new(store: &'a dyn SessionStore) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Cache-first lookup by conversationId.
    pub fn get_by_conversation(&self, conversation_id: &[u8; 32]) -> Result<Option<RatchetSession>> {
        {
            let cache = self.cache.lock().unwrap();
            if let Some(session) = cache.get(conversation_id) {
                return Ok(Some(session.clone()));
            }
        }
        let loaded = self.store.get(conversation_id)?;
        if let Some(ref session) = loaded {
            self.cache.lock().unwrap().insert(*conversation_id, session.clone());
        }
        Ok(loaded)
    }

    /// Route an inbound topic to its session, promoting next→current when the
    /// match was on the "next" slot (§4.6 three-slot validity).
    pub fn get_by_inbound_topic(&self, topic: &[u8; 32]) -> Result<Option<(RatchetSession, TopicMatchKind)>> {
        let candidate = {
            let cache = self.cache.lock().unwrap();
            cache
                .values()
                .find(|s| self.topic_matches(s, topic).is_some())
                .cloned()
        };

        let mut session = match candidate {
            Some(s) => s,
            None => match self.store.get_by_inbound_topic(topic)? {
                Some(s) => s,
                None => return Ok(None),
            },
        };

        let kind = match self.topic_matches(&session, topic) {
            Some(k) => k,
            None => return Ok(None),
        };

        if kind == TopicMatchKind::Next {
            self.promote_next(&mut session);
        }

        self.cache.lock().unwrap().insert(session.conversation_id, session.clone());
        Ok(Some((session, kind)))
    }

    fn topic_matches(&self, session: &RatchetSession, topic: &[u8; 32]) -> Option<TopicMatchKind> {
        match_inbound_topic(
            topic,
            &session.current_topic_inbound,
            session.next_topic_inbound.as_ref(),
            session.previous_topic_inbound.as_ref(),
            session.previous_topic_expiry,
            Utc::now(),
        )
    }

    fn promote_next(&self, session: &mut RatchetSession) {
        log::debug!(
            "session {}: promoting next topic slot to current (epoch {} -> {})",
            hex::encode(session.conversation_id),
            session.topic_epoch,
            session.topic_epoch + 1
        );
        session.previous_topic_inbound = Some(session.current_topic_inbound);
        session.previous_topic_expiry = Some(Utc::now() + crate::crypto::topic::PREVIOUS_TOPIC_GRACE);
        if let Some(next_out) = session.next_topic_outbound.take() {
            session.current_topic_outbound = next_out;
        }
        if let Some(next_in) = session.next_topic_inbound.take() {
            session.current_topic_inbound = next_in;
        }
        session.topic_epoch += 1;
    }

    /// Write-through save: persists to the store and refreshes the cache.
    pub fn save(&self, session: &RatchetSession) -> Result<()> {
        self.store.save(session)?;
        self.cache
            .lock()
            .unwrap()
            .insert(session.conversation_id, session.clone());
        Ok(())
    }

    /// Drop a cache entry, e.g. after a session reset.
    pub fn invalidate(&self, conversation_id: &[u8; 32]) {
        self.cache.lock().unwrap().remove(conversation_id);
    }

    /// Apply a sequence of state transitions to one session without
    /// persisting between them, then save once (§4.7 batch mode: a DH step
    /// mid-batch changes the key route for subsequent messages in the same
    /// scan window, so the single cached reference must thread through all
    /// of them before the final write).
    pub fn apply_batch<F>(&self, conversation_id: &[u8; 32], mut transitions: Vec<F>) -> Result<Option<RatchetSession>>
    where
        F: FnMut(RatchetSession) -> Result<RatchetSession>,
    {
        let mut session = match self.get_by_conversation(conversation_id)? {
            Some(s) => s,
            None => return Ok(None),
        };
        for transition in transitions.iter_mut() {
            session = transition(session)?;
        }
        self.save(&session)?;
        Ok(Some(session))
    }
}
