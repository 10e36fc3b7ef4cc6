//! Topic Ratcheting (spec §4.6): DH-synchronized topic rotation with a
//! three-slot validity window (current/next/previous) on receive.

use chrono::{DateTime, Duration, Utc};

use crate::crypto::schedule::{derive_topic, TopicDirection};
use crate::error::Result;

/// Grace window during which a message on the just-retired inbound topic is
/// still accepted (peer's message was in flight across the epoch boundary).
pub const PREVIOUS_TOPIC_GRACE: Duration = Duration::minutes(5);

pub struct TopicRotation {
    pub new_topic_outbound: [u8; 32],
    pub new_topic_inbound: [u8; 32],
    pub next_topic_outbound: [u8; 32],
    pub next_topic_inbound: [u8; 32],
}

/// Derive the four topic slots produced by a DH step (§4.6). `dh_receive` is
/// the shared secret for the epoch just entering inbound; `dh_send` is the
/// shared secret for the next outbound epoch. Labels are swapped relative to
/// the raw direction because we're deriving the *peer's* view of the topic
/// we will send/receive on.
pub fn rotate_topics(
    dh_receive: &[u8; 32],
    dh_send: &[u8; 32],
    conversation_id: &[u8; 32],
) -> Result<TopicRotation> {
    let new_topic_outbound = derive_topic(dh_receive, TopicDirection::Inbound, conversation_id)?;
    let new_topic_inbound = derive_topic(dh_receive, TopicDirection::Outbound, conversation_id)?;
    let next_topic_outbound = derive_topic(dh_send, TopicDirection::Outbound, conversation_id)?;
    let next_topic_inbound = derive_topic(dh_send, TopicDirection::Inbound, conversation_id)?;
    Ok(TopicRotation {
        new_topic_outbound,
        new_topic_inbound,
        next_topic_outbound,
        next_topic_inbound,
    })
}

/// Initial topic pair derived once at session bootstrap (initiator/responder
/// init, §4.5), before any DH step has occurred.
pub fn initial_topics(
    dh_shared: &[u8; 32],
    conversation_id: &[u8; 32],
    swapped: bool,
) -> Result<([u8; 32], [u8; 32])> {
    let (out_dir, in_dir) = if swapped {
        (TopicDirection::Inbound, TopicDirection::Outbound)
    } else {
        (TopicDirection::Outbound, TopicDirection::Inbound)
    };
    let outbound = derive_topic(dh_shared, out_dir, conversation_id)?;
    let inbound = derive_topic(dh_shared, in_dir, conversation_id)?;
    Ok((outbound, inbound))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicMatchKind {
    Current,
    Next,
    Previous,
}

/// Three-slot validity check (§4.6). Returns the match kind if `topic`
/// matches one of the session's current/next/previous inbound slots and
/// (for `previous`) the grace window hasn't expired.
pub fn match_inbound_topic(
    topic: &[u8; 32],
    current_inbound: &[u8; 32],
    next_inbound: Option<&[u8; 32]>,
    previous_inbound: Option<&[u8; 32]>,
    previous_expiry: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<TopicMatchKind> {
    if topic == current_inbound {
        return Some(TopicMatchKind::Current);
    }
    if let Some(next) = next_inbound {
        if topic == next {
            return Some(TopicMatchKind::Next);
        }
    }
    if let (Some(prev), Some(expiry)) = (previous_inbound, previous_expiry) {
        if topic == prev && now < expiry {
            return Some(TopicMatchKind::Previous);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_produces_distinct_slots() {
        let dh_recv = [1u8; 32];
        let dh_send = [2u8; 32];
        let cid = [3u8; 32];
        let r = rotate_topics(&dh_recv, &dh_send, &cid).unwrap();
        assert_ne!(r.new_topic_outbound, r.new_topic_inbound);
        assert_ne!(r.next_topic_outbound, r.next_topic_inbound);
        assert_ne!(r.new_topic_outbound, r.next_topic_outbound);
    }

    #[test]
    fn initiator_responder_topics_mirror() {
        let dh = [7u8; 32];
        let cid = [9u8; 32];
        let (a_out, a_in) = initial_topics(&dh, &cid, false).unwrap();
        let (b_out, b_in) = initial_topics(&dh, &cid, true).unwrap();
        assert_eq!(a_out, b_in);
        assert_eq!(a_in, b_out);
    }

    #[test]
    fn three_slot_matching() {
        let now = Utc::now();
        let current = [1u8; 32];
        let next = [2u8; 32];
        let previous = [3u8; 32];
        let expiry = now + Duration::minutes(1);

        assert_eq!(
            match_inbound_topic(&current, &current, Some(&next), Some(&previous), Some(expiry), now),
            Some(TopicMatchKind::Current)
        );
        assert_eq!(
            match_inbound_topic(&next, &current, Some(&next), Some(&previous), Some(expiry), now),
            Some(TopicMatchKind::Next)
        );
        assert_eq!(
            match_inbound_topic(&previous, &current, Some(&next), Some(&previous), Some(expiry), now),
            Some(TopicMatchKind::Previous)
        );
        let expired = now - Duration::minutes(1);
        assert_eq!(
            match_inbound_topic(&previous, &current, Some(&next), Some(&previous), Some(expired), now),
            None
        );
    }
}
