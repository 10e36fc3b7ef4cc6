pub mod constant_time;
pub mod identity;
pub mod kem;
pub mod ratchet;
pub mod schedule;
pub mod topic;
pub mod verify;

pub use constant_time::eq_32;
pub use identity::{derive_from_seed_signature, derive_identity_keypair, IdentityKeyPair};
pub use kem::{generate_kem_keypair, kem_decapsulate, kem_encapsulate, KemKeypair};
pub use ratchet::{decrypt, encrypt, initiator_init, responder_init};
pub use schedule::{chain_step, derive_topic, root_chain_step, TopicDirection};
pub use topic::{initial_topics, match_inbound_topic, rotate_topics, TopicMatchKind};
pub use verify::{verify_eip191, verify_identity_proof, verify_message_signature};
