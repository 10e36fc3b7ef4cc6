//! Session layer (spec §3, §4.7-§4.9): the stateful coordination sitting on
//! top of the stateless crypto core — session cache/router, two-phase-commit
//! send pipeline, and handshake-response matching.

pub mod hsr_index;
pub mod manager;
pub mod pending;
pub mod types;

pub use hsr_index::{HsrTagIndex, PendingHandshake};
pub use manager::{SessionManager, SessionMatchKind};
pub use pending::PendingManager;
pub use types::{compute_conversation_id, PendingMessage, PendingStatus, RatchetSession, SkippedKey};
