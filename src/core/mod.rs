//! Core session types, normalization and the persisted session store.

pub mod normalize;
pub mod session;
pub mod store;

pub use normalize::{Normalizer, normalize};
pub use session::{
    BrokerSession, DEFAULT_BROKER_NAME, LegacyBrokerRecord, SessionStatus, StoredSession,
};
pub use store::{Generation, LEGACY_KEY, SESSION_KEY, SessionStore, WriteOutcome};
