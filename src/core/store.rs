//! Single-slot persisted session store.
//!
//! The store is the only writer of session storage. Every write regenerates
//! the legacy mirror in full and bumps a generation counter, so responses to
//! requests issued before the latest write can be recognized and dropped.

use crate::core::normalize::Normalizer;
use crate::core::session::{BrokerSession, LegacyBrokerRecord};
use crate::error::Result;
use crate::storage::KeyValueStore;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Storage key of the canonical session record.
pub const SESSION_KEY: &str = "broker_session";

/// Storage key of the legacy one-element compatibility array.
pub const LEGACY_KEY: &str = "broker_configs";

/// Write generation of the session slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

/// Result of a guarded write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The payload was normalized and written.
    Written(BrokerSession),
    /// The payload did not normalize; storage is untouched.
    Invalid,
    /// The slot was written after the request was issued; storage is untouched.
    /// Carries the session currently stored.
    Stale(Option<BrokerSession>),
}

/// Owns the persisted broker session.
pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
    normalizer: Normalizer,
    generation: Mutex<u64>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("normalizer", &self.normalizer)
            .field("generation", &*self.generation.lock())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Create a store over `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self::with_normalizer(storage, Normalizer::default())
    }

    /// Create a store with a custom normalizer.
    #[must_use]
    pub fn with_normalizer(storage: Arc<dyn KeyValueStore>, normalizer: Normalizer) -> Self {
        Self {
            storage,
            normalizer,
            generation: Mutex::new(0),
        }
    }

    /// Current write generation. Stamp outgoing requests with this.
    #[must_use]
    pub fn generation(&self) -> Generation {
        Generation(*self.generation.lock())
    }

    /// Normalize `payload` and persist it.
    ///
    /// Returns `Ok(None)` without touching storage when the payload has no config id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub fn persist(&self, payload: &Value) -> Result<Option<BrokerSession>> {
        let mut generation = self.generation.lock();
        let Some(session) = self.normalizer.normalize(payload) else {
            warn!("ignoring session payload without a config id");
            return Ok(None);
        };
        self.write(&mut generation, &session)?;
        Ok(Some(session))
    }

    /// Persist `payload` only if nothing has been written since `stamp` was taken.
    ///
    /// A reauth flag already stored for the same config is kept: only
    /// [`persist`](Self::persist) can clear it.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub fn persist_if_current(&self, stamp: Generation, payload: &Value) -> Result<WriteOutcome> {
        let mut generation = self.generation.lock();
        if *generation != stamp.0 {
            warn!(
                stamp = stamp.0,
                current = *generation,
                "discarding stale session response"
            );
            return Ok(WriteOutcome::Stale(self.load()));
        }
        let Some(mut session) = self.normalizer.normalize(payload) else {
            warn!("ignoring session payload without a config id");
            return Ok(WriteOutcome::Invalid);
        };
        let flagged = self
            .load()
            .is_some_and(|stored| stored.needs_reauth && stored.config_id == session.config_id);
        if flagged && !session.needs_reauth {
            debug!(config_id = %session.config_id, "keeping reauth flag over status response");
            session.mark_needs_reauth();
        }
        self.write(&mut generation, &session)?;
        Ok(WriteOutcome::Written(session))
    }

    /// Load the persisted session.
    ///
    /// Never fails: unreadable or corrupt storage is logged and reported as no session.
    #[must_use]
    pub fn load(&self) -> Option<BrokerSession> {
        match self.storage.get(SESSION_KEY) {
            Ok(Some(raw)) => self.parse_canonical(&raw),
            Ok(None) => self.load_legacy(),
            Err(e) => {
                warn!(error = %e, "failed to read session storage");
                None
            }
        }
    }

    /// Remove both the canonical and legacy records. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub fn clear(&self) -> Result<()> {
        let mut generation = self.generation.lock();
        *generation += 1;
        self.storage.remove(SESSION_KEY)?;
        self.storage.remove(LEGACY_KEY)?;
        debug!("session cleared");
        Ok(())
    }

    /// Mark the persisted session as needing reauthentication.
    ///
    /// Re-reads storage first, so callers need no in-memory copy.
    /// Returns `Ok(None)` when there is no session to mark.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub fn mark_needs_reauth(&self) -> Result<Option<BrokerSession>> {
        let mut generation = self.generation.lock();
        self.mark_locked(&mut generation)
    }

    /// Mark the persisted session for `config_id` only if nothing has been
    /// written since `stamp`.
    ///
    /// Keeps a late 401 for an old session from flagging a newer one. A stored
    /// session for a different config is left alone and reported as `Invalid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub fn mark_needs_reauth_if_current(
        &self,
        stamp: Generation,
        config_id: &str,
    ) -> Result<WriteOutcome> {
        let mut generation = self.generation.lock();
        if *generation != stamp.0 {
            return Ok(WriteOutcome::Stale(self.load()));
        }
        if self.load().is_none_or(|stored| stored.config_id != config_id) {
            debug!(config_id, "rejected config is not the stored session");
            return Ok(WriteOutcome::Invalid);
        }
        Ok(self
            .mark_locked(&mut generation)?
            .map_or(WriteOutcome::Invalid, WriteOutcome::Written))
    }

    fn mark_locked(&self, generation: &mut u64) -> Result<Option<BrokerSession>> {
        let Some(mut session) = self.load() else {
            debug!("no session to mark for reauthentication");
            return Ok(None);
        };
        session.mark_needs_reauth();
        session.updated_at = Utc::now();
        self.write(generation, &session)?;
        info!(config_id = %session.config_id, "session marked as needing reauthentication");
        Ok(Some(session))
    }

    /// Raw legacy mirror, for consumers that still read it.
    #[must_use]
    pub fn load_legacy_records(&self) -> Vec<LegacyBrokerRecord> {
        match self.storage.get(LEGACY_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "corrupt legacy session record");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "failed to read legacy session record");
                Vec::new()
            }
        }
    }

    /// Write canonical and legacy records under the held generation lock.
    ///
    /// The generation moves as soon as storage may change, so a failed write
    /// still invalidates stamps taken before it. A legacy write failure drops
    /// the legacy record rather than leave it describing an older session.
    fn write(&self, generation: &mut u64, session: &BrokerSession) -> Result<()> {
        let canonical = serde_json::to_string(&session.to_stored())?;
        let legacy = serde_json::to_string(&[session.to_legacy()])?;
        *generation += 1;
        self.storage.set(SESSION_KEY, &canonical)?;
        if let Err(e) = self.storage.set(LEGACY_KEY, &legacy) {
            if let Err(cleanup) = self.storage.remove(LEGACY_KEY) {
                warn!(error = %cleanup, "failed to drop outdated legacy session record");
            }
            return Err(e);
        }
        debug!(config_id = %session.config_id, status = %session.session_status, "session persisted");
        Ok(())
    }

    fn parse_canonical(&self, raw: &str) -> Option<BrokerSession> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "corrupt session record, treating as logged out");
                return None;
            }
        };
        let session = self.normalizer.normalize_stored(&value);
        if session.is_none() {
            warn!("stored session has no config id, treating as logged out");
        }
        session
    }

    /// Older installs only wrote the array-of-one record.
    fn load_legacy(&self) -> Option<BrokerSession> {
        let raw = match self.storage.get(LEGACY_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "failed to read legacy session record");
                return None;
            }
        };
        let value: Value = serde_json::from_str(&raw).ok()?;
        let first = value.as_array()?.first()?;
        self.normalizer.normalize_stored(first)
    }
}
