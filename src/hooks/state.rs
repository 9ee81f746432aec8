//! State exposed to hook subscribers.

use crate::core::BrokerSession;
use crate::error::{Error, ErrorClass};

/// Snapshot of what a UI consumer renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookState {
    /// Current session, a cache of the store's copy.
    pub session: Option<BrokerSession>,

    /// A refresh is in flight.
    pub loading: bool,

    /// Last non-reauth failure. Cleared by the next successful refresh.
    pub error: Option<HookError>,

    /// The user must redo the OAuth flow.
    pub needs_reauth: bool,
}

impl HookState {
    /// State for a freshly loaded session.
    #[must_use]
    pub fn with_session(session: Option<BrokerSession>) -> Self {
        let needs_reauth = session.as_ref().is_some_and(|s| s.needs_reauth);
        Self {
            session,
            loading: false,
            error: None,
            needs_reauth,
        }
    }

    pub(crate) fn set_session(&mut self, session: Option<BrokerSession>) {
        self.needs_reauth = session.as_ref().is_some_and(|s| s.needs_reauth);
        self.session = session;
        self.error = None;
    }
}

/// Failure surfaced to the UI for an optional retry affordance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookError {
    pub class: ErrorClass,
    pub message: String,
}

impl HookError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.class == ErrorClass::Transient
    }
}

impl From<&Error> for HookError {
    fn from(e: &Error) -> Self {
        Self {
            class: e.class(),
            message: e.to_string(),
        }
    }
}
