//! Error types for broker-session.

use std::io;
use thiserror::Error;

/// Result type alias for broker-session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in broker-session operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage I/O error.
    #[error("Storage error: {0}")]
    Storage(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The broker rejected the session credentials; the user must redo the OAuth flow.
    #[error("Reauthentication required: {reason}")]
    ReauthRequired {
        /// Config the failing request addressed, when known.
        config_id: Option<String>,
        /// Backend message or HTTP status description.
        reason: String,
    },

    /// No HTTP response was received (connection refused, timeout, DNS).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-auth HTTP failure.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response error text.
        message: String,
    },

    /// The backend answered 2xx with `success: false`.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// OAuth callback carried an error or no request token.
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// A payload that had to produce a session did not normalize.
    #[error("Invalid session payload: {0}")]
    InvalidSession(String),

    /// Missing required field in an outgoing request.
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Coarse classification used to route failures to different UI affordances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Credentials are invalid; prompt the user to reconnect. Never retried.
    ReauthRequired,
    /// Network blip or server-side failure; safe to retry.
    Transient,
    /// Anything else; retrying will not help.
    Fatal,
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ReauthRequired { .. } => ErrorClass::ReauthRequired,
            Self::Transport(_) => ErrorClass::Transient,
            Self::Http { status, .. } if *status >= 500 || *status == 408 || *status == 429 => {
                ErrorClass::Transient
            }
            _ => ErrorClass::Fatal,
        }
    }

    /// True when the error means the stored credentials are no longer valid.
    #[must_use]
    pub fn is_reauth(&self) -> bool {
        self.class() == ErrorClass::ReauthRequired
    }

    /// True when the error is worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}
