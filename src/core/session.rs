//! Broker session types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Broker identifier used when a payload names none.
pub const DEFAULT_BROKER_NAME: &str = "zerodha";

/// Canonical in-memory session record.
///
/// Serializes in camelCase for consumers; the on-disk shape is [`StoredSession`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerSession {
    /// Broker credential configuration this session belongs to.
    pub config_id: String,

    /// Authenticated brokerage user, absent during early OAuth stages.
    pub user_id: Option<String>,

    /// Broker name.
    pub broker_name: String,

    /// Session status.
    pub session_status: SessionStatus,

    /// Sticky reauthentication flag.
    pub needs_reauth: bool,

    /// Backend status detail, passed through untouched.
    pub connection_status: Option<Value>,

    /// Token bookkeeping, passed through untouched.
    pub token_status: Option<Value>,

    /// Token bookkeeping, passed through untouched.
    pub last_token_refresh: Option<Value>,

    /// Token bookkeeping, passed through untouched.
    pub last_status_check: Option<Value>,

    /// When this record was last normalized.
    pub updated_at: DateTime<Utc>,
}

impl BrokerSession {
    /// Flag the session as needing reauthentication.
    ///
    /// Sets both the flag and the status so they never disagree.
    pub fn mark_needs_reauth(&mut self) {
        self.needs_reauth = true;
        self.session_status = SessionStatus::NeedsReauth;
    }

    /// Whether the session can address authenticated broker calls.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.user_id.is_some()
            && !self.needs_reauth
            && self.session_status == SessionStatus::Connected
    }

    /// On-disk representation.
    #[must_use]
    pub fn to_stored(&self) -> StoredSession {
        StoredSession {
            config_id: self.config_id.clone(),
            user_id: self.user_id.clone(),
            broker_name: self.broker_name.clone(),
            session_status: self.session_status,
            needs_reauth: self.needs_reauth,
            connection_status: self.connection_status.clone(),
            token_status: self.token_status.clone(),
            last_token_refresh: self.last_token_refresh.clone(),
            last_status_check: self.last_status_check.clone(),
            updated_at: self.updated_at,
        }
    }

    /// Compatibility record for consumers that still read the older schema.
    #[must_use]
    pub fn to_legacy(&self) -> LegacyBrokerRecord {
        LegacyBrokerRecord {
            id: self.config_id.clone(),
            broker_name: self.broker_name.clone(),
            broker_user_id: self.user_id.clone(),
            is_connected: self.session_status == SessionStatus::Connected && !self.needs_reauth,
            status: self.session_status,
            needs_reauth: self.needs_reauth,
            last_updated: self.updated_at,
        }
    }
}

/// Session status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Credentials are valid.
    #[default]
    Connected,
    /// OAuth flow in progress.
    Pending,
    /// Credentials were rejected; the user must reconnect.
    NeedsReauth,
    /// The user disconnected the broker.
    Disconnected,
    /// The backend reported an error state.
    Error,
}

impl SessionStatus {
    /// Wire name of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Pending => "pending",
            Self::NeedsReauth => "needs_reauth",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "connected" | "active" => Ok(Self::Connected),
            "pending" => Ok(Self::Pending),
            "needs_reauth" | "needsreauth" | "reauth_required" => Ok(Self::NeedsReauth),
            "disconnected" | "inactive" => Ok(Self::Disconnected),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// Canonical session as written to storage (snake_case, network-compatible).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub config_id: String,
    pub user_id: Option<String>,
    pub broker_name: String,
    pub session_status: SessionStatus,
    pub needs_reauth: bool,
    pub connection_status: Option<Value>,
    pub token_status: Option<Value>,
    pub last_token_refresh: Option<Value>,
    pub last_status_check: Option<Value>,
    pub updated_at: DateTime<Utc>,
}

/// One entry of the legacy compatibility array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyBrokerRecord {
    /// Config id under its older name.
    pub id: String,

    /// Broker name.
    pub broker_name: String,

    /// User id under its older name.
    pub broker_user_id: Option<String>,

    /// Connected and not awaiting reauthentication.
    pub is_connected: bool,

    /// Session status.
    pub status: SessionStatus,

    /// Reauthentication flag.
    pub needs_reauth: bool,

    /// Last update time.
    pub last_updated: DateTime<Utc>,
}
