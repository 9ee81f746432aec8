//! Session payload normalization.
//!
//! Incoming payloads come from OAuth callbacks, status checks and token
//! refreshes, and disagree on casing and nesting. Each canonical field is
//! resolved by walking an ordered rule list and taking the first present
//! value. Adding a backend shape means adding a rule, not a branch.

use crate::core::session::{BrokerSession, DEFAULT_BROKER_NAME, SessionStatus};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

/// A key path into a JSON object, outermost key first.
type Rule = &'static [&'static str];

const CONFIG_ID: &[Rule] = &[
    &["config_id"],
    &["configId"],
    &["configuration_id"],
    &["configurationId"],
    &["id"],
    &["data", "config_id"],
    &["data", "configId"],
    &["data", "configuration_id"],
    &["data", "id"],
];

const USER_ID: &[Rule] = &[
    &["user_id"],
    &["userId"],
    &["broker_user_id"],
    &["user_data", "user_id"],
    &["user_data", "userId"],
    &["userData", "userId"],
    &["data", "user_id"],
    &["data", "userId"],
    &["data", "user_data", "user_id"],
];

const BROKER_NAME: &[Rule] = &[
    &["broker_name"],
    &["brokerName"],
    &["broker"],
    &["data", "broker_name"],
    &["data", "brokerName"],
];

const SESSION_STATUS: &[Rule] = &[
    &["session_status"],
    &["sessionStatus"],
    &["data", "session_status"],
    &["data", "sessionStatus"],
    &["status"],
];

const NEEDS_REAUTH: &[Rule] = &[
    &["needs_reauth"],
    &["needsReauth"],
    &["data", "needs_reauth"],
    &["data", "needsReauth"],
];

const CONNECTION_STATUS: &[Rule] = &[
    &["connection_status"],
    &["connectionStatus"],
    &["data", "connection_status"],
    &["data", "connectionStatus"],
];

const TOKEN_STATUS: &[Rule] = &[
    &["token_status"],
    &["tokenStatus"],
    &["data", "token_status"],
    &["data", "tokenStatus"],
];

const LAST_TOKEN_REFRESH: &[Rule] = &[
    &["last_token_refresh"],
    &["lastTokenRefresh"],
    &["data", "last_token_refresh"],
    &["data", "lastTokenRefresh"],
];

const LAST_STATUS_CHECK: &[Rule] = &[
    &["last_status_check"],
    &["lastStatusCheck"],
    &["data", "last_status_check"],
    &["data", "lastStatusCheck"],
];

const UPDATED_AT: &[Rule] = &[&["updated_at"], &["updatedAt"], &["last_updated"]];

/// Follow a rule through nested objects.
fn lookup<'a>(payload: &'a Value, rule: Rule) -> Option<&'a Value> {
    rule.iter()
        .try_fold(payload, |value, key| value.as_object()?.get(*key))
        .filter(|v| !v.is_null())
}

/// First value matched by any rule, in rule order.
fn first_present<'a>(payload: &'a Value, rules: &[Rule]) -> Option<&'a Value> {
    rules.iter().find_map(|rule| lookup(payload, rule))
}

/// First identifier-like value: non-empty strings, or numbers rendered as strings.
fn first_identifier(payload: &Value, rules: &[Rule]) -> Option<String> {
    rules.iter().find_map(|rule| match lookup(payload, rule)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First value that parses as a boolean.
fn first_bool(payload: &Value, rules: &[Rule]) -> Option<bool> {
    rules.iter().find_map(|rule| match lookup(payload, rule)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.parse().ok(),
        _ => None,
    })
}

/// First value that parses as a known session status.
fn first_status(payload: &Value, rules: &[Rule]) -> Option<SessionStatus> {
    rules
        .iter()
        .find_map(|rule| lookup(payload, rule)?.as_str()?.parse().ok())
}

fn first_timestamp(payload: &Value, rules: &[Rule]) -> Option<DateTime<Utc>> {
    rules.iter().find_map(|rule| {
        let raw = lookup(payload, rule)?.as_str()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// Converts heterogeneous payloads into [`BrokerSession`] records.
///
/// Pure: no storage access. The only side effect is a diagnostic log line.
#[derive(Debug, Clone)]
pub struct Normalizer {
    default_broker: String,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            default_broker: DEFAULT_BROKER_NAME.to_string(),
        }
    }
}

impl Normalizer {
    /// Normalizer that fills absent broker names with `name`.
    #[must_use]
    pub fn with_default_broker(name: impl Into<String>) -> Self {
        Self {
            default_broker: name.into(),
        }
    }

    /// Normalize an incoming payload, stamping it with the current time.
    ///
    /// Returns `None` when no config id can be resolved.
    #[must_use]
    pub fn normalize(&self, payload: &Value) -> Option<BrokerSession> {
        self.normalize_at(payload, Utc::now())
    }

    /// Normalize a previously stored record, keeping its own timestamp when it has one.
    #[must_use]
    pub fn normalize_stored(&self, payload: &Value) -> Option<BrokerSession> {
        let updated_at = first_timestamp(payload, UPDATED_AT).unwrap_or_else(Utc::now);
        self.normalize_at(payload, updated_at)
    }

    /// Normalize with an explicit `updated_at`.
    #[must_use]
    pub fn normalize_at(&self, payload: &Value, updated_at: DateTime<Utc>) -> Option<BrokerSession> {
        if !payload.is_object() {
            return None;
        }

        let config_id = first_identifier(payload, CONFIG_ID)?;

        let user_id = first_identifier(payload, USER_ID);
        if user_id.is_none() {
            warn!(config_id = %config_id, "session payload carries no user id");
        }

        let broker_name = first_present(payload, BROKER_NAME)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map_or_else(|| self.default_broker.clone(), |s| s.trim().to_string());

        let explicit_status = first_status(payload, SESSION_STATUS);
        let needs_reauth = first_bool(payload, NEEDS_REAUTH).unwrap_or(false)
            || explicit_status == Some(SessionStatus::NeedsReauth);
        let session_status = if needs_reauth {
            SessionStatus::NeedsReauth
        } else {
            explicit_status.unwrap_or(SessionStatus::Connected)
        };

        Some(BrokerSession {
            config_id,
            user_id,
            broker_name,
            session_status,
            needs_reauth,
            connection_status: first_present(payload, CONNECTION_STATUS).cloned(),
            token_status: first_present(payload, TOKEN_STATUS).cloned(),
            last_token_refresh: first_present(payload, LAST_TOKEN_REFRESH).cloned(),
            last_status_check: first_present(payload, LAST_STATUS_CHECK).cloned(),
            updated_at,
        })
    }
}

/// Normalize with the default broker name.
#[must_use]
pub fn normalize(payload: &Value) -> Option<BrokerSession> {
    Normalizer::default().normalize(payload)
}

/// Resolve only the config id, using the same rules as [`normalize`].
#[must_use]
pub fn extract_config_id(payload: &Value) -> Option<String> {
    first_identifier(payload, CONFIG_ID)
}

/// Resolve only the user id, using the same rules as [`normalize`].
#[must_use]
pub fn extract_user_id(payload: &Value) -> Option<String> {
    first_identifier(payload, USER_ID)
}

/// Whether the payload explicitly asks for reauthentication.
#[must_use]
pub fn requests_reauth(payload: &Value) -> bool {
    first_bool(payload, NEEDS_REAUTH).unwrap_or(false)
        || first_status(payload, SESSION_STATUS) == Some(SessionStatus::NeedsReauth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn snake_case_payload() {
        let session = normalize(&json!({
            "config_id": "cfg-1",
            "user_id": "EBW183",
            "broker_name": "zerodha",
            "session_status": "connected",
            "needs_reauth": false
        }))
        .unwrap();

        assert_eq!(session.config_id, "cfg-1");
        assert_eq!(session.user_id.as_deref(), Some("EBW183"));
        assert_eq!(session.broker_name, "zerodha");
        assert_eq!(session.session_status, SessionStatus::Connected);
        assert!(!session.needs_reauth);
    }

    #[test]
    fn camel_case_payload() {
        let session = normalize(&json!({"configId": "c1", "userId": "u1"})).unwrap();
        assert_eq!(session.config_id, "c1");
        assert_eq!(session.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn nested_user_data() {
        let session = normalize(&json!({"config_id": "c1", "user_data": {"user_id": "u1"}})).unwrap();
        assert_eq!(session.config_id, "c1");
        assert_eq!(session.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn status_envelope_with_nested_data() {
        let session = normalize(&json!({
            "success": true,
            "data": {
                "config_id": "c1",
                "user_id": "u1",
                "connection_status": {"state": "connected", "message": "ok", "last_checked": "2026-10-16T10:00:00Z"}
            }
        }))
        .unwrap();
        assert_eq!(session.config_id, "c1");
        assert_eq!(session.user_id.as_deref(), Some("u1"));
        assert_eq!(session.connection_status.unwrap()["state"], "connected");
    }

    #[test]
    fn flat_user_id_wins_over_nested() {
        let session = normalize(&json!({
            "config_id": "c1",
            "user_id": "flat",
            "user_data": {"user_id": "nested"},
            "data": {"user_id": "data"}
        }))
        .unwrap();
        assert_eq!(session.user_id.as_deref(), Some("flat"));
    }

    #[test]
    fn user_data_wins_over_data() {
        let session = normalize(&json!({
            "config_id": "c1",
            "user_data": {"user_id": "nested"},
            "data": {"user_id": "data"}
        }))
        .unwrap();
        assert_eq!(session.user_id.as_deref(), Some("nested"));
    }

    #[test]
    fn config_id_variants() {
        for payload in [
            json!({"config_id": "c1"}),
            json!({"configId": "c1"}),
            json!({"configuration_id": "c1"}),
            json!({"id": "c1"}),
            json!({"data": {"config_id": "c1"}}),
            json!({"data": {"id": "c1"}}),
        ] {
            let session = normalize(&payload).unwrap();
            assert_eq!(session.config_id, "c1", "payload {payload}");
        }
    }

    #[test]
    fn numeric_config_id_is_stringified() {
        let session = normalize(&json!({"config_id": 42})).unwrap();
        assert_eq!(session.config_id, "42");
    }

    #[test]
    fn missing_config_id_is_rejected() {
        assert!(normalize(&json!({"user_id": "u1"})).is_none());
        assert!(normalize(&json!({"config_id": ""})).is_none());
        assert!(normalize(&json!({"config_id": null, "user_id": "u1"})).is_none());
        assert!(normalize(&json!("cfg-1")).is_none());
        assert!(normalize(&Value::Null).is_none());
    }

    #[test]
    fn missing_user_id_is_tolerated() {
        let session = normalize(&json!({"config_id": "c1"})).unwrap();
        assert!(session.user_id.is_none());
    }

    #[test]
    fn defaults() {
        let session = normalize(&json!({"config_id": "c1", "user_id": "u1"})).unwrap();
        assert_eq!(session.broker_name, DEFAULT_BROKER_NAME);
        assert!(!session.needs_reauth);
        assert_eq!(session.session_status, SessionStatus::Connected);
        assert!(session.connection_status.is_none());
    }

    #[test]
    fn custom_default_broker() {
        let normalizer = Normalizer::with_default_broker("upstox");
        let session = normalizer.normalize(&json!({"config_id": "c1"})).unwrap();
        assert_eq!(session.broker_name, "upstox");
    }

    #[test]
    fn needs_reauth_forces_status() {
        let session = normalize(&json!({
            "config_id": "c1",
            "needs_reauth": true,
            "session_status": "connected"
        }))
        .unwrap();
        assert!(session.needs_reauth);
        assert_eq!(session.session_status, SessionStatus::NeedsReauth);
    }

    #[test]
    fn needs_reauth_status_forces_flag() {
        let session = normalize(&json!({"config_id": "c1", "sessionStatus": "needs_reauth"})).unwrap();
        assert!(session.needs_reauth);
        assert_eq!(session.session_status, SessionStatus::NeedsReauth);
    }

    #[test]
    fn explicit_status_is_kept() {
        let session = normalize(&json!({"config_id": "c1", "session_status": "pending"})).unwrap();
        assert_eq!(session.session_status, SessionStatus::Pending);
    }

    #[test]
    fn callback_status_is_not_a_session_status() {
        let session = normalize(&json!({"config_id": "c1", "status": "success"})).unwrap();
        assert_eq!(session.session_status, SessionStatus::Connected);
    }

    #[test]
    fn bookkeeping_fields_pass_through() {
        let session = normalize(&json!({
            "config_id": "c1",
            "token_status": "valid",
            "last_token_refresh": "2026-10-16T09:00:00Z",
            "lastStatusCheck": 1_760_000_000
        }))
        .unwrap();
        assert_eq!(session.token_status, Some(json!("valid")));
        assert_eq!(session.last_token_refresh, Some(json!("2026-10-16T09:00:00Z")));
        assert_eq!(session.last_status_check, Some(json!(1_760_000_000)));
    }

    #[test]
    fn normalize_stored_keeps_timestamp() {
        let stamp = "2026-10-16T10:11:12.123456789Z";
        let session = Normalizer::default()
            .normalize_stored(&json!({"config_id": "c1", "updated_at": stamp}))
            .unwrap();
        assert_eq!(session.updated_at.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true), stamp);
    }

    #[test]
    fn requests_reauth_reads_envelope_flag() {
        assert!(requests_reauth(&json!({"success": false, "needs_reauth": true})));
        assert!(requests_reauth(&json!({"data": {"needsReauth": true}})));
        assert!(!requests_reauth(&json!({"success": false, "error": "boom"})));
    }

    fn id_strategy() -> impl Strategy<Value = String> {
        "[A-Za-z0-9-]{1,16}"
    }

    proptest! {
        #[test]
        fn shape_variants_agree(config_id in id_strategy(), user_id in id_strategy()) {
            let shapes = [
                json!({"config_id": config_id, "user_id": user_id}),
                json!({"configId": config_id, "userId": user_id}),
                json!({"config_id": config_id, "user_data": {"user_id": user_id}}),
                json!({"data": {"config_id": config_id, "user_id": user_id}}),
            ];
            for shape in &shapes {
                let session = normalize(shape).unwrap();
                prop_assert_eq!(&session.config_id, &config_id);
                prop_assert_eq!(session.user_id.as_deref(), Some(user_id.as_str()));
            }
        }

        #[test]
        fn reauth_flag_and_status_never_disagree(
            needs_reauth in proptest::option::of(any::<bool>()),
            status in proptest::option::of(prop_oneof![
                Just("connected"), Just("pending"), Just("needs_reauth"),
                Just("disconnected"), Just("error"), Just("bogus"),
            ]),
        ) {
            let mut payload = json!({"config_id": "c1"});
            if let Some(flag) = needs_reauth {
                payload["needs_reauth"] = json!(flag);
            }
            if let Some(status) = status {
                payload["session_status"] = json!(status);
            }
            let session = normalize(&payload).unwrap();
            prop_assert_eq!(
                session.needs_reauth,
                session.session_status == SessionStatus::NeedsReauth
            );
        }
    }
}
