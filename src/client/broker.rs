//! Broker status client.
//!
//! Every call resolves to one of three outcomes: a session update that goes
//! through [`SessionStore`], a reauthentication failure that marks the stored
//! session, or a transient failure that leaves the stored session alone.

use crate::client::oauth::CallbackParams;
use crate::client::retry::RetryPolicy;
use crate::client::transport::{BrokerRequest, BrokerTransport, TransportResponse};
use crate::core::normalize::{extract_config_id, extract_user_id, requests_reauth};
use crate::core::{BrokerSession, Generation, SessionStore, WriteOutcome};
use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

const STATUS_PATH: &str = "/broker/status";
const REFRESH_PATH: &str = "/broker/refresh-token";
const DISCONNECT_PATH: &str = "/broker/disconnect";
const GENERATE_SESSION_PATH: &str = "/broker/generate-session";
const TOKEN_UPDATE_PATH: &str = "/broker/token/update";

/// Access token pushed to the backend after an out-of-band login.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenUpdate {
    pub user_id: String,
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    pub source: String,
}

impl TokenUpdate {
    #[must_use]
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
            expires_in: None,
            expires_at: None,
            source: "automation".to_string(),
        }
    }
}

/// Client for the broker backend's session endpoints.
pub struct BrokerClient<T> {
    transport: T,
    store: Arc<SessionStore>,
    retry: RetryPolicy,
}

impl<T: BrokerTransport> BrokerClient<T> {
    /// Create a client that writes sessions into `store`.
    #[must_use]
    pub fn new(transport: T, store: Arc<SessionStore>) -> Self {
        Self {
            transport,
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy used by retryable calls.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The session store this client writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Check the broker connection and persist the refreshed session.
    ///
    /// Explicit identifiers win over the stored session's. When neither a config
    /// id nor a user id can be resolved the request is not sent and `Ok(None)`
    /// is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReauthRequired`] on HTTP 401/403 or an explicit reauth flag
    /// (after marking the stored session), and a transient or fatal error for
    /// transport and other HTTP failures (stored session untouched).
    pub async fn check_connection_status(
        &self,
        config_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<Option<BrokerSession>> {
        let (config_id, user_id) = self.resolve_identity(config_id, user_id);
        if config_id.is_none() && user_id.is_none() {
            warn!("skipping status check: no config id or user id available");
            return Ok(None);
        }

        let mut request = BrokerRequest::get(STATUS_PATH);
        if let Some(id) = &config_id {
            request = request.with_query("config_id", id);
        }
        if let Some(id) = &user_id {
            request = request.with_query("user_id", id);
        }

        let stamp = self.store.generation();
        let body = self.call(request, stamp, config_id.as_deref()).await?;
        self.apply(stamp, body, config_id.as_deref(), user_id.as_deref())
    }

    /// Ask the backend to refresh the broker tokens.
    ///
    /// Skipped (`Ok(None)`) when no config id is available.
    ///
    /// # Errors
    ///
    /// Same classification as [`check_connection_status`](Self::check_connection_status).
    pub async fn refresh_tokens(&self, config_id: Option<&str>) -> Result<Option<BrokerSession>> {
        let (config_id, user_id) = self.resolve_identity(config_id, None);
        let Some(config_id) = config_id else {
            warn!("skipping token refresh: no config id available");
            return Ok(None);
        };

        let request = BrokerRequest::post(REFRESH_PATH, json!({ "config_id": config_id }));
        let stamp = self.store.generation();
        let body = self.call(request, stamp, Some(&config_id)).await?;
        self.apply(stamp, body, Some(&config_id), user_id.as_deref())
    }

    /// Exchange an OAuth request token for a broker session.
    ///
    /// This is the explicit reauthentication path: a successful response
    /// replaces the stored session unconditionally, clearing any reauth flag
    /// the backend no longer reports.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSession`] if the response carries no usable
    /// session, plus the usual transport/HTTP classification.
    pub async fn generate_session(
        &self,
        config_id: &str,
        request_token: &str,
    ) -> Result<BrokerSession> {
        let request = BrokerRequest::post(
            GENERATE_SESSION_PATH,
            json!({ "config_id": config_id, "request_token": request_token }),
        );
        let stamp = self.store.generation();
        let body = self.call(request, stamp, Some(config_id)).await?;
        let payload = with_identity(body, Some(config_id), None);

        let session = self.store.persist(&payload)?.ok_or_else(|| {
            Error::InvalidSession("generate-session response has no config id".to_string())
        })?;
        info!(config_id = %session.config_id, "broker session established");
        Ok(session)
    }

    /// Route an OAuth redirect into [`generate_session`](Self::generate_session).
    ///
    /// The config id comes from the callback `state`, then `fallback_config_id`,
    /// then the stored session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OAuth`] when the callback reports failure or lacks a
    /// request token or config id.
    pub async fn handle_oauth_callback(
        &self,
        params: &CallbackParams,
        fallback_config_id: Option<&str>,
    ) -> Result<BrokerSession> {
        let request_token = params.request_token()?;
        let config_id = params
            .state
            .clone()
            .or_else(|| fallback_config_id.map(String::from))
            .or_else(|| self.store.load().map(|s| s.config_id))
            .ok_or_else(|| Error::OAuth("callback does not identify a broker config".to_string()))?;

        self.generate_session(&config_id, request_token).await
    }

    /// Disconnect the broker and clear the local session.
    ///
    /// Returns `Ok(false)` without sending anything when no config id is available.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rejected`] if the backend answers `success: false`,
    /// plus the usual transport/HTTP classification.
    pub async fn disconnect_broker(&self, config_id: Option<&str>) -> Result<bool> {
        let (config_id, _) = self.resolve_identity(config_id, None);
        let Some(config_id) = config_id else {
            warn!("skipping disconnect: no config id available");
            return Ok(false);
        };

        let request = BrokerRequest::post(DISCONNECT_PATH, json!({ "config_id": config_id }));
        let stamp = self.store.generation();
        self.call(request, stamp, Some(&config_id)).await?;

        self.store.clear()?;
        info!(config_id = %config_id, "broker disconnected");
        Ok(true)
    }

    /// Push an externally obtained access token to the backend.
    ///
    /// Transient failures are retried with the client's [`RetryPolicy`];
    /// reauthentication failures are not.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingField`] if the access token is empty, otherwise
    /// the last failure once retries are exhausted.
    pub async fn update_token(&self, update: &TokenUpdate) -> Result<Value> {
        if update.access_token.trim().is_empty() {
            return Err(Error::MissingField("access_token".to_string()));
        }
        let body = serde_json::to_value(update)?;

        self.retry
            .run(|attempt| {
                let request = BrokerRequest::post(TOKEN_UPDATE_PATH, body.clone());
                async move {
                    debug!(attempt, "sending token update");
                    let stamp = self.store.generation();
                    self.call(request, stamp, None).await
                }
            })
            .await
    }

    /// Explicit identifiers first, then the stored session's.
    ///
    /// The stored user id is only borrowed when it belongs to the same config.
    fn resolve_identity(
        &self,
        config_id: Option<&str>,
        user_id: Option<&str>,
    ) -> (Option<String>, Option<String>) {
        let stored = self.store.load();
        let config = config_id
            .map(String::from)
            .or_else(|| stored.as_ref().map(|s| s.config_id.clone()));
        let user = user_id.map(String::from).or_else(|| {
            stored
                .filter(|s| config.as_deref().is_none_or(|c| c == s.config_id))
                .and_then(|s| s.user_id)
        });
        (config, user)
    }

    /// Send a request and classify the outcome.
    async fn call(
        &self,
        request: BrokerRequest,
        stamp: Generation,
        config_id: Option<&str>,
    ) -> Result<Value> {
        let path = request.path.clone();
        let response = self.transport.send(request).await.map_err(|e| {
            warn!(path = %path, error = %e, "broker request failed without a response");
            Error::from(e)
        })?;
        debug!(path = %path, status = response.status, "broker response");
        self.classify(response, stamp, config_id)
    }

    fn classify(
        &self,
        response: TransportResponse,
        stamp: Generation,
        config_id: Option<&str>,
    ) -> Result<Value> {
        let TransportResponse { status, body } = response;

        if status == 401 || status == 403 {
            return Err(self.escalate_reauth(stamp, config_id, format!("HTTP {status}")));
        }
        if !(200..300).contains(&status) {
            return Err(Error::Http {
                status,
                message: error_message(&body).unwrap_or_else(|| "request failed".to_string()),
            });
        }
        if requests_reauth(&body) {
            let reason = error_message(&body).unwrap_or_else(|| "backend requested reauthentication".to_string());
            return Err(self.escalate_reauth(stamp, config_id, reason));
        }
        if body.get("success").and_then(Value::as_bool) == Some(false) {
            return Err(Error::Rejected(
                error_message(&body).unwrap_or_else(|| "backend reported failure".to_string()),
            ));
        }
        Ok(body)
    }

    /// Mark the stored session and build the reauth error.
    ///
    /// Only the session for the rejected config is marked; a request that named
    /// no config marks nothing. A storage failure while marking is logged and the
    /// caller still gets the reauth error.
    fn escalate_reauth(&self, stamp: Generation, config_id: Option<&str>, reason: String) -> Error {
        let Some(rejected) = config_id else {
            debug!(reason = %reason, "credentials rejected for a request without a config");
            return Error::ReauthRequired {
                config_id: None,
                reason,
            };
        };
        match self.store.mark_needs_reauth_if_current(stamp, rejected) {
            Ok(WriteOutcome::Written(session)) => {
                info!(config_id = %session.config_id, reason = %reason, "credentials rejected");
            }
            Ok(WriteOutcome::Invalid) => {
                debug!(config_id = %rejected, "credentials rejected for a config that is not stored");
            }
            Ok(WriteOutcome::Stale(_)) => {
                warn!("credentials rejected for a superseded session, stored session left as is");
            }
            Err(e) => warn!(error = %e, "failed to mark session for reauthentication"),
        }
        Error::ReauthRequired {
            config_id: config_id.map(String::from),
            reason,
        }
    }

    /// Persist a success body unless the slot moved on while the request was in flight.
    ///
    /// A stored reauth flag for the same config survives; see
    /// [`SessionStore::persist_if_current`].
    fn apply(
        &self,
        stamp: Generation,
        body: Value,
        config_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<Option<BrokerSession>> {
        let payload = with_identity(body, config_id, user_id);
        match self.store.persist_if_current(stamp, &payload)? {
            WriteOutcome::Written(session) => Ok(Some(session)),
            WriteOutcome::Invalid => Ok(None),
            WriteOutcome::Stale(current) => Ok(current),
        }
    }
}

/// Fill identifiers the backend left out with the ones the request was sent with.
fn with_identity(body: Value, config_id: Option<&str>, user_id: Option<&str>) -> Value {
    let mut payload = if body.is_object() {
        body
    } else {
        Value::Object(Map::new())
    };
    if extract_config_id(&payload).is_none() {
        if let Some(id) = config_id {
            payload["config_id"] = json!(id);
        }
    }
    if extract_user_id(&payload).is_none() {
        if let Some(id) = user_id {
            payload["user_id"] = json!(id);
        }
    }
    payload
}

/// Best-effort error text from a response body.
fn error_message(body: &Value) -> Option<String> {
    match body {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => ["error", "message", "detail"]
            .iter()
            .find_map(|key| map.get(*key)?.as_str().map(String::from)),
        _ => None,
    }
}
