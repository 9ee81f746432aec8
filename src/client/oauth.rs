//! Broker OAuth login: login URL, redirect parsing and popup polling.

use crate::client::broker::BrokerClient;
use crate::client::transport::BrokerTransport;
use crate::config::OAuthConfig;
use crate::core::BrokerSession;
use crate::error::{Error, Result};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::{Url, form_urlencoded};

/// Shortest poll interval a flow accepts.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Build the broker login URL.
///
/// The config id rides along in `redirect_params` so the redirect's `state`
/// identifies which config the request token belongs to. `redirect_params` is
/// itself a query string, so the id is encoded once for it and again for the
/// login URL.
///
/// # Errors
///
/// Returns [`Error::Config`] if `login_url` is not a valid URL or `api_key` is empty.
pub fn login_url(login_url: &str, api_key: &str, config_id: &str) -> Result<Url> {
    if api_key.trim().is_empty() {
        return Err(Error::Config("broker.api_key is not set".to_string()));
    }
    let mut url =
        Url::parse(login_url).map_err(|e| Error::Config(format!("broker.login_url: {e}")))?;
    let redirect_params = form_urlencoded::Serializer::new(String::new())
        .append_pair("state", config_id)
        .finish();
    url.query_pairs_mut()
        .append_pair("v", "3")
        .append_pair("api_key", api_key.trim())
        .append_pair("redirect_params", &redirect_params);
    Ok(url)
}

/// Query parameters of an OAuth redirect back to the app.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub request_token: Option<String>,
    pub state: Option<String>,
    pub status: Option<String>,
    pub action: Option<String>,
}

impl CallbackParams {
    /// Read the callback parameters from a redirect URL.
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let value = Some(value.into_owned()).filter(|v| !v.is_empty());
            match key.as_ref() {
                "request_token" => params.request_token = value,
                "state" => params.state = value,
                "status" => params.status = value,
                "action" => params.action = value,
                _ => {}
            }
        }
        params
    }

    /// Parse a redirect URL string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OAuth`] if the string is not a URL.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| Error::OAuth(format!("invalid redirect url: {e}")))?;
        Ok(Self::from_url(&url))
    }

    /// The request token of a successful redirect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OAuth`] if the broker reported a non-success status or sent no token.
    pub fn request_token(&self) -> Result<&str> {
        if let Some(status) = self.status.as_deref() {
            if !status.eq_ignore_ascii_case("success") {
                return Err(Error::OAuth(format!("broker login failed with status {status}")));
            }
        }
        self.request_token
            .as_deref()
            .ok_or_else(|| Error::OAuth("redirect carries no request_token".to_string()))
    }
}

/// A browser window the OAuth login runs in.
pub trait OAuthWindow: Send {
    /// Whether the user closed the window.
    fn is_closed(&self) -> bool;

    /// The window's current URL, or `None` while it cannot be read (cross-origin).
    fn current_url(&self) -> Option<Url>;

    /// Close the window.
    fn close(&mut self);
}

/// Terminal states of an OAuth flow. `Pending` is never returned from [`OAuthFlow::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthState {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

/// Result of an OAuth flow.
#[derive(Debug)]
pub enum OAuthOutcome {
    /// The redirect was exchanged for a session.
    Succeeded(BrokerSession),
    /// The redirect reported failure or the exchange failed.
    Failed(Error),
    /// The user closed the window, or the caller cancelled.
    Cancelled,
    /// No redirect arrived in time.
    TimedOut,
}

impl OAuthOutcome {
    #[must_use]
    pub fn state(&self) -> OAuthState {
        match self {
            Self::Succeeded(_) => OAuthState::Succeeded,
            Self::Failed(_) => OAuthState::Failed,
            Self::Cancelled => OAuthState::Cancelled,
            Self::TimedOut => OAuthState::TimedOut,
        }
    }
}

/// How polling ended.
enum Landing {
    Redirected(Url),
    Closed,
    Cancelled,
    TimedOut,
}

/// Polls an OAuth popup until it lands back on the app's origin.
#[derive(Debug, Clone)]
pub struct OAuthFlow {
    app_origin: Url,
    poll_interval: Duration,
    timeout: Duration,
}

impl OAuthFlow {
    /// Create a flow. A zero poll interval is raised to one millisecond.
    #[must_use]
    pub fn new(app_origin: Url, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            app_origin,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            timeout,
        }
    }

    /// Build a flow from the `[oauth]` config section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `app_origin` is not a valid URL or the poll
    /// interval or timeout is zero.
    pub fn from_config(config: &OAuthConfig) -> Result<Self> {
        if config.poll_interval_ms == 0 {
            return Err(Error::Config("oauth.poll_interval_ms must be positive".to_string()));
        }
        if config.timeout_seconds == 0 {
            return Err(Error::Config("oauth.timeout_seconds must be positive".to_string()));
        }
        let app_origin = Url::parse(&config.app_origin)
            .map_err(|e| Error::Config(format!("oauth.app_origin: {e}")))?;
        Ok(Self::new(app_origin, config.poll_interval(), config.timeout()))
    }

    /// Drive the popup to exactly one terminal outcome.
    ///
    /// The window is closed on every outcome except a user close.
    pub async fn run<W, T>(
        &self,
        window: &mut W,
        client: &BrokerClient<T>,
        config_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> OAuthOutcome
    where
        W: OAuthWindow,
        T: BrokerTransport,
    {
        let landing = tokio::select! {
            () = cancel.cancelled() => Landing::Cancelled,
            polled = tokio::time::timeout(self.timeout, self.poll(window)) => {
                polled.unwrap_or(Landing::TimedOut)
            }
        };

        match landing {
            Landing::Redirected(url) => {
                window.close();
                let params = CallbackParams::from_url(&url);
                match client.handle_oauth_callback(&params, config_id).await {
                    Ok(session) => {
                        info!(config_id = %session.config_id, "oauth flow succeeded");
                        OAuthOutcome::Succeeded(session)
                    }
                    Err(e) => {
                        warn!(error = %e, "oauth flow failed");
                        OAuthOutcome::Failed(e)
                    }
                }
            }
            Landing::Closed => {
                info!("oauth window closed by user");
                OAuthOutcome::Cancelled
            }
            Landing::Cancelled => {
                window.close();
                OAuthOutcome::Cancelled
            }
            Landing::TimedOut => {
                warn!(timeout_secs = self.timeout.as_secs(), "oauth flow timed out");
                window.close();
                OAuthOutcome::TimedOut
            }
        }
    }

    async fn poll<W: OAuthWindow>(&self, window: &W) -> Landing {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if window.is_closed() {
                return Landing::Closed;
            }
            if let Some(url) = window.current_url() {
                if url.origin() == self.app_origin.origin() {
                    return Landing::Redirected(url);
                }
            }
        }
    }
}
