//! CLI command implementations.

pub mod callback;
pub mod clear;
pub mod disconnect;
pub mod login_url;
pub mod mark_reauth;
pub mod refresh;
pub mod show;
pub mod status;
pub mod token_update;

use crate::client::{BrokerClient, ReqwestTransport, RetryPolicy};
use crate::config::Config;
use crate::core::{BrokerSession, Normalizer, SessionStore};
use crate::error::Result;
use crate::storage::FileBackend;
use std::sync::Arc;

/// Open the file-backed session store named by the config.
///
/// # Errors
///
/// Returns an error if the storage directory cannot be created.
pub fn open_store(config: &Config) -> Result<Arc<SessionStore>> {
    let backend = FileBackend::new(config.storage.path.clone())?;
    Ok(Arc::new(SessionStore::with_normalizer(
        Arc::new(backend),
        Normalizer::with_default_broker(config.broker.default_name.clone()),
    )))
}

/// Build an HTTP broker client over the config's store.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the backend URL is invalid.
pub fn connect(config: &Config) -> Result<BrokerClient<ReqwestTransport>> {
    let transport = ReqwestTransport::from_config(&config.backend)?;
    Ok(BrokerClient::new(transport, open_store(config)?)
        .with_retry(RetryPolicy::from_config(&config.retry)))
}

/// Render a session for stdout, or a placeholder line.
///
/// # Errors
///
/// Returns an error if the session cannot be serialized.
pub fn render_session(session: Option<&BrokerSession>) -> Result<String> {
    match session {
        Some(session) => Ok(serde_json::to_string_pretty(session)?),
        None => Ok("No broker session.".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::normalize;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn store_lives_under_storage_path() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.path = temp.path().to_path_buf();
        config.broker.default_name = "upstox".to_string();

        let store = open_store(&config).unwrap();
        let session = store.persist(&json!({"config_id": "c1"})).unwrap().unwrap();

        assert_eq!(session.broker_name, "upstox");
        assert!(temp.path().join("state/broker_session.json").exists());
        assert!(temp.path().join("state/broker_configs.json").exists());
    }

    #[test]
    fn render_camel_case() {
        let session = normalize(&json!({"config_id": "c1", "user_id": "u1"})).unwrap();
        let out = render_session(Some(&session)).unwrap();
        assert!(out.contains("\"configId\": \"c1\""));
        assert_eq!(render_session(None).unwrap(), "No broker session.");
    }
}
