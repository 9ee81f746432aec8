//! Session hook: a reactive view over the session store for UI code.
//!
//! The hook paints from storage synchronously, refreshes in the background,
//! and fans state out through a [`tokio::sync::watch`] channel. Failures never
//! escape a refresh: reauthentication shows up as `needs_reauth`, anything else
//! as `error`.

use crate::client::{BrokerClient, BrokerTransport};
use crate::core::BrokerSession;
use crate::hooks::state::{HookError, HookState};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Reactive session adapter.
pub struct SessionHook<T> {
    client: Arc<BrokerClient<T>>,
    state: watch::Sender<HookState>,
    in_flight: AtomicUsize,
    lifecycle: CancellationToken,
}

impl<T: BrokerTransport + 'static> SessionHook<T> {
    /// Create a hook with the stored session already loaded.
    ///
    /// `loading` starts out true until [`bootstrap`](Self::bootstrap) runs.
    #[must_use]
    pub fn new(client: Arc<BrokerClient<T>>) -> Self {
        let mut initial = HookState::with_session(client.store().load());
        initial.loading = true;
        let (state, _) = watch::channel(initial);
        Self {
            client,
            state,
            in_flight: AtomicUsize::new(0),
            lifecycle: CancellationToken::new(),
        }
    }

    /// Create a hook and spawn its background bootstrap refresh.
    #[must_use]
    pub fn mount(client: Arc<BrokerClient<T>>) -> (Arc<Self>, JoinHandle<()>) {
        let hook = Arc::new(Self::new(client));
        let task = tokio::spawn({
            let hook = Arc::clone(&hook);
            async move { hook.bootstrap().await }
        });
        (hook, task)
    }

    /// Refresh with whatever identifiers the store has.
    ///
    /// With no stored session nothing is sent and `loading` simply drops.
    pub async fn bootstrap(&self) {
        self.refresh(None, None).await;
    }

    /// Re-check the broker connection.
    ///
    /// Safe to call concurrently; the last completed call wins. Returns the
    /// session now shown, or `None` when the refresh was skipped, failed
    /// transiently, or the hook was unmounted.
    pub async fn refresh(
        &self,
        config_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Option<BrokerSession> {
        if self.lifecycle.is_cancelled() {
            return None;
        }
        self.begin();

        let result = tokio::select! {
            () = self.lifecycle.cancelled() => {
                debug!("refresh abandoned: hook unmounted");
                self.finish();
                return None;
            }
            result = self.client.check_connection_status(config_id, user_id) => result,
        };

        let shown = match result {
            Ok(Some(session)) => {
                self.update(|state| state.set_session(Some(session.clone())));
                Some(session)
            }
            Ok(None) => {
                let stored = self.client.store().load();
                self.update(|state| state.set_session(stored.clone()));
                stored
            }
            Err(e) if e.is_reauth() => {
                let stored = self.client.store().load();
                self.update(|state| {
                    state.session.clone_from(&stored);
                    state.needs_reauth = true;
                    state.error = None;
                });
                stored
            }
            Err(e) => {
                warn!(error = %e, "session refresh failed");
                self.update(|state| state.error = Some(HookError::from(&e)));
                None
            }
        };
        self.finish();
        shown
    }

    /// Flag the stored session for reauthentication.
    pub fn mark_needs_reauth(&self) {
        match self.client.store().mark_needs_reauth() {
            Ok(session) => self.update(|state| {
                state.session = session;
                state.needs_reauth = true;
            }),
            Err(e) => {
                warn!(error = %e, "failed to mark session for reauthentication");
                self.update(|state| state.error = Some(HookError::from(&e)));
            }
        }
    }

    /// Drop the stored session.
    pub fn clear_session(&self) {
        match self.client.store().clear() {
            Ok(()) => self.update(|state| state.set_session(None)),
            Err(e) => {
                warn!(error = %e, "failed to clear session");
                self.update(|state| state.error = Some(HookError::from(&e)));
            }
        }
    }

    /// Current state.
    #[must_use]
    pub fn snapshot(&self) -> HookState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<HookState> {
        self.state.subscribe()
    }

    /// The client this hook drives.
    #[must_use]
    pub fn client(&self) -> &Arc<BrokerClient<T>> {
        &self.client
    }

    /// Stop all hook work. In-flight refreshes are abandoned and later calls
    /// leave the hook state untouched.
    pub fn unmount(&self) {
        self.lifecycle.cancel();
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        !self.lifecycle.is_cancelled()
    }

    fn begin(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.update(|state| state.loading = true);
    }

    fn finish(&self) {
        let remaining = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        self.update(|state| state.loading = remaining > 0);
    }

    fn update(&self, change: impl FnOnce(&mut HookState)) {
        if self.lifecycle.is_cancelled() {
            return;
        }
        self.state.send_modify(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RetryPolicy;
    use crate::client::scripted::ScriptedTransport;
    use crate::core::{SessionStatus, SessionStore};
    use crate::error::ErrorClass;
    use crate::storage::MemoryBackend;
    use serde_json::json;

    fn client(transport: ScriptedTransport, seeded: bool) -> Arc<BrokerClient<ScriptedTransport>> {
        let store = Arc::new(SessionStore::new(Arc::new(MemoryBackend::new())));
        if seeded {
            store
                .persist(&json!({"config_id": "c1", "user_id": "u1"}))
                .unwrap();
        }
        Arc::new(BrokerClient::new(transport, store).with_retry(RetryPolicy::none()))
    }

    #[test]
    fn new_paints_stored_session() {
        let hook = SessionHook::new(client(ScriptedTransport::new(), true));
        let state = hook.snapshot();
        assert_eq!(state.session.unwrap().config_id, "c1");
        assert!(state.loading);
        assert!(!state.needs_reauth);
    }

    #[tokio::test]
    async fn bootstrap_without_identity_is_silent() {
        let hook = SessionHook::new(client(ScriptedTransport::new(), false));
        hook.bootstrap().await;

        let state = hook.snapshot();
        assert!(state.session.is_none());
        assert!(!state.loading);
        assert!(state.error.is_none());
        assert!(hook.client().transport().requests().is_empty());
    }

    #[tokio::test]
    async fn mount_refreshes_in_background() {
        let transport = ScriptedTransport::new().reply(
            200,
            json!({"success": true, "data": {"token_status": "valid"}}),
        );
        let (hook, task) = SessionHook::mount(client(transport, true));
        task.await.unwrap();

        let state = hook.snapshot();
        assert!(!state.loading);
        assert_eq!(state.session.unwrap().token_status, Some(json!("valid")));
    }

    #[tokio::test]
    async fn reauth_becomes_state_not_error() {
        let hook = SessionHook::new(client(ScriptedTransport::new().reply(401, json!({})), true));

        let shown = hook.refresh(None, None).await.unwrap();
        assert!(shown.needs_reauth);

        let state = hook.snapshot();
        assert!(state.needs_reauth);
        assert!(state.error.is_none());
        assert_eq!(
            state.session.unwrap().session_status,
            SessionStatus::NeedsReauth
        );
    }

    #[tokio::test]
    async fn transient_failure_becomes_error() {
        let hook = SessionHook::new(client(ScriptedTransport::new().fail("connection refused"), true));

        assert!(hook.refresh(None, None).await.is_none());

        let state = hook.snapshot();
        assert!(!state.needs_reauth);
        assert!(!state.loading);
        assert_eq!(state.error.unwrap().class, ErrorClass::Transient);
        assert_eq!(state.session.unwrap().config_id, "c1");
    }

    #[tokio::test]
    async fn success_clears_previous_error() {
        let transport = ScriptedTransport::new()
            .reply(503, json!({}))
            .reply(200, json!({"success": true}));
        let hook = SessionHook::new(client(transport, true));

        hook.refresh(None, None).await;
        assert!(hook.snapshot().error.is_some());

        hook.refresh(None, None).await;
        assert!(hook.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn bootstrap_keeps_stored_reauth() {
        let client = client(
            ScriptedTransport::new().reply(200, json!({"success": true, "data": {"token_status": "valid"}})),
            true,
        );
        client.store().mark_needs_reauth().unwrap();
        let hook = SessionHook::new(client);
        assert!(hook.snapshot().needs_reauth);

        hook.bootstrap().await;

        let state = hook.snapshot();
        assert!(state.needs_reauth);
        assert!(state.error.is_none());
        let session = state.session.unwrap();
        assert_eq!(session.session_status, SessionStatus::NeedsReauth);
        assert_eq!(session.token_status, Some(json!("valid")));
    }

    #[test]
    fn mark_and_clear() {
        let hook = SessionHook::new(client(ScriptedTransport::new(), true));

        hook.mark_needs_reauth();
        let state = hook.snapshot();
        assert!(state.needs_reauth);
        assert!(state.session.unwrap().needs_reauth);
        assert!(hook.client().store().load().unwrap().needs_reauth);

        hook.clear_session();
        let state = hook.snapshot();
        assert!(state.session.is_none());
        assert!(!state.needs_reauth);
        assert!(hook.client().store().load().is_none());
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let hook = SessionHook::new(client(ScriptedTransport::new(), true));
        let mut rx = hook.subscribe();

        hook.mark_needs_reauth();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().needs_reauth);
    }

    #[tokio::test]
    async fn unmounted_hook_ignores_work() {
        let hook = SessionHook::new(client(
            ScriptedTransport::new().reply(200, json!({"success": true})),
            true,
        ));
        let before = hook.snapshot();
        hook.unmount();

        assert!(!hook.is_mounted());
        assert!(hook.refresh(None, None).await.is_none());
        hook.clear_session();
        assert_eq!(hook.snapshot(), before);
        assert!(hook.client().transport().requests().is_empty());
    }
}
