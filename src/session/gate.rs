//! Persisted-login gate
//!
//! Decides once, at start-up, whether the in-memory session can be trusted or
//! a silent refresh should be attempted, and holds back protected output
//! until that decision settles.
//!
//! ```text
//! Pending ──(token present)──────────────────────────────► Resolved
//!    │
//!    └──► Refreshing ──(refresh + profile ok)────────────► Resolved
//!             │
//!             └──(any failure)───────────────────────────► ResolvedUnauthenticated
//! ```
//!
//! Failures are logged and swallowed: the gate always resolves and content is
//! produced whatever the outcome. Authorization decisions belong to the
//! caller. Unmounting cancels the gate's token, which aborts the in-flight
//! request; nothing is written to the gate or the store afterwards.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::store::{Session, SessionStore};
use crate::api::{ApiError, AuthApi};

/// Gate lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Not mounted yet
    Pending,
    /// Waiting on refresh or profile fetch
    Refreshing,
    /// Session available
    Resolved,
    /// Restoration failed; content is shown without a session
    ResolvedUnauthenticated,
}

impl GateState {
    /// True while protected content must be withheld
    pub fn is_loading(&self) -> bool {
        matches!(self, GateState::Pending | GateState::Refreshing)
    }

    pub fn is_resolved(&self) -> bool {
        !self.is_loading()
    }
}

/// What the gate lets through
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered<T> {
    /// Loading indicator
    Loading,
    /// The children's output
    Content(T),
}

/// Gate restoring a persisted login before protected content is produced
pub struct PersistLoginGate {
    store: Arc<SessionStore>,
    api: Arc<dyn AuthApi>,
    state: watch::Sender<GateState>,
    mounted: AtomicBool,
    cancel: CancellationToken,
}

impl PersistLoginGate {
    /// Creates a gate with its own cancellation token
    pub fn new(store: Arc<SessionStore>, api: Arc<dyn AuthApi>) -> Self {
        Self::with_cancel(store, api, CancellationToken::new())
    }

    /// Creates a gate cancelled whenever `parent` is
    pub fn with_parent(
        store: Arc<SessionStore>,
        api: Arc<dyn AuthApi>,
        parent: &CancellationToken,
    ) -> Self {
        Self::with_cancel(store, api, parent.child_token())
    }

    fn with_cancel(
        store: Arc<SessionStore>,
        api: Arc<dyn AuthApi>,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(GateState::Pending);
        Self {
            store,
            api,
            state,
            mounted: AtomicBool::new(false),
            cancel,
        }
    }

    pub fn state(&self) -> GateState {
        *self.state.borrow()
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_loading()
    }

    /// True once [`unmount`](Self::unmount) has been called
    pub fn is_unmounted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Runs the mount effect
    ///
    /// Only the first call does any work; later calls return the current
    /// state. Returns the state the gate settled in, or the state it was left
    /// in if unmounted midway.
    pub async fn mount(&self) -> GateState {
        if self.mounted.swap(true, Ordering::SeqCst) {
            tracing::debug!("Login gate already mounted");
            return self.state();
        }
        if self.is_unmounted() {
            return self.state();
        }

        if self.store.is_authenticated().await {
            tracing::debug!("Access token in memory, skipping refresh");
            return self.settle(GateState::Resolved);
        }

        self.state.send_replace(GateState::Refreshing);

        let outcome = match self.restore().await {
            Ok(()) => GateState::Resolved,
            Err(ApiError::Cancelled) => {
                tracing::debug!("Login gate unmounted before restore finished");
                return self.state();
            }
            Err(e) => {
                tracing::warn!("Could not restore session: {}", e);
                GateState::ResolvedUnauthenticated
            }
        };

        if self.is_unmounted() {
            return self.state();
        }
        self.settle(outcome)
    }

    /// Refresh, then fetch the profile, writing each result to the store
    async fn restore(&self) -> Result<(), ApiError> {
        let token = match self.guarded(self.api.refresh(&self.cancel)).await {
            Ok(token) => token,
            Err(ApiError::Cancelled) => return Err(ApiError::Cancelled),
            Err(e) => {
                self.write(Session::reset).await?;
                return Err(e);
            }
        };
        tracing::info!("Session restored with token {}", token.redacted());
        let stored = token.clone();
        self.write(|session| session.put_access_token(Some(stored)))
            .await?;

        let user = self
            .guarded(self.api.current_user(&token, &self.cancel))
            .await?;
        tracing::debug!("Loaded profile for {}", user.username);
        self.write(|session| session.put_user(Some(user))).await
    }

    /// Writes to the store unless unmounted before the write lock is held
    async fn write(&self, apply: impl FnOnce(&mut Session) -> bool) -> Result<(), ApiError> {
        if self.store.update_unless_cancelled(&self.cancel, apply).await {
            Ok(())
        } else {
            Err(ApiError::Cancelled)
        }
    }

    /// Races `call` against unmount; a result arriving after unmount is dropped
    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ApiError::Cancelled),
            result = call => {
                if self.is_unmounted() {
                    Err(ApiError::Cancelled)
                } else {
                    result
                }
            }
        }
    }

    fn settle(&self, state: GateState) -> GateState {
        self.state.send_replace(state);
        state
    }

    /// Tears the gate down, aborting any in-flight request
    pub fn unmount(&self) {
        self.cancel.cancel();
    }

    /// Waits until the gate resolves or is unmounted
    pub async fn resolved(&self) -> GateState {
        let mut rx = self.state.subscribe();
        tokio::select! {
            _ = self.cancel.cancelled() => self.state(),
            result = rx.wait_for(GateState::is_resolved) => match result {
                Ok(state) => *state,
                Err(_) => self.state(),
            },
        }
    }

    /// Produces the children's output once resolved, a loading marker before
    pub fn render<T>(&self, children: impl FnOnce() -> T) -> Rendered<T> {
        if self.is_loading() {
            Rendered::Loading
        } else {
            Rendered::Content(children())
        }
    }
}

impl Drop for PersistLoginGate {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AccessGrant, MockAuthApi};
    use crate::security::Token;
    use crate::session::Profile;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio_test::{assert_pending, assert_ready};

    fn gate_with(store: Arc<SessionStore>, api: MockAuthApi) -> PersistLoginGate {
        PersistLoginGate::new(store, Arc::new(api))
    }

    // Refresh never settles on its own; records the token it was handed
    #[derive(Default)]
    struct HangingApi {
        seen_cancel: Mutex<Option<CancellationToken>>,
    }

    #[async_trait]
    impl AuthApi for HangingApi {
        async fn login(
            &self,
            _email: &str,
            _password: &str,
            _cancel: &CancellationToken,
        ) -> Result<AccessGrant, ApiError> {
            unreachable!("login is not used by the gate")
        }

        async fn refresh(&self, cancel: &CancellationToken) -> Result<Token, ApiError> {
            *self.seen_cancel.lock().unwrap() = Some(cancel.clone());
            std::future::pending().await
        }

        async fn current_user(
            &self,
            _access_token: &Token,
            _cancel: &CancellationToken,
        ) -> Result<Profile, ApiError> {
            std::future::pending().await
        }

        async fn logout(&self, _session: &Session) -> Result<(), ApiError> {
            Ok(())
        }
    }

    #[test]
    fn test_gate_state_loading() {
        assert!(GateState::Pending.is_loading());
        assert!(GateState::Refreshing.is_loading());
        assert!(GateState::Resolved.is_resolved());
        assert!(GateState::ResolvedUnauthenticated.is_resolved());
    }

    #[tokio::test]
    async fn test_token_present_resolves_without_refresh() {
        let store = Arc::new(SessionStore::new());
        store.set_access_token(Some(Token::new("tok-0"))).await;

        let mut api = MockAuthApi::new();
        api.expect_refresh().never();
        api.expect_current_user().never();

        let gate = gate_with(store.clone(), api);
        assert_eq!(gate.render(|| "children"), Rendered::Loading);

        assert_eq!(gate.mount().await, GateState::Resolved);
        assert!(!gate.is_loading());
        assert_eq!(store.access_token().await, Some(Token::new("tok-0")));
        assert_eq!(gate.render(|| "children"), Rendered::Content("children"));
    }

    #[tokio::test]
    async fn test_refresh_and_profile_populate_store() {
        let store = Arc::new(SessionStore::new());

        let mut api = MockAuthApi::new();
        api.expect_refresh()
            .times(1)
            .returning(|_| Ok(Token::new("tok-1")));
        api.expect_current_user()
            .withf(|token, _| token.expose() == "tok-1")
            .times(1)
            .returning(|_, _| Ok(Profile::new(1, "alice")));

        let gate = gate_with(store.clone(), api);
        let state = gate.mount().await;

        assert_eq!(state, GateState::Resolved);
        assert!(!gate.is_loading());
        assert_eq!(store.access_token().await, Some(Token::new("tok-1")));
        assert_eq!(store.user().await, Some(Profile::new(1, "alice")));
        assert_eq!(gate.render(|| 42), Rendered::Content(42));
    }

    #[tokio::test]
    async fn test_refresh_failure_still_renders_children() {
        let store = Arc::new(SessionStore::new());

        let mut api = MockAuthApi::new();
        api.expect_refresh()
            .times(1)
            .returning(|_| Err(ApiError::AuthFailed("expired".into())));
        api.expect_current_user().never();

        let gate = gate_with(store.clone(), api);
        let state = gate.mount().await;

        assert_eq!(state, GateState::ResolvedUnauthenticated);
        assert!(!gate.is_loading());
        assert!(store.access_token().await.is_none());
        assert!(store.user().await.is_none());
        assert_eq!(gate.render(|| "children"), Rendered::Content("children"));
    }

    #[tokio::test]
    async fn test_refresh_failure_clears_stale_csrf() {
        let store = Arc::new(SessionStore::new());
        store.set_csrf_token(Some(Token::new("stale"))).await;

        let mut api = MockAuthApi::new();
        api.expect_refresh()
            .returning(|_| Err(ApiError::Parse("missing access".into())));

        let gate = gate_with(store.clone(), api);
        gate.mount().await;

        assert_eq!(store.snapshot().await, Session::default());
    }

    #[tokio::test]
    async fn test_profile_failure_keeps_token() {
        let store = Arc::new(SessionStore::new());

        let mut api = MockAuthApi::new();
        api.expect_refresh().returning(|_| Ok(Token::new("tok-1")));
        api.expect_current_user()
            .returning(|_, _| Err(ApiError::Http(reqwest::StatusCode::BAD_GATEWAY)));

        let gate = gate_with(store.clone(), api);

        assert_eq!(gate.mount().await, GateState::ResolvedUnauthenticated);
        assert_eq!(store.access_token().await, Some(Token::new("tok-1")));
        assert!(store.user().await.is_none());
        assert!(matches!(gate.render(|| ()), Rendered::Content(())));
    }

    #[tokio::test]
    async fn test_mount_runs_once() {
        let store = Arc::new(SessionStore::new());

        let mut api = MockAuthApi::new();
        api.expect_refresh()
            .times(1)
            .returning(|_| Err(ApiError::AuthFailed("expired".into())));

        let gate = gate_with(store, api);
        gate.mount().await;
        assert_eq!(gate.mount().await, GateState::ResolvedUnauthenticated);
    }

    #[tokio::test]
    async fn test_resolved_waits_for_mount() {
        let store = Arc::new(SessionStore::new());

        let mut api = MockAuthApi::new();
        api.expect_refresh().returning(|_| Ok(Token::new("tok-1")));
        api.expect_current_user()
            .returning(|_, _| Ok(Profile::new(1, "alice")));

        let gate = Arc::new(gate_with(store, api));
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.resolved().await })
        };

        gate.mount().await;
        assert_eq!(waiter.await.unwrap(), GateState::Resolved);
    }

    #[test]
    fn test_unmount_before_refresh_settles() {
        let store = Arc::new(SessionStore::new());
        let api = Arc::new(HangingApi::default());
        let gate = PersistLoginGate::new(store.clone(), api.clone());

        let mut mount = tokio_test::task::spawn(gate.mount());
        assert_pending!(mount.poll());
        assert_eq!(gate.state(), GateState::Refreshing);

        gate.unmount();
        assert!(mount.is_woken());
        let state = assert_ready!(mount.poll());

        // No write happened after unmount: still loading, store untouched
        assert_eq!(state, GateState::Refreshing);
        assert!(gate.is_loading());
        assert!(gate.is_unmounted());

        let seen = api.seen_cancel.lock().unwrap().clone().unwrap();
        assert!(seen.is_cancelled());

        let session = tokio_test::block_on(store.snapshot());
        assert_eq!(session, Session::default());
    }

    #[tokio::test]
    async fn test_unmount_while_store_contended_writes_nothing() {
        let store = Arc::new(SessionStore::new());
        let writes = Arc::new(std::sync::atomic::AtomicU32::new(0));
        {
            let writes = writes.clone();
            store
                .on_change(move |_| {
                    writes.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }

        let mut api = MockAuthApi::new();
        api.expect_refresh().returning(|_| Ok(Token::new("tok-1")));
        api.expect_current_user().never();
        let gate = gate_with(store.clone(), api);

        // A reader holds the session while a writer would be queued behind it
        let reader = store.hold_for_test().await;
        let mut mount = tokio_test::task::spawn(gate.mount());
        assert_pending!(mount.poll());
        assert_eq!(gate.state(), GateState::Refreshing);

        gate.unmount();
        drop(reader);
        let state = assert_ready!(mount.poll());
        drop(mount);

        assert_eq!(state, GateState::Refreshing);
        assert_eq!(store.snapshot().await, Session::default());
        assert_eq!(writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unmount_releases_resolved_waiters() {
        let store = Arc::new(SessionStore::new());
        let gate = Arc::new(PersistLoginGate::new(store, Arc::new(HangingApi::default())));

        let mount = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.mount().await })
        };
        tokio::task::yield_now().await;

        gate.unmount();
        assert_eq!(gate.resolved().await, GateState::Refreshing);
        assert_eq!(mount.await.unwrap(), GateState::Refreshing);
    }

    #[tokio::test]
    async fn test_parent_cancellation_unmounts() {
        let parent = CancellationToken::new();
        let gate = PersistLoginGate::with_parent(
            Arc::new(SessionStore::new()),
            Arc::new(HangingApi::default()),
            &parent,
        );

        parent.cancel();

        assert!(gate.is_unmounted());
        assert_eq!(gate.mount().await, GateState::Pending);
    }
}
