//! Session store - holder of the current token material and profile
//!
//! One store is created at the application root and shared as
//! `Arc<SessionStore>` with every component that needs it. It does no
//! networking and persists nothing.

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::profile::Profile;
use crate::security::Token;

/// Callback invoked after every change to the session
pub type SessionCallback = Box<dyn Fn(&Session) + Send + Sync>;

/// Point-in-time copy of the session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub access_token: Option<Token>,
    pub csrf_token: Option<Token>,
    pub user: Option<Profile>,
}

impl Session {
    /// True when an access token is held
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    pub(crate) fn put_access_token(&mut self, token: Option<Token>) -> bool {
        if token.is_none() {
            self.user = None;
        }
        self.access_token = token;
        true
    }

    /// Returns false when the profile was discarded
    pub(crate) fn put_user(&mut self, user: Option<Profile>) -> bool {
        if user.is_some() && self.access_token.is_none() {
            tracing::warn!("Discarding profile: no access token in session");
            return false;
        }
        self.user = user;
        true
    }

    pub(crate) fn reset(&mut self) -> bool {
        *self = Session::default();
        true
    }
}

/// Holder of the session shared by the client
///
/// Invariant: no user is held without an access token. Clearing the access
/// token clears the user; a user set while no token is held is discarded.
pub struct SessionStore {
    session: RwLock<Session>,
    listeners: RwLock<Vec<SessionCallback>>,
}

impl SessionStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self {
            session: RwLock::new(Session::default()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Replaces the access token
    pub async fn set_access_token(&self, token: Option<Token>) {
        let changed = self.session.write().await.put_access_token(token);
        self.notify_if(changed).await;
    }

    /// Replaces the CSRF token
    pub async fn set_csrf_token(&self, token: Option<Token>) {
        self.session.write().await.csrf_token = token;
        self.notify().await;
    }

    /// Replaces the authenticated profile
    pub async fn set_user(&self, user: Option<Profile>) {
        let changed = self.session.write().await.put_user(user);
        self.notify_if(changed).await;
    }

    /// Empties the session (logout, unrecoverable refresh failure)
    pub async fn clear(&self) {
        let changed = self.session.write().await.reset();
        self.notify_if(changed).await;
    }

    /// Applies `apply` unless `cancel` fires before the write lock is held
    ///
    /// Returns false when cancelled; nothing was written. Once the lock is
    /// held the write completes without yielding.
    pub(crate) async fn update_unless_cancelled(
        &self,
        cancel: &CancellationToken,
        apply: impl FnOnce(&mut Session) -> bool,
    ) -> bool {
        let mut session = tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            session = self.session.write() => session,
        };
        let changed = apply(&mut session);
        drop(session);
        self.notify_if(changed).await;
        true
    }

    pub async fn access_token(&self) -> Option<Token> {
        self.session.read().await.access_token.clone()
    }

    pub async fn csrf_token(&self) -> Option<Token> {
        self.session.read().await.csrf_token.clone()
    }

    pub async fn user(&self) -> Option<Profile> {
        self.session.read().await.user.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.is_authenticated()
    }

    /// Returns a copy of the whole session
    pub async fn snapshot(&self) -> Session {
        self.session.read().await.clone()
    }

    /// Registers a callback run after each change
    pub async fn on_change<F>(&self, callback: F)
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        self.listeners.write().await.push(Box::new(callback));
    }

    #[cfg(test)]
    pub(crate) async fn hold_for_test(&self) -> tokio::sync::RwLockReadGuard<'_, Session> {
        self.session.read().await
    }

    async fn notify_if(&self, changed: bool) {
        if changed {
            self.notify().await;
        }
    }

    async fn notify(&self) {
        let listeners = self.listeners.read().await;
        if listeners.is_empty() {
            return;
        }
        let snapshot = self.snapshot().await;
        for listener in listeners.iter() {
            listener(&snapshot);
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
