//! Authentication session store.
//!
//! DESIGN
//! ======
//! `AuthStore` is the only writer of the session. Every change goes through
//! a `watch` channel, so readers get consistent `{token, user}` snapshots
//! and the app can react to token changes. Each write is mirrored to
//! [`SessionStorage`] for the next start.
//!
//! A 401 may be seen by several in-flight requests and the realtime channel
//! at once. [`AuthStore::expire_if_current`] clears the session only if it
//! still holds the token that was rejected, and reports whether this call
//! did the clearing. Only that caller raises the expiry notice.

#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;

use std::sync::Arc;

use tokio::sync::watch;

use crate::net::types::User;
use crate::storage::{PersistedSession, SessionStorage};

/// Authentication state tracking the current token and user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthSession {
    pub token: Option<String>,
    pub user: Option<User>,
    pub is_authenticated: bool,
}

impl AuthSession {
    fn from_persisted(persisted: PersistedSession) -> Self {
        Self { token: Some(persisted.token), user: persisted.user, is_authenticated: true }
    }
}

/// Single-writer owner of the auth session.
///
/// Only this type's methods mutate the session; every mutation is persisted
/// and published to subscribers (the connection owner uses this to dispose
/// of a channel opened with a stale token). Storage failures are logged and
/// never block the in-memory transition.
pub struct AuthStore {
    storage: Arc<dyn SessionStorage>,
    session: watch::Sender<AuthSession>,
}

impl AuthStore {
    /// Rehydrate from persisted storage.
    #[must_use]
    pub fn hydrate(storage: Arc<dyn SessionStorage>) -> Self {
        let session = match storage.load() {
            Ok(Some(persisted)) => AuthSession::from_persisted(persisted),
            Ok(None) => AuthSession::default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load persisted session; starting anonymous");
                AuthSession::default()
            }
        };
        let (session, _) = watch::channel(session);
        Self { storage, session }
    }

    #[must_use]
    pub fn snapshot(&self) -> AuthSession {
        self.session.borrow().clone()
    }

    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.session.borrow().token.clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.session.borrow().user.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.borrow().is_authenticated
    }

    /// Watch every session transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthSession> {
        self.session.subscribe()
    }

    /// Install a freshly issued token (login).
    pub fn set_auth(&self, token: String, user: User) {
        let persisted = PersistedSession { token: token.clone(), user: Some(user.clone()) };
        if let Err(e) = self.storage.save(&persisted) {
            tracing::warn!(error = %e, "failed to persist session");
        }
        self.session.send_replace(AuthSession { token: Some(token), user: Some(user), is_authenticated: true });
        tracing::info!("auth session set");
    }

    /// Refresh the cached user without touching the token. No-op when
    /// logged out.
    pub fn set_user(&self, user: User) {
        self.session.send_if_modified(|session| {
            let Some(token) = session.token.clone() else {
                return false;
            };
            if session.user.as_ref() == Some(&user) {
                return false;
            }
            let persisted = PersistedSession { token, user: Some(user.clone()) };
            if let Err(e) = self.storage.save(&persisted) {
                tracing::warn!(error = %e, "failed to persist user info");
            }
            session.user = Some(user.clone());
            true
        });
    }

    /// Drop the session (logout). Returns `true` if there was one to drop.
    pub fn clear_auth(&self) -> bool {
        self.session.send_if_modified(|session| {
            if session.token.is_none() && session.user.is_none() {
                return false;
            }
            self.clear_locked(session);
            true
        })
    }

    /// Drop the session only if it still holds `token`.
    ///
    /// Concurrent 401s all carry the token they were sent with; exactly one
    /// of them observes the match and wins. Later callers, and callers
    /// holding a token that was already replaced by a new login, get `false`.
    pub fn expire_if_current(&self, token: &str) -> bool {
        self.session.send_if_modified(|session| {
            if session.token.as_deref() != Some(token) {
                return false;
            }
            self.clear_locked(session);
            true
        })
    }

    fn clear_locked(&self, session: &mut AuthSession) {
        if let Err(e) = self.storage.clear() {
            tracing::warn!(error = %e, "failed to clear persisted session");
        }
        *session = AuthSession::default();
        tracing::info!("auth session cleared");
    }
}
