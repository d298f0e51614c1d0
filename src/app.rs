//! Root composition of the client.
//!
//! SYSTEM CONTEXT
//! ==============
//! `App` wires config, the auth store, the REST client, and at most one
//! realtime connection. The connection is keyed by the session token, with
//! anonymous viewers getting their own tokenless channel: when the token
//! changes (login, logout, expiry, socket auth failure) the old channel is
//! closed and the next caller gets a fresh one.

#[cfg(test)]
#[path = "app_test.rs"]
mod app_test;

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::net::api::ApiClient;
use crate::net::connection::ConnectionHandle;
use crate::net::types::User;
use crate::pane::ChatPane;
use crate::state::auth::{AuthSession, AuthStore};
use crate::storage::SessionStorage;
use crate::ui::UiEvents;

type ConnectionSlot = Arc<Mutex<Option<ConnectionHandle>>>;

pub struct App {
    config: Arc<ClientConfig>,
    auth: Arc<AuthStore>,
    ui: UiEvents,
    api: ApiClient,
    connection: ConnectionSlot,
    session_watcher: JoinHandle<()>,
}

impl App {
    /// Rehydrate the session and start watching it. Must be called inside a
    /// tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig, storage: Arc<dyn SessionStorage>, ui: UiEvents) -> Result<Self, ClientError> {
        let config = Arc::new(config);
        let auth = Arc::new(AuthStore::hydrate(storage));
        let api = ApiClient::new(config.clone(), auth.clone(), ui.clone())?;
        let connection: ConnectionSlot = Arc::new(Mutex::new(None));
        let session_watcher = tokio::spawn(watch_session(auth.subscribe(), connection.clone()));
        Ok(Self { config, auth, ui, api, connection, session_watcher })
    }

    /// Startup check of a rehydrated token. `None` means anonymous.
    pub async fn start(&self) -> Option<User> {
        let user = self.api.verify_session().await;
        match &user {
            Some(user) => tracing::info!(user_id = %user.id, "session verified"),
            None => tracing::info!("starting anonymous"),
        }
        user
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn auth(&self) -> &Arc<AuthStore> {
        &self.auth
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// # Errors
    ///
    /// See [`ApiClient::login`].
    pub async fn login(&self, username: &str, password: &str) -> Result<User, ClientError> {
        self.api.login(username, password).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::logout`]. The session is cleared either way.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = self.api.logout().await;
        dispose_stale(&self.connection, self.auth.token().as_deref());
        result
    }

    /// The realtime channel for the current token (anonymous while logged
    /// out), created and started on first use.
    #[must_use]
    pub fn connection(&self) -> ConnectionHandle {
        let token = self.auth.token();
        dispose_stale(&self.connection, token.as_deref());

        let mut slot = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.as_ref() {
            return handle.clone();
        }
        let handle = ConnectionHandle::new(self.config.clone(), self.auth.clone(), self.ui.clone());
        handle.connect();
        *slot = Some(handle.clone());
        handle
    }

    /// Open a chat pane on `stream_id` and join it. Public rooms are
    /// readable without a session.
    ///
    /// # Errors
    ///
    /// Transport errors from the join.
    pub fn open_chat(&self, stream_id: &str) -> Result<ChatPane, ClientError> {
        let connection = self.connection();
        let mut pane = ChatPane::new(stream_id, Arc::new(connection), &self.config);
        pane.join()?;
        Ok(pane)
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.session_watcher.abort();
        let held = self.connection.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = held {
            handle.disconnect();
        }
    }
}

/// Close the held connection unless it belongs to `current_token`.
fn dispose_stale(slot: &ConnectionSlot, current_token: Option<&str>) {
    let stale = {
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(handle) if handle.token() != current_token => slot.take(),
            _ => None,
        }
    };
    if let Some(handle) = stale {
        tracing::info!("session token changed; closing realtime channel");
        handle.disconnect();
    }
}

async fn watch_session(mut sessions: watch::Receiver<AuthSession>, slot: ConnectionSlot) {
    while sessions.changed().await.is_ok() {
        let token = sessions.borrow_and_update().token.clone();
        dispose_stale(&slot, token.as_deref());
    }
}
