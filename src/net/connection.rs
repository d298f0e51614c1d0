//! Realtime channel to the chat backend.
//!
//! A [`ConnectionHandle`] is opened for one auth token, or for none: anonymous
//! viewers may still read public rooms. It connects lazily on
//! the first [`ConnectionHandle::connect`], reconnects with backoff after
//! transport failures, and fans decoded events out to every subscriber.
//!
//! LIFECYCLE
//! =========
//! `Disconnected -> Connecting -> Connected -> (drop) -> Connecting ...`
//!
//! A credential rejection (HTTP 401 on the handshake, or a server
//! `connect_error` saying "Authentication error") expires the session and
//! ends the loop for good. So does [`ConnectionHandle::disconnect`] or
//! dropping the last clone of the handle. A handle that stopped is spent;
//! the owner opens a new one when the token changes.
//!
//! ERROR HANDLING
//! ==============
//! Transport errors are logged and fed to the reconnect loop. Frames that do
//! not decode are logged and skipped without dropping the connection.

#[cfg(test)]
#[path = "connection_test.rs"]
mod connection_test;

use std::sync::{Arc, Mutex, PoisonError};

use events::{InboundEvent, OutboundEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode, header::AUTHORIZATION};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::{CancellationToken, DropGuard};

use super::backoff::Backoff;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::state::auth::AuthStore;
use crate::ui::{Notice, UiEvents};

/// Message the server uses in `connect_error` when it rejects the token.
pub const AUTH_ERROR_MESSAGE: &str = "Authentication error";

const EVENT_CHANNEL_CAPACITY: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// What a chat pane needs from the realtime channel.
pub trait RoomTransport: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Send one event.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] when there is no live connection.
    fn emit(&self, event: OutboundEvent) -> Result<(), ClientError>;

    /// Receive every inbound event published from now on.
    fn subscribe(&self) -> broadcast::Receiver<InboundEvent>;
}

enum SessionEnd {
    Cancelled,
    AuthRejected,
    Closed(String),
}

struct Inner {
    config: Arc<ClientConfig>,
    token: Option<String>,
    user_id: Option<String>,
    auth: Arc<AuthStore>,
    ui: UiEvents,
    status: watch::Sender<ConnectionStatus>,
    events: broadcast::Sender<InboundEvent>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<Inner>,
    _guard: Arc<DropGuard>,
}

impl ConnectionHandle {
    /// Prepare a connection for the current session token; anonymous when
    /// nobody is logged in.
    #[must_use]
    pub fn new(config: Arc<ClientConfig>, auth: Arc<AuthStore>, ui: UiEvents) -> Self {
        let session = auth.snapshot();
        let token = session.token;
        let user_id = session.user.map(|u| u.id);
        let cancel = CancellationToken::new();
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Arc::new(Inner {
            config,
            token,
            user_id,
            auth,
            ui,
            status,
            events,
            outbound: Mutex::new(None),
            cancel: cancel.clone(),
            task: Mutex::new(None),
        });
        Self { inner, _guard: Arc::new(cancel.drop_guard()) }
    }

    /// Token this connection authenticates with; `None` for anonymous.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.inner.token.as_deref()
    }

    /// Start the connection loop. Calling it again while the loop runs, or
    /// after the handle was disconnected, does nothing.
    pub fn connect(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        let mut task = self.inner.task.lock().unwrap_or_else(PoisonError::into_inner);
        // A loop that already ended on its own (credential rejection) stays down.
        if task.is_some() {
            return;
        }
        let inner = self.inner.clone();
        *task = Some(tokio::spawn(run(inner)));
    }

    /// Close the connection and stop reconnecting.
    pub fn disconnect(&self) {
        tracing::debug!("realtime channel disconnect requested");
        self.inner.cancel.cancel();
        self.inner.take_outbound();
        self.inner.status.send_replace(ConnectionStatus::Disconnected);
    }

    /// `true` once disconnected or dropped; a closed handle never
    /// reconnects.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    /// Watch status transitions.
    #[must_use]
    pub fn status_changes(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }
}

impl RoomTransport for ConnectionHandle {
    fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    fn emit(&self, event: OutboundEvent) -> Result<(), ClientError> {
        let text = events::encode_event(&event)?;
        let outbound = self.inner.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = outbound.as_ref() else {
            return Err(ClientError::NotConnected);
        };
        tx.send(text).map_err(|_| ClientError::NotConnected)?;
        tracing::debug!(event = event.name(), "queued outbound event");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundEvent> {
        self.inner.events.subscribe()
    }
}

async fn run(inner: Arc<Inner>) {
    let mut backoff = Backoff::new(inner.config.reconnect);

    loop {
        inner.status.send_replace(ConnectionStatus::Connecting);
        let end = match inner.open().await {
            Ok(ws) => {
                backoff.reset();
                inner.pump(ws).await
            }
            Err(ClientError::SocketAuth) => SessionEnd::AuthRejected,
            Err(ClientError::Cancelled) => SessionEnd::Cancelled,
            Err(e) => {
                tracing::warn!(error = %e, attempt = backoff.attempt(), "realtime connect failed");
                SessionEnd::Closed(e.to_string())
            }
        };

        inner.take_outbound();
        inner.status.send_replace(ConnectionStatus::Disconnected);

        match end {
            SessionEnd::Cancelled => break,
            SessionEnd::AuthRejected => {
                inner.reject_credentials();
                break;
            }
            SessionEnd::Closed(reason) => {
                tracing::info!(%reason, "realtime channel closed");
            }
        }

        let delay = backoff.next_delay();
        tracing::debug!(delay_ms = delay.as_millis(), "scheduling reconnect");
        tokio::select! {
            () = inner.cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    inner.status.send_replace(ConnectionStatus::Disconnected);
    tracing::debug!("realtime loop stopped");
}

impl Inner {
    async fn open(&self) -> Result<WsStream, ClientError> {
        let url = self.config.socket_url()?;
        let mut request = url.as_str().into_client_request()?;
        if let Some(token) = &self.token {
            let bearer = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| ClientError::InvalidToken)?;
            request.headers_mut().insert(AUTHORIZATION, bearer);
        }

        let connected = tokio::select! {
            () = self.cancel.cancelled() => return Err(ClientError::Cancelled),
            result = connect_async(request) => result,
        };
        match connected {
            Ok((ws, _)) => {
                tracing::info!(%url, "realtime channel connected");
                Ok(ws)
            }
            Err(tungstenite::Error::Http(response)) if response.status() == StatusCode::UNAUTHORIZED => {
                Err(ClientError::SocketAuth)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn pump(&self, ws: WsStream) -> SessionEnd {
        let (mut sink, mut stream) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        if let Some(user_id) = &self.user_id {
            let join = OutboundEvent::JoinNotificationRoom { user_id: user_id.clone() };
            match events::encode_event(&join) {
                Ok(text) => {
                    let _ = tx.send(text);
                }
                Err(e) => tracing::warn!(error = %e, "failed to encode notification room join"),
            }
        }

        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        self.status.send_replace(ConnectionStatus::Connected);
        self.publish(InboundEvent::Connect);

        let end = loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break SessionEnd::Cancelled;
                }
                Some(text) = rx.recv() => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        break SessionEnd::Closed(e.to_string());
                    }
                }
                msg = stream.next() => match msg {
                    None => break SessionEnd::Closed("connection closed".to_owned()),
                    Some(Err(e)) => break SessionEnd::Closed(e.to_string()),
                    Some(Ok(Message::Text(text))) => {
                        if let Some(end) = self.dispatch(text.as_str()) {
                            break end;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame.map_or_else(|| "server closed".to_owned(), |f| f.reason.to_string());
                        break SessionEnd::Closed(reason);
                    }
                    Some(Ok(_)) => {}
                },
            }
        };

        let reason = match &end {
            SessionEnd::Closed(reason) => reason.clone(),
            SessionEnd::Cancelled => "client disconnect".to_owned(),
            SessionEnd::AuthRejected => return end,
        };
        self.take_outbound();
        self.status.send_replace(ConnectionStatus::Disconnected);
        self.publish(InboundEvent::Disconnect { reason });
        end
    }

    fn dispatch(&self, text: &str) -> Option<SessionEnd> {
        let event = match events::decode_event(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable realtime frame");
                return None;
            }
        };
        tracing::trace!(event = event.name(), "realtime event");

        match &event {
            InboundEvent::ConnectError { message } if message == AUTH_ERROR_MESSAGE => {
                return Some(SessionEnd::AuthRejected);
            }
            InboundEvent::NewNotification { message } => {
                let text = message.clone().unwrap_or_else(|| "New notification".to_owned());
                self.ui.notice(Notice::Notification(text));
            }
            _ => {}
        }
        self.publish(event);
        None
    }

    fn reject_credentials(&self) {
        tracing::warn!("realtime channel rejected credentials");
        if let Some(token) = &self.token
            && self.auth.expire_if_current(token)
        {
            self.ui.notice(Notice::SocketAuthFailed);
            self.ui.redirect_to_login();
        }
        self.publish(InboundEvent::ConnectError { message: AUTH_ERROR_MESSAGE.to_owned() });
    }

    fn publish(&self, event: InboundEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn take_outbound(&self) {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}
