//! Async driver for one open chat room.
//!
//! A `ChatPane` ties a [`RoomSession`] to a live transport and to the host's
//! scroll container. The host forwards scroll positions and render results;
//! the pane decides when to backfill and where the viewport should land.
//!
//! CONCURRENCY
//! ===========
//! The pane holds exactly one event subscription, taken at construction, and
//! is driven from one task through [`ChatPane::next_update`]. Closing the
//! pane cancels its token: in-flight waits return `Cancelled` and later
//! events are not applied.

#[cfg(test)]
#[path = "pane_test.rs"]
mod pane_test;

use std::sync::Arc;
use std::time::Duration;

use events::InboundEvent;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::net::api::ApiClient;
use crate::net::connection::RoomTransport;
use crate::state::room::{RoomSession, RoomUpdate};
use crate::state::scroll::{ScrollAdjustment, ScrollReconciler, Viewport};

pub struct ChatPane {
    room: RoomSession,
    scroll: ScrollReconciler,
    viewport: Viewport,
    transport: Arc<dyn RoomTransport>,
    events: broadcast::Receiver<InboundEvent>,
    cancel: CancellationToken,
    older_timeout: Duration,
    older_deadline: Option<Instant>,
    /// The host asked to be in the room; re-join after reconnects.
    want_joined: bool,
}

impl ChatPane {
    #[must_use]
    pub fn new(stream_id: impl Into<String>, transport: Arc<dyn RoomTransport>, config: &ClientConfig) -> Self {
        let events = transport.subscribe();
        Self {
            room: RoomSession::new(stream_id, config.history_page_size),
            scroll: ScrollReconciler::default(),
            viewport: Viewport::default(),
            transport,
            events,
            cancel: CancellationToken::new(),
            older_timeout: config.older_page_timeout,
            older_deadline: None,
            want_joined: false,
        }
    }

    #[must_use]
    pub fn room(&self) -> &RoomSession {
        &self.room
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Enter the room. While the channel is down the join is deferred to the
    /// next `connect` event.
    ///
    /// # Errors
    ///
    /// Transport errors from emitting the join.
    pub fn join(&mut self) -> Result<(), ClientError> {
        if self.is_closed() {
            return Err(ClientError::Cancelled);
        }
        self.want_joined = true;
        if !self.transport.is_connected() {
            tracing::debug!(stream_id = self.room.stream_id(), "join deferred until connected");
            return Ok(());
        }
        self.emit_join()
    }

    fn emit_join(&mut self) -> Result<(), ClientError> {
        let Some(event) = self.room.begin_join() else {
            return Ok(());
        };
        if let Err(e) = self.transport.emit(event) {
            self.room.join_failed();
            return Err(e);
        }
        tracing::info!(stream_id = self.room.stream_id(), "joining chat room");
        Ok(())
    }

    /// Leave the room and drop local state. A channel that is already down
    /// has dropped the membership on its own, so that case is not an error.
    ///
    /// # Errors
    ///
    /// Transport errors other than `NotConnected`.
    pub fn leave(&mut self) -> Result<(), ClientError> {
        self.want_joined = false;
        self.older_deadline = None;
        let Some(event) = self.room.leave() else {
            return Ok(());
        };
        match self.transport.emit(event) {
            Ok(()) | Err(ClientError::NotConnected) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Request the page before the oldest held message. Returns `true` if a
    /// request went out.
    ///
    /// # Errors
    ///
    /// Transport errors; the loading flag is already cleared when one is
    /// returned.
    pub fn load_older(&mut self) -> Result<bool, ClientError> {
        if self.is_closed() {
            return Ok(false);
        }
        let Some(event) = self.room.load_older(self.transport.is_connected()) else {
            return Ok(false);
        };
        if let Err(e) = self.transport.emit(event) {
            tracing::warn!(error = %e, "backfill request failed");
            self.room.older_failed();
            return Err(e);
        }
        self.older_deadline = Some(Instant::now() + self.older_timeout);
        Ok(true)
    }

    /// Post a message. Blank input is ignored (`Ok(false)`).
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] unless connected and joined.
    pub fn send(&mut self, body: &str) -> Result<bool, ClientError> {
        if body.trim().is_empty() {
            return Ok(false);
        }
        let event = self
            .room
            .compose(self.transport.is_connected(), body)
            .ok_or(ClientError::NotConnected)?;
        self.transport.emit(event)?;
        Ok(true)
    }

    /// Host reports a scroll. Reaching the top starts a backfill.
    ///
    /// # Errors
    ///
    /// See [`ChatPane::load_older`].
    pub fn on_scroll(&mut self, viewport: Viewport) -> Result<bool, ClientError> {
        self.viewport = viewport;
        if viewport.is_at_top() {
            return self.load_older();
        }
        Ok(false)
    }

    /// Host rendered the list and measured `scroll_height`. Returns the
    /// correction applied to the viewport; the host scrolls to
    /// [`ChatPane::viewport`] before painting.
    pub fn on_rendered(&mut self, scroll_height: f64) -> ScrollAdjustment {
        self.scroll.after_render(&mut self.viewport, scroll_height)
    }

    /// Apply one inbound event, recording scroll intent before the window
    /// changes.
    pub fn apply_event(&mut self, event: InboundEvent) -> RoomUpdate {
        if self.is_closed() {
            return RoomUpdate::Ignored;
        }
        match &event {
            InboundEvent::OlderChatHistory { messages } if self.room.is_loading_older() && !messages.is_empty() => {
                self.scroll.before_prepend(&self.viewport);
            }
            InboundEvent::NewMessage { message } if self.room.is_joined() && !self.room.window().contains(&message.id) => {
                self.scroll.before_append(&self.viewport);
            }
            InboundEvent::RecentChatHistory { .. } if !self.room.is_joined() => {
                self.scroll.before_append(&self.viewport);
            }
            _ => {}
        }

        let update = self.room.apply(event);
        match &update {
            RoomUpdate::Prepended { .. } | RoomUpdate::OlderExhausted | RoomUpdate::ConnectionLost { .. } => {
                self.older_deadline = None;
            }
            RoomUpdate::ConnectRejected { message } if !self.transport.is_connected() => {
                tracing::debug!(stream_id = self.room.stream_id(), %message, "connect failed");
                self.room.connection_lost();
                self.older_deadline = None;
            }
            RoomUpdate::Connected if self.want_joined => {
                if let Err(e) = self.emit_join() {
                    tracing::warn!(error = %e, stream_id = self.room.stream_id(), "re-join after reconnect failed");
                }
            }
            _ => {}
        }
        update
    }

    /// Wait for the next change to the room: an inbound event, or the
    /// pending backfill running out of time.
    ///
    /// # Errors
    ///
    /// [`ClientError::Cancelled`] once closed, [`ClientError::NotConnected`]
    /// if the transport went away for good.
    pub async fn next_update(&mut self) -> Result<RoomUpdate, ClientError> {
        let cancel = self.cancel.clone();
        loop {
            let deadline = self.older_deadline;
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ClientError::Cancelled),
                () = deadline_elapsed(deadline) => {
                    self.older_deadline = None;
                    tracing::warn!(stream_id = self.room.stream_id(), "backfill timed out");
                    return Ok(self.room.older_failed());
                }
                received = self.events.recv() => match received {
                    Ok(event) => return Ok(self.apply_event(event)),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, stream_id = self.room.stream_id(), "chat pane lagged behind the channel");
                    }
                    Err(RecvError::Closed) => return Err(ClientError::NotConnected),
                },
            }
        }
    }

    /// Load history over REST when the channel cannot deliver it. Only an
    /// empty window is filled. Returns the number of messages now held.
    ///
    /// # Errors
    ///
    /// [`ClientError::Cancelled`] if the pane closed while the request was
    /// in flight, otherwise the API error.
    pub async fn load_history_fallback(&mut self, api: &ApiClient) -> Result<usize, ClientError> {
        let cancel = self.cancel.clone();
        let messages = tokio::select! {
            () = cancel.cancelled() => return Err(ClientError::Cancelled),
            result = api.fetch_stream_messages(self.room.stream_id()) => result?,
        };
        if self.is_closed() {
            return Err(ClientError::Cancelled);
        }
        if let RoomUpdate::HistoryLoaded { count } = self.room.fill_history(messages) {
            tracing::info!(count, stream_id = self.room.stream_id(), "history loaded over REST");
        }
        Ok(self.room.window().len())
    }

    /// Leave the room and stop applying events. Idempotent.
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.leave() {
            tracing::warn!(error = %e, "leave on close failed");
        }
        self.cancel.cancel();
    }
}

impl Drop for ChatPane {
    fn drop(&mut self) {
        self.close();
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
