//! Per-room chat session state machine.
//!
//! DESIGN
//! ======
//! `RoomSession` is pure: it never touches the network. Operations that
//! need the server return the `OutboundEvent` to emit, and every inbound
//! event goes through the single exhaustive [`RoomSession::apply`]
//! dispatcher. The async driver (`pane`) owns transport and timing.
//!
//! LIFECYCLE
//! =========
//! `Disconnected -> Connecting -> Joined -> Left`, with a drop back to
//! `Disconnected` whenever the channel closes. Backfill (`is_loading_older`)
//! is a flag inside `Joined` rather than a phase, so live appends keep
//! flowing while an older page is in flight.

#[cfg(test)]
#[path = "room_test.rs"]
mod room_test;

use events::{ChatMessage, InboundEvent, OutboundEvent};

use super::window::MessageWindow;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RoomPhase {
    #[default]
    Disconnected,
    /// Join emitted, waiting for the initial history push.
    Connecting,
    Joined,
    Left,
}

/// What an operation or inbound event did to the room.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoomUpdate {
    /// Nothing changed (event for another room, wrong phase, stale reply).
    Ignored,
    /// Channel (re)connected.
    Connected,
    /// Initial history replaced the window.
    HistoryLoaded { count: usize },
    /// A live message was appended.
    Appended(ChatMessage),
    /// A live message repeated an id already held.
    Duplicate,
    /// An older page was put in front; `exhausted` means no further
    /// backfill will be requested.
    Prepended { count: usize, exhausted: bool },
    /// The backfill cursor reached the beginning of the room.
    OlderExhausted,
    /// A backfill request failed or timed out; retry is allowed.
    OlderFailed,
    ViewerCount(u64),
    Notification(Option<String>),
    ConnectionLost { reason: String },
    ConnectRejected { message: String },
}

#[derive(Clone, Debug)]
pub struct RoomSession {
    stream_id: String,
    page_size: usize,
    phase: RoomPhase,
    has_more_older: bool,
    is_loading_older: bool,
    window: MessageWindow,
    viewer_count: Option<u64>,
}

impl RoomSession {
    #[must_use]
    pub fn new(stream_id: impl Into<String>, page_size: usize) -> Self {
        Self {
            stream_id: stream_id.into(),
            page_size: page_size.max(1),
            phase: RoomPhase::Disconnected,
            has_more_older: false,
            is_loading_older: false,
            window: MessageWindow::default(),
            viewer_count: None,
        }
    }

    #[must_use]
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    #[must_use]
    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    #[must_use]
    pub fn has_more_older(&self) -> bool {
        self.has_more_older
    }

    #[must_use]
    pub fn is_loading_older(&self) -> bool {
        self.is_loading_older
    }

    #[must_use]
    pub fn window(&self) -> &MessageWindow {
        &self.window
    }

    #[must_use]
    pub fn viewer_count(&self) -> Option<u64> {
        self.viewer_count
    }

    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.phase == RoomPhase::Joined
    }

    /// Request enrollment. Returns `None` while already joining or joined,
    /// so repeated calls never double the server-side membership.
    pub fn begin_join(&mut self) -> Option<OutboundEvent> {
        match self.phase {
            RoomPhase::Connecting | RoomPhase::Joined => None,
            RoomPhase::Disconnected | RoomPhase::Left => {
                self.phase = RoomPhase::Connecting;
                Some(OutboundEvent::JoinStreamRoom { stream_id: self.stream_id.clone() })
            }
        }
    }

    /// Roll back a join whose event never reached the server.
    pub fn join_failed(&mut self) {
        if self.phase == RoomPhase::Connecting {
            self.phase = RoomPhase::Disconnected;
        }
    }

    /// Fill an empty window from the REST history endpoint. Never
    /// overwrites messages already delivered by the channel.
    pub fn fill_history(&mut self, messages: Vec<ChatMessage>) -> RoomUpdate {
        if !self.window.is_empty() || self.phase == RoomPhase::Left {
            return RoomUpdate::Ignored;
        }
        self.has_more_older = messages.len() >= self.page_size;
        self.window.replace(messages);
        RoomUpdate::HistoryLoaded { count: self.window.len() }
    }

    /// Leave the room and discard local state. Returns the event to emit if
    /// the server still considers us a member.
    pub fn leave(&mut self) -> Option<OutboundEvent> {
        let was_member = matches!(self.phase, RoomPhase::Connecting | RoomPhase::Joined);
        self.phase = RoomPhase::Left;
        self.window.clear();
        self.has_more_older = false;
        self.is_loading_older = false;
        self.viewer_count = None;
        was_member.then(|| OutboundEvent::LeaveStreamRoom { stream_id: self.stream_id.clone() })
    }

    /// Start a backfill. No-op unless joined, connected, idle, not
    /// exhausted, and holding at least one message to use as the cursor.
    pub fn load_older(&mut self, connected: bool) -> Option<OutboundEvent> {
        if self.is_loading_older || !self.has_more_older || !connected || !self.is_joined() {
            return None;
        }
        let before_timestamp = self.window.oldest()?.created_at;
        self.is_loading_older = true;
        Some(OutboundEvent::GetOlderMessages { stream_id: self.stream_id.clone(), before_timestamp })
    }

    /// Clear a pending backfill after a transport failure or timeout.
    /// `has_more_older` is left alone so the user can retry.
    pub fn older_failed(&mut self) -> RoomUpdate {
        if !self.is_loading_older {
            return RoomUpdate::Ignored;
        }
        self.is_loading_older = false;
        RoomUpdate::OlderFailed
    }

    /// Build a chat message event. `None` when the body is blank or the
    /// room cannot accept messages right now.
    #[must_use]
    pub fn compose(&self, connected: bool, body: &str) -> Option<OutboundEvent> {
        let body = body.trim();
        if body.is_empty() || !connected || !self.is_joined() {
            return None;
        }
        Some(OutboundEvent::ChatMessage { stream_id: self.stream_id.clone(), message: body.to_owned() })
    }

    /// Apply one inbound event.
    pub fn apply(&mut self, event: InboundEvent) -> RoomUpdate {
        match event {
            InboundEvent::RecentChatHistory { messages } => self.apply_recent_history(messages),
            InboundEvent::NewMessage { message } => self.apply_new_message(message),
            InboundEvent::OlderChatHistory { messages } => self.apply_older_history(messages),
            InboundEvent::ViewerCountUpdated { stream_id, count } => {
                if stream_id != self.stream_id {
                    return RoomUpdate::Ignored;
                }
                self.viewer_count = Some(count);
                RoomUpdate::ViewerCount(count)
            }
            InboundEvent::NewNotification { message } => RoomUpdate::Notification(message),
            InboundEvent::Connect => RoomUpdate::Connected,
            InboundEvent::Disconnect { reason } => {
                self.connection_lost();
                RoomUpdate::ConnectionLost { reason }
            }
            // May arrive on a live channel, so membership is left to the
            // owner, who knows whether the transport is still up.
            InboundEvent::ConnectError { message } => RoomUpdate::ConnectRejected { message },
        }
    }

    fn apply_recent_history(&mut self, messages: Vec<ChatMessage>) -> RoomUpdate {
        if !matches!(self.phase, RoomPhase::Connecting | RoomPhase::Joined) {
            return RoomUpdate::Ignored;
        }
        self.has_more_older = messages.len() >= self.page_size;
        self.is_loading_older = false;
        self.window.replace(messages);
        self.phase = RoomPhase::Joined;
        RoomUpdate::HistoryLoaded { count: self.window.len() }
    }

    fn apply_new_message(&mut self, message: ChatMessage) -> RoomUpdate {
        if !self.is_joined() {
            return RoomUpdate::Ignored;
        }
        if self.window.append(message.clone()) {
            RoomUpdate::Appended(message)
        } else {
            RoomUpdate::Duplicate
        }
    }

    fn apply_older_history(&mut self, messages: Vec<ChatMessage>) -> RoomUpdate {
        if !self.is_loading_older || !self.is_joined() {
            return RoomUpdate::Ignored;
        }
        self.is_loading_older = false;
        if messages.is_empty() {
            self.has_more_older = false;
            return RoomUpdate::OlderExhausted;
        }
        self.has_more_older = messages.len() >= self.page_size;
        let count = self.window.prepend(messages);
        RoomUpdate::Prepended { count, exhausted: !self.has_more_older }
    }

    /// The channel went down: the server no longer counts this client as
    /// a member and any pending backfill will not be answered.
    pub fn connection_lost(&mut self) {
        if matches!(self.phase, RoomPhase::Connecting | RoomPhase::Joined) {
            self.phase = RoomPhase::Disconnected;
        }
        self.is_loading_older = false;
    }
}
