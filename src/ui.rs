//! Signals from the client core to whatever renders it.
//!
//! SYSTEM CONTEXT
//! ==============
//! The core never draws. Transient notices (toasts) and navigation requests
//! are pushed down one channel; the host decides how to show them.

#[cfg(test)]
#[path = "ui_test.rs"]
mod ui_test;

use tokio::sync::mpsc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Why the host is being told something.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// An authenticated call was rejected with 401.
    SessionExpired,
    /// The realtime channel refused the token.
    SocketAuthFailed,
    /// Server-pushed notification text.
    Notification(String),
    /// Free-form message from a completed action.
    Message { level: NoticeLevel, text: String },
}

impl Notice {
    #[must_use]
    pub fn level(&self) -> NoticeLevel {
        match self {
            Self::SessionExpired | Self::SocketAuthFailed => NoticeLevel::Error,
            Self::Notification(_) => NoticeLevel::Info,
            Self::Message { level, .. } => *level,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::SessionExpired => "Your session has expired. Please log in again.",
            Self::SocketAuthFailed => "Socket authentication failed. Please log in again.",
            Self::Notification(text) | Self::Message { text, .. } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UiEvent {
    Notice(Notice),
    RedirectToLogin,
}

/// Cloneable sender half handed to every component that may notify the host.
///
/// Sends never fail from the caller's point of view: a host that dropped its
/// receiver simply stops seeing events.
#[derive(Clone, Debug)]
pub struct UiEvents {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl UiEvents {
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn notice(&self, notice: Notice) {
        let _ = self.tx.send(UiEvent::Notice(notice));
    }

    pub fn info(&self, text: impl Into<String>) {
        self.notice(Notice::Message { level: NoticeLevel::Info, text: text.into() });
    }

    pub fn error(&self, text: impl Into<String>) {
        self.notice(Notice::Message { level: NoticeLevel::Error, text: text.into() });
    }

    pub fn redirect_to_login(&self) {
        let _ = self.tx.send(UiEvent::RedirectToLogin);
    }
}
