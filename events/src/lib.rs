//! Shared event model and JSON codec for the realtime chat channel.
//!
//! This crate owns the wire representation of every event the chat client
//! consumes or emits. Each direction is a single discriminated union so
//! dispatch code matches exhaustively instead of registering handlers by
//! event-name strings.
//!
//! WIRE FORMAT
//! ===========
//! One JSON text message per event:
//! `{"event": "<snake_case name>", "data": { <camelCase fields> }}`.
//! Unit events (`connect`) omit `data`.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

/// Error returned by [`decode_event`] and [`encode_event`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text was not a valid event envelope (bad JSON, unknown event, or
    /// a payload that does not match the event's schema).
    #[error("failed to decode event: {0}")]
    Decode(#[source] serde_json::Error),
    /// The event could not be serialized.
    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A single chat message. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Unique within a stream's message set.
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub id: String,
    /// Display name of the sender.
    pub author_name: String,
    /// Message text. Older backends send this as `content`.
    #[serde(alias = "content")]
    pub body: String,
    /// Server-side creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Events received from the realtime channel.
///
/// `Connect`, `Disconnect` and `ConnectError` describe the transport itself;
/// the connection handle synthesizes them locally, and the server may also
/// push `connect_error` to reject credentials.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum InboundEvent {
    /// Initial history page pushed after `join_stream_room`.
    RecentChatHistory { messages: Vec<ChatMessage> },
    /// One live message.
    NewMessage { message: ChatMessage },
    /// Reply to `get_older_messages`.
    OlderChatHistory { messages: Vec<ChatMessage> },
    ViewerCountUpdated {
        #[serde(deserialize_with = "deserialize_string_or_number")]
        stream_id: String,
        count: u64,
    },
    NewNotification {
        #[serde(default)]
        message: Option<String>,
    },
    Connect,
    Disconnect {
        #[serde(default)]
        reason: String,
    },
    ConnectError { message: String },
}

impl InboundEvent {
    /// Wire name of the event, for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RecentChatHistory { .. } => "recent_chat_history",
            Self::NewMessage { .. } => "new_message",
            Self::OlderChatHistory { .. } => "older_chat_history",
            Self::ViewerCountUpdated { .. } => "viewer_count_updated",
            Self::NewNotification { .. } => "new_notification",
            Self::Connect => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::ConnectError { .. } => "connect_error",
        }
    }
}

/// Events emitted to the realtime channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OutboundEvent {
    JoinStreamRoom { stream_id: String },
    LeaveStreamRoom { stream_id: String },
    ChatMessage { stream_id: String, message: String },
    /// Backfill request; the server answers with `older_chat_history`
    /// containing messages strictly older than `before_timestamp`.
    GetOlderMessages {
        stream_id: String,
        #[serde(with = "time::serde::rfc3339")]
        before_timestamp: OffsetDateTime,
    },
    JoinNotificationRoom { user_id: String },
}

impl OutboundEvent {
    /// Wire name of the event, for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinStreamRoom { .. } => "join_stream_room",
            Self::LeaveStreamRoom { .. } => "leave_stream_room",
            Self::ChatMessage { .. } => "chat_message",
            Self::GetOlderMessages { .. } => "get_older_messages",
            Self::JoinNotificationRoom { .. } => "join_notification_room",
        }
    }
}

/// Decode one inbound text message.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed JSON, unknown event names, and
/// payloads that do not match the event schema.
pub fn decode_event(text: &str) -> Result<InboundEvent, CodecError> {
    serde_json::from_str(text).map_err(CodecError::Decode)
}

/// Encode one outbound event as a JSON text message.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode_event(event: &OutboundEvent) -> Result<String, CodecError> {
    serde_json::to_string(event).map_err(CodecError::Encode)
}

/// Accept identifiers sent either as JSON strings or as integers.
///
/// # Errors
///
/// Fails for any other JSON type.
pub fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("expected string or number id, got {other}"))),
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
