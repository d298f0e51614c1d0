//! REST DTOs for the client/server boundary.
//!
//! DESIGN
//! ======
//! Realtime events live in the `events` crate; these are the shapes returned
//! by plain HTTP endpoints. Identifier fields accept numbers or strings since
//! the backend serializes database ids as integers.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use events::{ChatMessage, deserialize_string_or_number};
use serde::{Deserialize, Serialize};

/// The authenticated user as returned by `/users/me` and `/users/login`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl User {
    /// Name to show in notices and prompts.
    #[must_use]
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// Body of a successful `POST /users/login`.
#[derive(Clone, Debug, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

/// `GET /chat/{streamId}/messages` is served either as a bare array or
/// wrapped in `{ "messages": [...] }` depending on backend version.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum MessagesBody {
    Flat(Vec<ChatMessage>),
    Wrapped { messages: Vec<ChatMessage> },
}

impl MessagesBody {
    #[must_use]
    pub fn into_messages(self) -> Vec<ChatMessage> {
        match self {
            Self::Flat(messages) | Self::Wrapped { messages } => messages,
        }
    }
}

/// A 400 response from a form endpoint.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub errors: Vec<FieldError>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FieldError {
    pub path: String,
    pub msg: String,
}

impl ErrorBody {
    /// Collapse the body into one user-facing sentence, falling back to
    /// `fallback` when the server gave no reason.
    #[must_use]
    pub fn summary(&self, fallback: &str) -> String {
        if !self.errors.is_empty() {
            return self
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.path, e.msg))
                .collect::<Vec<_>>()
                .join("; ");
        }
        self.error
            .as_deref()
            .or(self.message.as_deref())
            .unwrap_or(fallback)
            .to_owned()
    }
}
