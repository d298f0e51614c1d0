//! Crate-wide error type.

use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("invalid value for {key}: {value:?}")]
    InvalidConfig { key: &'static str, value: String },
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// An authenticated call was answered with 401. The session has been
    /// expired by the time the caller sees this.
    #[error("session expired; log in again")]
    Unauthorized,
    /// The server refused the request with a user-facing reason.
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("server returned HTTP {status}")]
    Status { status: u16 },
    #[error("websocket error: {0}")]
    Ws(Box<tungstenite::Error>),
    #[error("event codec failed: {0}")]
    Codec(#[from] events::CodecError),
    #[error("realtime channel is not connected")]
    NotConnected,
    #[error("realtime channel rejected the credentials")]
    SocketAuth,
    #[error("auth token is not a valid header value")]
    InvalidToken,
    #[error("session storage failed: {0}")]
    Storage(#[from] std::io::Error),
    #[error("session could not be encoded: {0}")]
    Json(#[source] serde_json::Error),
    #[error("operation cancelled")]
    Cancelled,
}

impl From<tungstenite::Error> for ClientError {
    fn from(error: tungstenite::Error) -> Self {
        Self::Ws(Box::new(error))
    }
}
