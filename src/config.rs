//! Client configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ClientError;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_API_PREFIX: &str = "/api";
pub const DEFAULT_SOCKET_PATH: &str = "/app/ws";
pub const DEFAULT_HISTORY_PAGE_SIZE: usize = 50;
pub const DEFAULT_OLDER_PAGE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RECONNECT_INITIAL_MS: u64 = 1_000;
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 10_000;
pub const DEFAULT_RECONNECT_JITTER: f64 = 0.2;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SESSION_FILE_NAME: &str = ".streamchat/session.json";

/// Exponential reconnect policy for the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// Fraction of each delay that is randomized away, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(DEFAULT_RECONNECT_INITIAL_MS),
            max: Duration::from_millis(DEFAULT_RECONNECT_MAX_MS),
            jitter: DEFAULT_RECONNECT_JITTER,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Backend origin, without trailing slash.
    pub api_url: String,
    pub api_prefix: String,
    pub socket_path: String,
    pub history_page_size: usize,
    pub older_page_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub request_timeout: Duration,
    pub session_file: PathBuf,
}

impl ClientConfig {
    /// Build typed config from environment variables.
    ///
    /// All optional:
    /// - `STREAMCHAT_API_URL`: backend origin, default `http://localhost:8000`
    /// - `STREAMCHAT_API_PREFIX`: REST prefix, default `/api`
    /// - `STREAMCHAT_SOCKET_PATH`: websocket path, default `/app/ws`
    /// - `STREAMCHAT_HISTORY_PAGE_SIZE`: default 50
    /// - `STREAMCHAT_OLDER_PAGE_TIMEOUT_MS`: default 10000
    /// - `STREAMCHAT_RECONNECT_INITIAL_MS`: default 1000
    /// - `STREAMCHAT_RECONNECT_MAX_MS`: default 10000
    /// - `STREAMCHAT_REQUEST_TIMEOUT_SECS`: default 30
    /// - `STREAMCHAT_SESSION_FILE`: default `$HOME/.streamchat/session.json`
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidBaseUrl`] for a non-http(s) origin and
    /// [`ClientError::InvalidConfig`] for unparsable numbers.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an injectable variable source.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("STREAMCHAT_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(ClientError::InvalidBaseUrl(api_url));
        }

        let api_prefix = normalize_path(lookup("STREAMCHAT_API_PREFIX").as_deref().unwrap_or(DEFAULT_API_PREFIX));
        let socket_path = normalize_path(lookup("STREAMCHAT_SOCKET_PATH").as_deref().unwrap_or(DEFAULT_SOCKET_PATH));

        let history_page_size = parse_or(&lookup, "STREAMCHAT_HISTORY_PAGE_SIZE", DEFAULT_HISTORY_PAGE_SIZE)?;
        if history_page_size == 0 {
            return Err(ClientError::InvalidConfig { key: "STREAMCHAT_HISTORY_PAGE_SIZE", value: "0".to_owned() });
        }

        let reconnect = ReconnectPolicy {
            initial: Duration::from_millis(parse_or(&lookup, "STREAMCHAT_RECONNECT_INITIAL_MS", DEFAULT_RECONNECT_INITIAL_MS)?),
            max: Duration::from_millis(parse_or(&lookup, "STREAMCHAT_RECONNECT_MAX_MS", DEFAULT_RECONNECT_MAX_MS)?),
            jitter: DEFAULT_RECONNECT_JITTER,
        };

        let session_file = lookup("STREAMCHAT_SESSION_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_session_file(lookup("HOME")));

        Ok(Self {
            api_url,
            api_prefix,
            socket_path,
            history_page_size,
            older_page_timeout: Duration::from_millis(parse_or(
                &lookup,
                "STREAMCHAT_OLDER_PAGE_TIMEOUT_MS",
                DEFAULT_OLDER_PAGE_TIMEOUT_MS,
            )?),
            reconnect,
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "STREAMCHAT_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            session_file,
        })
    }

    /// Default config pointed at `api_url`. Used by tests and embedders that
    /// do not read the environment.
    #[must_use]
    pub fn for_origin(api_url: &str) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_owned(),
            api_prefix: DEFAULT_API_PREFIX.to_owned(),
            socket_path: DEFAULT_SOCKET_PATH.to_owned(),
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
            older_page_timeout: Duration::from_millis(DEFAULT_OLDER_PAGE_TIMEOUT_MS),
            reconnect: ReconnectPolicy::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            session_file: default_session_file(None),
        }
    }

    /// Absolute REST URL for `path` (which starts with `/`).
    #[must_use]
    pub fn api_endpoint(&self, path: &str) -> String {
        format!("{}{}{}", self.api_url, self.api_prefix, path)
    }

    /// Websocket URL derived from the API origin.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidBaseUrl`] if the origin is not http(s).
    pub fn socket_url(&self) -> Result<String, ClientError> {
        if let Some(rest) = self.api_url.strip_prefix("http://") {
            return Ok(format!("ws://{rest}{}", self.socket_path));
        }
        if let Some(rest) = self.api_url.strip_prefix("https://") {
            return Ok(format!("wss://{rest}{}", self.socket_path));
        }
        Err(ClientError::InvalidBaseUrl(self.api_url.clone()))
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ClientError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ClientError::InvalidConfig { key, value: raw }),
    }
}

fn normalize_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}

fn default_session_file(home: Option<String>) -> PathBuf {
    match home {
        Some(home) if !home.is_empty() => PathBuf::from(home).join(DEFAULT_SESSION_FILE_NAME),
        _ => PathBuf::from(DEFAULT_SESSION_FILE_NAME),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
