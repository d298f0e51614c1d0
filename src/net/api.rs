//! REST API client.
//!
//! Every call that carries the session token goes through
//! `send_authenticated`, which owns the 401 cascade: the first caller to see
//! a 401 for the current token expires the session, raises one notice, and
//! asks the host for one redirect to login. Concurrent losers only get
//! `ClientError::Unauthorized`.
//!
//! ERROR HANDLING
//! ==============
//! Methods return `Result` and never panic. Login failures are `Rejected`
//! with the server's reason; they never trigger the cascade because the
//! login call is not authenticated.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use std::sync::Arc;

use events::ChatMessage;
use reqwest::StatusCode;

use super::types::{ErrorBody, LoginResponse, MessagesBody, User};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::state::auth::AuthStore;
use crate::ui::{Notice, UiEvents};

fn chat_messages_path(stream_id: &str) -> String {
    format!("/chat/{stream_id}/messages")
}

fn login_fallback_message(status: u16) -> &'static str {
    match status {
        400 => "invalid login data",
        401 => "wrong username or password",
        500..=599 => "server error, try again later",
        _ => "login failed",
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    auth: Arc<AuthStore>,
    ui: UiEvents,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(config: Arc<ClientConfig>, auth: Arc<AuthStore>, ui: UiEvents) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config, auth, ui })
    }

    /// Exchange credentials for a token via `POST /users/login` and install
    /// the session.
    ///
    /// # Errors
    ///
    /// [`ClientError::Rejected`] for 4xx/5xx answers (carrying the server's
    /// reason), [`ClientError::Http`] for transport failures.
    pub async fn login(&self, username: &str, password: &str) -> Result<User, ClientError> {
        let url = self.config.api_endpoint("/users/login");
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body: LoginResponse = response.json().await?;
            tracing::info!(user_id = %body.user.id, "logged in");
            self.auth.set_auth(body.token, body.user.clone());
            return Ok(body.user);
        }

        let body = response.json::<ErrorBody>().await.unwrap_or_default();
        let status = status.as_u16();
        Err(ClientError::Rejected { status, message: body.summary(login_fallback_message(status)) })
    }

    /// `POST /users/logout`, then drop the session no matter what the server
    /// said and send the host back to login.
    ///
    /// # Errors
    ///
    /// Returns the server/transport error, after the session is cleared.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = self.post_logout().await;
        match &result {
            Ok(message) => self.ui.info(message.clone()),
            Err(e) => {
                tracing::warn!(error = %e, "logout request failed");
                self.ui.error("Could not log out cleanly; the token may already have expired.");
            }
        }
        if self.auth.clear_auth() {
            self.ui.redirect_to_login();
        }
        result.map(|_| ())
    }

    async fn post_logout(&self) -> Result<String, ClientError> {
        let request = self.http.post(self.config.api_endpoint("/users/logout"));
        let response = self.send_authenticated(request).await?;
        let body = response.json::<ErrorBody>().await.unwrap_or_default();
        Ok(body.message.unwrap_or_else(|| "Logged out.".to_owned()))
    }

    /// `GET /users/me`.
    ///
    /// # Errors
    ///
    /// [`ClientError::Unauthorized`] when the token was rejected, otherwise
    /// transport or decode errors.
    pub async fn fetch_me(&self) -> Result<User, ClientError> {
        let request = self.http.get(self.config.api_endpoint("/users/me"));
        let response = self.send_authenticated(request).await?;
        Ok(response.json::<User>().await?)
    }

    /// Check a rehydrated token against the server. A valid answer refreshes
    /// the cached user; anything else drops the session.
    pub async fn verify_session(&self) -> Option<User> {
        self.auth.token()?;
        match self.fetch_me().await {
            Ok(user) => {
                self.auth.set_user(user.clone());
                Some(user)
            }
            Err(ClientError::Unauthorized) => None,
            Err(e) => {
                tracing::warn!(error = %e, "session verification failed; clearing session");
                self.auth.clear_auth();
                None
            }
        }
    }

    /// `GET /chat/{streamId}/messages`: history for the REST fallback and
    /// for VOD chat replay.
    ///
    /// # Errors
    ///
    /// Transport, status, and decode errors.
    pub async fn fetch_stream_messages(&self, stream_id: &str) -> Result<Vec<ChatMessage>, ClientError> {
        let request = self.http.get(self.config.api_endpoint(&chat_messages_path(stream_id)));
        let response = self.send_authenticated(request).await?;
        let body: MessagesBody = response.json().await?;
        Ok(body.into_messages())
    }

    async fn send_authenticated(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let token = self.auth.token();
        let request = match &token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED
            && let Some(token) = token
        {
            self.handle_unauthorized(&token);
            return Err(ClientError::Unauthorized);
        }
        if !status.is_success() {
            return Err(ClientError::Status { status: status.as_u16() });
        }
        Ok(response)
    }

    fn handle_unauthorized(&self, token: &str) {
        if self.auth.expire_if_current(token) {
            tracing::warn!("authenticated request rejected with 401; session expired");
            self.ui.notice(Notice::SessionExpired);
            self.ui.redirect_to_login();
        }
    }
}
