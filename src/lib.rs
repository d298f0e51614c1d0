//! # streamchat
//!
//! Headless client core for a livestream platform's chat: authentication
//! session, REST calls, and the realtime room protocol (join, history,
//! backfill on scroll, live append, reconnect).
//!
//! The crate never renders. Hosts drive a [`pane::ChatPane`] with scroll and
//! render callbacks and receive toasts and navigation requests through
//! [`ui::UiEvents`].
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`app`] | Root composition: auth store, API client, token-keyed connection |
//! | [`pane`] | Async driver for one open chat room |
//! | [`state`] | Pure state: auth session, message window, room machine, scroll |
//! | [`net`] | REST client, realtime connection, reconnect backoff, DTOs |
//! | [`storage`] | Persisted session slot |
//! | [`config`] | Environment-driven configuration |
//! | [`ui`] | Notices and redirects for the host |
//! | [`error`] | Crate-wide error type |

pub mod app;
pub mod config;
pub mod error;
pub mod net;
pub mod pane;
pub mod state;
pub mod storage;
pub mod ui;

pub use app::App;
pub use config::ClientConfig;
pub use error::ClientError;
pub use events::{ChatMessage, InboundEvent, OutboundEvent};
pub use pane::ChatPane;
