//! Client-side state modules.
//!
//! DESIGN
//! ======
//! State is split by concern (`auth`, `room`, `scroll`, `window`) so each
//! piece can be driven and tested without a network or a renderer.

pub mod auth;
pub mod room;
pub mod scroll;
pub mod window;
