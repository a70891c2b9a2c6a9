//! # Gateway - Client Sessions and Transport
//!
//! Everything between a WebSocket frame and a lobby engine:
//!
//! - [`protocol`] - JSON wire messages in both directions
//! - [`commands`] - slash commands typed into chat
//! - [`roles`] - GM and lock policy per action
//! - [`rate_limit`] - per-connection message budget
//! - [`session`] - per-connection state
//! - [`hub`] - the single task that applies messages to lobbies
//! - [`http`] - axum routes and the WebSocket pump

// Security-relevant events (refusals, kicks, bans, password changes) go to
// the `security` log target so they can be routed to their own file.
macro_rules! sec_log {
    ($($arg:tt)*) => { log::warn!(target: "security", $($arg)*) };
}
pub(crate) use sec_log;

pub mod commands;
pub mod http;
pub mod hub;
pub mod protocol;
pub mod rate_limit;
pub mod roles;
pub mod session;

pub use http::{router, AppState};
pub use hub::{HubEvent, Outbox, SessionHub};
pub use protocol::{ClientMessage, ServerMessage};
