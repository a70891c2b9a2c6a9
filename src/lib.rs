//! # Tavernkeep - Real-time Tabletop Lobby Server
//!
//! Tavernkeep hosts shared tabletop sessions over WebSockets. Players join a
//! named lobby; the first one in becomes its Game Master. Everyone in a lobby
//! shares chat, dice rolls, character sheets, a grid map with tokens, an
//! initiative tracker and a branching campaign whose scene choices advance
//! only once every player has approved them.
//!
//! ## Features
//!
//! - **Dice**: `NdS+M`, `adv`/`dis`, keep-highest/lowest, per-player macros
//! - **Lobbies**: created on first join, optional Argon2id password, bans and kicks
//! - **Map**: walls, owned tokens, pings, collision-checked moves
//! - **Encounters**: initiative order with a turn pointer that survives edits
//! - **Campaigns**: scenes, choices, handouts, quests, notes and a consent vote
//! - **Slash commands**: `/me`, `/w`, `/r`, `/macro`, GM moderation and story control
//! - **Mirror**: optional sled copy of chat, rolls and lobby metadata
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tavernkeep::catalog::CampaignCatalog;
//! use tavernkeep::config::Config;
//! use tavernkeep::gateway::{router, AppState, SessionHub};
//! use tavernkeep::lobby::{CredentialGate, LobbyRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let registry = Arc::new(LobbyRegistry::new(config.lobby.defaults()));
//!     let catalog = Arc::new(CampaignCatalog::builtin());
//!     let gate = CredentialGate::from_config(config.argon2())?;
//!     let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
//!     let hub = SessionHub::new(&config, registry.clone(), catalog.clone(), gate, None);
//!     tokio::spawn(hub.run(rx));
//!     let app = router(AppState::new(registry, catalog, tx));
//!     let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`gateway`] - WebSocket transport, wire protocol, commands and the session hub
//! - [`lobby`] - lobby state and the engines that mutate it
//! - [`dice`] - dice expression parsing and rolling
//! - [`catalog`] - built-in and on-disk campaign definitions
//! - [`storage`] - the optional sled mirror
//! - [`config`] - configuration loading and validation
//! - [`validation`] - input cleaning helpers
//! - [`error`] - the per-action error type reported to clients
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  axum /ws       │ ← one reader + one writer task per socket
//! └─────────────────┘
//!          │ HubEvent
//! ┌─────────────────┐
//! │  Session Hub    │ ← decode, authorize, dispatch, broadcast
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  Lobby engines  │ ← membership, map, encounter, campaign, sheets
//! └─────────────────┘
//!          │ (best effort)
//! ┌─────────────────┐
//! │  sled mirror    │
//! └─────────────────┘
//! ```

pub mod catalog;
pub mod config;
pub mod dice;
pub mod error;
pub mod gateway;
pub mod lobby;
pub mod logutil;
pub mod metrics;
pub mod storage;
pub mod validation;
