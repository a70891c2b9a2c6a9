//! Test utilities & fixtures.
//! A [Table] drives a [SessionHub] synchronously: each numbered seat is one
//! connection with its own outbox, drained with [Table::drain].
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use argon2::Params;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use tokio::sync::mpsc::{self, UnboundedReceiver};

use tavernkeep::catalog::CampaignCatalog;
use tavernkeep::config::Config;
use tavernkeep::gateway::{HubEvent, ServerMessage, SessionHub};
use tavernkeep::lobby::registry::lock;
use tavernkeep::lobby::{ConnectionId, CredentialGate, Lobby, LobbyRegistry};
use tavernkeep::storage::MirrorHandle;

/// Cheap Argon2 parameters so password tests stay fast.
pub fn fast_gate() -> CredentialGate {
    CredentialGate::with_params(Params::new(8, 1, 1, None).expect("params"))
}

/// Defaults with rate limiting off.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.rate_limit.enabled = false;
    config
}

pub struct Table {
    pub hub: SessionHub,
    seats: HashMap<u64, UnboundedReceiver<ServerMessage>>,
}

impl Table {
    pub fn new() -> Self {
        Self::build(test_config(), None)
    }

    pub fn build(config: Config, mirror: Option<MirrorHandle>) -> Self {
        let hub = SessionHub::new(
            &config,
            Arc::new(LobbyRegistry::new(config.lobby.defaults())),
            Arc::new(CampaignCatalog::builtin()),
            fast_gate(),
            mirror,
        )
        .with_rng(StdRng::seed_from_u64(42));
        Table { hub, seats: HashMap::new() }
    }

    pub fn connect(&mut self, seat: u64) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.hub.handle(HubEvent::Connected { id: ConnectionId(seat), tx });
        self.seats.insert(seat, rx);
    }

    pub fn send(&mut self, seat: u64, msg: Value) {
        self.hub.handle(HubEvent::Inbound { id: ConnectionId(seat), text: msg.to_string() });
    }

    pub fn chat(&mut self, seat: u64, text: &str) {
        self.send(seat, json!({"type": "chat", "text": text}));
    }

    /// Connect, identify and join in one go; the seat's outbox is left empty.
    pub fn sit(&mut self, seat: u64, name: &str, lobby: &str) {
        self.connect(seat);
        self.send(seat, json!({"type": "identify", "name": name}));
        self.send(seat, json!({"type": "join_lobby", "lobby": lobby}));
        self.drain_all();
    }

    pub fn disconnect(&mut self, seat: u64) {
        self.hub.handle(HubEvent::Disconnected { id: ConnectionId(seat) });
    }

    pub fn drain(&mut self, seat: u64) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        if let Some(rx) = self.seats.get_mut(&seat) {
            while let Ok(m) = rx.try_recv() {
                out.push(m);
            }
        }
        out
    }

    pub fn drain_all(&mut self) {
        let seats: Vec<u64> = self.seats.keys().copied().collect();
        for s in seats {
            self.drain(s);
        }
    }

    /// Run `f` against the named lobby under its lock.
    pub fn with_lobby<T>(&self, name: &str, f: impl FnOnce(&Lobby) -> T) -> T {
        let shared = self.hub.registry().get(name).expect("lobby exists");
        let guard = lock(&shared);
        f(&guard)
    }
}

pub fn kinds(msgs: &[ServerMessage]) -> Vec<&'static str> {
    msgs.iter().map(|m| m.kind()).collect()
}

/// `(code, text)` of every error in `msgs`.
pub fn errors(msgs: &[ServerMessage]) -> Vec<(String, String)> {
    msgs.iter()
        .filter_map(|m| match m {
            ServerMessage::ErrorMessage { text, code } => Some((code.clone(), text.clone())),
            _ => None,
        })
        .collect()
}

pub fn error_code(msgs: &[ServerMessage]) -> Option<String> {
    errors(msgs).into_iter().next().map(|(code, _)| code)
}

pub fn system_texts(msgs: &[ServerMessage]) -> Vec<String> {
    msgs.iter()
        .filter_map(|m| match m {
            ServerMessage::System { text } => Some(text.clone()),
            _ => None,
        })
        .collect()
}
