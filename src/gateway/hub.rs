//! # Session Hub - Lobby Traffic Controller
//!
//! The hub owns every open connection and turns inbound client messages into
//! lobby mutations and outbound broadcasts. It runs as a single task fed by a
//! channel of [HubEvent]s; the transport layer only ever produces events and
//! drains per-connection outboxes.
//!
//! ## Message Flow
//!
//! 1. The transport registers a connection with [HubEvent::Connected]
//! 2. Each text frame arrives as [HubEvent::Inbound] and is rate limited
//! 3. The frame is decoded into a [ClientMessage] and, inside a lobby,
//!    checked against [authorize] once
//! 4. The handler mutates the lobby while holding its lock, then broadcasts
//!    before releasing it, so every member sees the same order of events
//! 5. Failures go back to the sender as `error_message` and nothing else
//!
//! [HubEvent::Disconnected] removes the member from their lobby, which may
//! complete a pending scene choice.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;

use super::commands;
use super::protocol::{
    CampaignView, ChoiceRequestedView, ClientMessage, JoinedView, ServerMessage, StateView,
};
use super::rate_limit::RateLimiter;
use super::roles::{authorize, Action};
use super::sec_log;
use super::session::ConnectionSession;
use crate::catalog::CampaignCatalog;
use crate::config::{Config, LobbyConfig};
use crate::dice;
use crate::error::SessionError;
use crate::lobby::campaign::{AckOutcome, Commit, RequestOutcome};
use crate::lobby::map::MoveOutcome;
use crate::lobby::membership;
use crate::lobby::registry::lock;
use crate::lobby::{Actor, ChatKind, ConnectionId, CredentialGate, Lobby, LobbyRegistry};
use crate::logutil::{escape_log, lobby_tag};
use crate::metrics;
use crate::storage::MirrorHandle;
use crate::validation::{clean_key, clean_text};

pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

#[derive(Debug)]
pub enum HubEvent {
    Connected { id: ConnectionId, tx: Outbox },
    Inbound { id: ConnectionId, text: String },
    Disconnected { id: ConnectionId },
}

pub(super) struct Connection {
    pub(super) session: ConnectionSession,
    tx: Outbox,
}

/// The member a lobby-scoped handler acts for.
pub(super) struct Caller {
    pub conn: ConnectionId,
    pub name: String,
    pub is_gm: bool,
}

impl Caller {
    pub fn actor(&self) -> Actor<'_> {
        Actor { name: &self.name, is_gm: self.is_gm }
    }
}

pub struct SessionHub {
    pub(super) registry: Arc<LobbyRegistry>,
    pub(super) catalog: Arc<CampaignCatalog>,
    pub(super) gate: CredentialGate,
    pub(super) limits: LobbyConfig,
    pub(super) connections: HashMap<ConnectionId, Connection>,
    limiter: RateLimiter,
    pub(super) mirror: Option<MirrorHandle>,
    pub(super) rng: StdRng,
}

impl SessionHub {
    pub fn new(
        config: &Config,
        registry: Arc<LobbyRegistry>,
        catalog: Arc<CampaignCatalog>,
        gate: CredentialGate,
        mirror: Option<MirrorHandle>,
    ) -> Self {
        SessionHub {
            registry,
            catalog,
            gate,
            limits: config.lobby.clone(),
            connections: HashMap::new(),
            limiter: RateLimiter::new(&config.rate_limit),
            mirror,
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the dice RNG, for reproducible rolls.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn registry(&self) -> &Arc<LobbyRegistry> {
        &self.registry
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn session(&self, id: ConnectionId) -> Option<&ConnectionSession> {
        self.connections.get(&id).map(|c| &c.session)
    }

    /// Consume events until every sender is gone.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<HubEvent>) {
        info!("Session hub started");
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        info!("Session hub stopped ({} connections dropped)", self.connections.len());
    }

    pub fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Connected { id, tx } => {
                metrics::inc_connections_opened();
                debug!("{} connected", id);
                self.connections.insert(id, Connection { session: ConnectionSession::new(id), tx });
                self.send(id, ServerMessage::Lobbies { lobbies: self.registry.names() });
            }
            HubEvent::Inbound { id, text } => self.on_text(id, &text),
            HubEvent::Disconnected { id } => self.on_disconnect(id),
        }
    }

    // ---- outbound -------------------------------------------------------

    pub(super) fn send(&self, id: ConnectionId, msg: ServerMessage) {
        let Some(conn) = self.connections.get(&id) else {
            return;
        };
        let kind = msg.kind();
        if conn.tx.send(msg).is_ok() {
            metrics::inc_outbound();
        } else {
            debug!("Outbox closed for {}; dropped {}", id, kind);
        }
    }

    pub(super) fn broadcast(&self, lobby: &Lobby, msg: ServerMessage) {
        for id in lobby.members.keys() {
            self.send(*id, msg.clone());
        }
    }

    pub(super) fn broadcast_state(&self, lobby: &Lobby) {
        self.broadcast(lobby, ServerMessage::State(StateView::of(lobby)));
    }

    pub(super) fn broadcast_map(&self, lobby: &Lobby) {
        self.broadcast(lobby, ServerMessage::MapState(lobby.map.clone()));
    }

    pub(super) fn broadcast_campaign(&self, lobby: &Lobby) {
        self.broadcast(lobby, ServerMessage::CampaignState(CampaignView::of(lobby)));
    }

    fn announce_lobbies(&self) {
        let lobbies = self.registry.names();
        for id in self.connections.keys() {
            self.send(*id, ServerMessage::Lobbies { lobbies: lobbies.clone() });
        }
    }

    /// Story text from the table itself: logged as a system chat entry.
    pub(super) fn narrate(&self, lobby: &mut Lobby, text: &str) {
        let entry = lobby.push_chat("system", text, ChatKind::System);
        self.broadcast(lobby, ServerMessage::system(text));
        if let Some(m) = &self.mirror {
            m.chat(&entry);
        }
    }

    pub(super) fn post_chat(&self, lobby: &mut Lobby, from: &str, text: &str, kind: ChatKind) {
        let entry = lobby.push_chat(from, text, kind);
        if let Some(m) = &self.mirror {
            m.chat(&entry);
        }
        self.broadcast(lobby, ServerMessage::Chat(entry));
    }

    pub(super) fn mirror_lobby(&self, lobby: &Lobby) {
        if let Some(m) = &self.mirror {
            m.lobby(lobby);
        }
    }

    /// Ask every player without a sheet to make one.
    pub(super) fn require_characters(&self, lobby: &Lobby, reason: &str) {
        for (id, name) in &lobby.members {
            if !lobby.is_gm(name) && !lobby.characters.contains_key(name) {
                self.send(*id, ServerMessage::CharacterRequired { reason: reason.to_string() });
            }
        }
    }

    fn fail(&self, id: ConnectionId, err: SessionError) {
        metrics::inc_client_errors();
        let who = self
            .connections
            .get(&id)
            .map(|c| c.session.label())
            .unwrap_or_else(|| id.to_string());
        match &err {
            SessionError::Unauthorized(_) => sec_log!("Refused {}: {}", escape_log(&who), err),
            _ => debug!("Error for {}: {}", escape_log(&who), err),
        }
        self.send(id, ServerMessage::error(&err));
    }

    // ---- inbound --------------------------------------------------------

    fn on_text(&mut self, id: ConnectionId, text: &str) {
        metrics::inc_inbound();
        let Some(conn) = self.connections.get_mut(&id) else {
            debug!("Message from unknown connection {}", id);
            return;
        };
        conn.session.touch();
        if let Err(retry_after_ms) = self.limiter.check(id) {
            metrics::inc_rate_limited();
            self.fail(id, SessionError::RateExceeded { retry_after_ms });
            return;
        }
        let result = ClientMessage::parse(text).and_then(|msg| self.dispatch(id, msg));
        if let Err(e) = result {
            self.fail(id, e);
        }
    }

    fn dispatch(&mut self, id: ConnectionId, msg: ClientMessage) -> Result<(), SessionError> {
        match msg {
            ClientMessage::Identify { name } => {
                self.identify(id, &name);
                Ok(())
            }
            ClientMessage::JoinLobby { lobby, password } => {
                self.join_lobby(id, &lobby, password.as_deref())
            }
            other => self.in_lobby(id, other),
        }
    }

    fn identify(&mut self, id: ConnectionId, raw: &str) {
        let name = membership::identify(raw, self.limits.max_name_chars);
        let in_lobby = match self.connections.get_mut(&id) {
            Some(conn) => {
                conn.session.name = Some(name.clone());
                conn.session.lobby.is_some()
            }
            None => return,
        };
        debug!("{} identified as {}", id, escape_log(&name));
        self.send(id, ServerMessage::Identified { name });
        if in_lobby {
            self.send(
                id,
                ServerMessage::system("Your new name applies the next time you join a lobby"),
            );
        }
    }

    fn join_lobby(
        &mut self,
        id: ConnectionId,
        raw: &str,
        password: Option<&str>,
    ) -> Result<(), SessionError> {
        let name = clean_text(raw, self.limits.max_lobby_name_chars);
        if name.is_empty() {
            return Err(SessionError::validation("Lobby name is required"));
        }
        let (requested, current) = {
            let conn = self
                .connections
                .get(&id)
                .ok_or_else(|| SessionError::not_found("Unknown connection"))?;
            (conn.session.requested_name().to_string(), conn.session.lobby.clone())
        };
        if current.as_deref() == Some(name.as_str()) {
            return Err(SessionError::validation(format!("You are already in {}", name)));
        }

        let (shared, created) = self.registry.get_or_create(&name);
        let outcome = {
            let mut lobby = lock(&shared);
            match lobby.join(id, &requested, password, &self.gate) {
                Ok(o) => o,
                Err(rejection) => {
                    metrics::inc_join_rejections();
                    sec_log!(
                        "Join refused: {} ({}): {}",
                        lobby_tag(&name, &requested),
                        id,
                        rejection
                    );
                    return Err(rejection.into());
                }
            }
        };

        if let Some(old) = current {
            self.leave_lobby(id, &old, "left the lobby");
        }
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.session.enter(&name, &outcome.name);
        }
        info!(
            "{} joined{}",
            lobby_tag(&name, &outcome.name),
            if outcome.became_gm { " as GM" } else { "" }
        );

        let lobby = lock(&shared);
        self.send(id, ServerMessage::Joined(JoinedView::of(&lobby, &outcome.name)));
        self.send(id, ServerMessage::MapState(lobby.map.clone()));
        self.send(id, ServerMessage::CampaignState(CampaignView::of(&lobby)));
        if outcome.password_established {
            sec_log!("Password established for lobby {} by {}", escape_log(&name), escape_log(&outcome.name));
            self.send(id, ServerMessage::system("Lobby password set"));
        }
        let mut notice = format!("{} joined the lobby", outcome.name);
        if outcome.became_gm {
            notice.push_str(" and is the GM");
        }
        self.broadcast(&lobby, ServerMessage::system(notice));
        self.broadcast_state(&lobby);
        if lobby.settings.campaign_started
            && !outcome.became_gm
            && !lobby.is_gm(&outcome.name)
            && !lobby.characters.contains_key(&outcome.name)
        {
            self.send(
                id,
                ServerMessage::CharacterRequired {
                    reason: "The campaign is under way. Please create your character.".to_string(),
                },
            );
        }
        self.mirror_lobby(&lobby);
        drop(lobby);

        if created {
            self.announce_lobbies();
        }
        Ok(())
    }

    /// Remove `id` from `lobby_name` and tell whoever remains.
    pub(super) fn leave_lobby(&mut self, id: ConnectionId, lobby_name: &str, verb: &str) {
        let Some(shared) = self.registry.get(lobby_name) else {
            return;
        };
        let mut lobby = lock(&shared);
        let Some(name) = lobby.leave(id) else {
            return;
        };
        info!("{} {}", lobby_tag(lobby_name, &name), verb);
        self.after_departure(&mut lobby, &format!("{} {}", name, verb));
    }

    /// Shared tail of leave, kick and ban.
    pub(super) fn after_departure(&self, lobby: &mut Lobby, notice: &str) {
        self.broadcast(lobby, ServerMessage::system(notice));
        if let Some(commit) = lobby.reconsider_consent() {
            self.announce_commit(lobby, &commit);
        }
        self.broadcast_state(lobby);
        self.mirror_lobby(lobby);
    }

    fn on_disconnect(&mut self, id: ConnectionId) {
        metrics::inc_connections_closed();
        self.limiter.forget(id);
        let Some(conn) = self.connections.remove(&id) else {
            return;
        };
        debug!("{} disconnected", escape_log(&conn.session.label()));
        if let Some(lobby) = conn.session.lobby {
            self.leave_lobby(id, &lobby, "left the lobby");
        }
    }

    fn in_lobby(&mut self, id: ConnectionId, msg: ClientMessage) -> Result<(), SessionError> {
        let (lobby_name, member) = self
            .connections
            .get(&id)
            .and_then(|c| Some((c.session.lobby.clone()?, c.session.lobby_name.clone()?)))
            .ok_or_else(|| SessionError::validation("Join a lobby first"))?;
        let shared = self
            .registry
            .get(&lobby_name)
            .ok_or_else(|| SessionError::not_found(format!("Lobby '{}' is gone", lobby_name)))?;
        let mut lobby = lock(&shared);
        let caller = Caller { conn: id, is_gm: lobby.is_gm(&member), name: member };

        if let ClientMessage::Chat { text } = &msg {
            let text = clean_text(text, self.limits.max_message_chars);
            if let Some(parsed) = commands::parse(&text) {
                let command = parsed?;
                authorize(command.action(), caller.is_gm, &lobby.settings)?;
                return self.run_command(&caller, &mut lobby, command);
            }
            authorize(Action::Chat, caller.is_gm, &lobby.settings)?;
            if !text.is_empty() {
                self.post_chat(&mut lobby, &caller.name, &text, ChatKind::Say);
            }
            return Ok(());
        }

        authorize(msg.action(), caller.is_gm, &lobby.settings)?;
        self.lobby_message(&caller, &mut lobby, msg)
    }

    fn lobby_message(
        &mut self,
        caller: &Caller,
        lobby: &mut Lobby,
        msg: ClientMessage,
    ) -> Result<(), SessionError> {
        match msg {
            ClientMessage::Roll { expression } => self.roll_dice(caller, lobby, &expression),
            ClientMessage::CharacterUpsert { sheet } => {
                let sheet = lobby.upsert_character(caller.actor(), &sheet)?;
                debug!("{} saved sheet {}", lobby_tag(&lobby.name, &caller.name), escape_log(&sheet.name));
                self.broadcast_characters(lobby);
                Ok(())
            }
            ClientMessage::CharacterDelete { name } => {
                lobby.delete_character(caller.actor(), &name)?;
                self.broadcast_characters(lobby);
                Ok(())
            }
            ClientMessage::MapRequest => {
                self.send(caller.conn, ServerMessage::MapState(lobby.map.clone()));
                Ok(())
            }
            ClientMessage::MapInit { width, height } => {
                let defaults = self.registry.defaults();
                lobby.map.init(
                    width.unwrap_or(defaults.map_width),
                    height.unwrap_or(defaults.map_height),
                );
                lobby.touch();
                self.broadcast_map(lobby);
                Ok(())
            }
            ClientMessage::MapSet { x, y, blocked } => {
                if lobby.map.set_tile(x, y, blocked) {
                    self.broadcast_map(lobby);
                }
                Ok(())
            }
            ClientMessage::MapClear => {
                lobby.map.clear_walls();
                self.broadcast_map(lobby);
                Ok(())
            }
            ClientMessage::TokenAdd { id, name, color } => {
                lobby.map.add_token(id.as_deref(), &name, &color, &caller.name);
                self.broadcast_map(lobby);
                Ok(())
            }
            ClientMessage::TokenMove { id, x, y } => {
                match lobby.map.move_token(&id, x, y, caller.actor())? {
                    MoveOutcome::Moved { .. } => self.broadcast_map(lobby),
                    MoveOutcome::Blocked => {
                        self.send(caller.conn, ServerMessage::MapState(lobby.map.clone()))
                    }
                }
                Ok(())
            }
            ClientMessage::TokenRemove { id } => {
                lobby.map.remove_token(&id, caller.actor())?;
                self.broadcast_map(lobby);
                Ok(())
            }
            ClientMessage::TokenAssign { id, owner } => {
                let owner = clean_text(&owner, self.limits.max_name_chars);
                if owner.is_empty() {
                    return Err(SessionError::validation("Owner name is required"));
                }
                lobby.map.assign_token(&id, &owner)?;
                self.broadcast_map(lobby);
                Ok(())
            }
            ClientMessage::Ping { x, y } => {
                let x = x.clamp(0, lobby.map.width as i64 - 1);
                let y = y.clamp(0, lobby.map.height as i64 - 1);
                self.broadcast(
                    lobby,
                    ServerMessage::MapPing { x, y, by: caller.name.clone(), ts: Utc::now() },
                );
                Ok(())
            }
            ClientMessage::CampaignLoad { key } => {
                let key = clean_key(&key, 64);
                let catalog = Arc::clone(&self.catalog);
                let definition = catalog
                    .get(&key)
                    .ok_or_else(|| SessionError::not_found(format!("No campaign '{}'", key)))?;
                lobby.load_campaign(definition);
                info!("{} loaded campaign {}", lobby_tag(&lobby.name, &caller.name), key);
                self.broadcast(lobby, ServerMessage::system(format!("The GM loaded \"{}\"", definition.title)));
                self.broadcast_campaign(lobby);
                self.broadcast_state(lobby);
                Ok(())
            }
            ClientMessage::CampaignGet => {
                self.send(caller.conn, ServerMessage::CampaignState(CampaignView::of(lobby)));
                Ok(())
            }
            ClientMessage::CampaignStart => self.start_campaign(caller, lobby),
            ClientMessage::CampaignUpdateMeta { title, summary } => {
                lobby.campaign.update_meta(title.as_deref(), summary.as_deref());
                self.campaign_edited(lobby);
                Ok(())
            }
            ClientMessage::CampaignSceneAdd { title, content } => {
                lobby.campaign.add_scene(&title, &content);
                self.campaign_edited(lobby);
                Ok(())
            }
            ClientMessage::CampaignSceneSet { scene_id } => self.set_scene(lobby, &scene_id),
            ClientMessage::CampaignChoiceAdd { scene_id, text, target } => {
                let (choice, dangling) = lobby.campaign.add_choice(&scene_id, &text, &target)?;
                if dangling {
                    self.send(
                        caller.conn,
                        ServerMessage::system(format!(
                            "Scene '{}' does not exist yet; choice {} will not move the story until it does",
                            choice.target_scene_id, choice.id
                        )),
                    );
                }
                self.campaign_edited(lobby);
                Ok(())
            }
            ClientMessage::CampaignHandoutAdd { title, content } => {
                lobby.campaign.add_handout(&title, &content);
                self.campaign_edited(lobby);
                Ok(())
            }
            ClientMessage::CampaignQuestAdd { title } => {
                lobby.campaign.add_quest(&title)?;
                self.campaign_edited(lobby);
                Ok(())
            }
            ClientMessage::CampaignQuestToggle { id } => {
                lobby.campaign.toggle_quest(&id)?;
                self.campaign_edited(lobby);
                Ok(())
            }
            ClientMessage::CampaignNoteAdd { text } => {
                lobby.campaign.add_note(&caller.name, &text)?;
                self.campaign_edited(lobby);
                Ok(())
            }
            ClientMessage::CampaignChoiceRequest { choice_id } => {
                self.request_choice(caller, lobby, &choice_id)
            }
            ClientMessage::CampaignChoiceAck => {
                match lobby.acknowledge_choice(&caller.name)? {
                    AckOutcome::Unchanged => {
                        self.send(caller.conn, ServerMessage::system("You already approved this choice"))
                    }
                    AckOutcome::Pending { .. } => self.broadcast_campaign(lobby),
                    AckOutcome::Committed(commit) => self.announce_commit(lobby, &commit),
                }
                Ok(())
            }
            ClientMessage::CampaignChoiceForce => self.force_choice(caller, lobby),
            ClientMessage::Identify { .. }
            | ClientMessage::JoinLobby { .. }
            | ClientMessage::Chat { .. } => Ok(()),
        }
    }

    fn broadcast_characters(&self, lobby: &Lobby) {
        self.broadcast(lobby, ServerMessage::Characters { characters: lobby.characters.clone() });
        self.broadcast_state(lobby);
    }

    fn campaign_edited(&self, lobby: &mut Lobby) {
        lobby.touch();
        self.broadcast_campaign(lobby);
    }

    /// Roll `raw` for the caller. A word naming one of their macros rolls the
    /// macro instead.
    pub(super) fn roll_dice(
        &mut self,
        caller: &Caller,
        lobby: &mut Lobby,
        raw: &str,
    ) -> Result<(), SessionError> {
        let key = clean_key(raw, 32);
        let saved = lobby
            .macros
            .get(&caller.name)
            .and_then(|m| m.get(&key))
            .filter(|_| !key.is_empty() && key == raw.trim().to_ascii_lowercase())
            .cloned();
        let (expression, label) = match saved {
            Some(expr) => (expr, Some(key)),
            None => (raw.to_string(), None),
        };
        let outcome = dice::roll(&expression, &mut self.rng)?;
        let entry = lobby.push_roll(&caller.name, label, outcome);
        debug!(
            "{} rolled {} = {}",
            lobby_tag(&lobby.name, &caller.name),
            entry.expression,
            entry.total
        );
        if let Some(m) = &self.mirror {
            m.roll(&entry);
        }
        self.broadcast(lobby, ServerMessage::Roll(entry));
        Ok(())
    }

    pub(super) fn start_campaign(&self, caller: &Caller, lobby: &mut Lobby) -> Result<(), SessionError> {
        let scene_id = lobby.start_campaign()?;
        info!("{} started the campaign", lobby_tag(&lobby.name, &caller.name));
        self.broadcast(lobby, ServerMessage::CampaignStarted { scene_id });
        let opening = match lobby.campaign.current_scene() {
            Some(scene) => format!("The campaign begins: {}", scene.title),
            None => "The campaign begins!".to_string(),
        };
        self.narrate(lobby, &opening);
        self.broadcast_campaign(lobby);
        self.broadcast_state(lobby);
        self.require_characters(lobby, "The campaign has started. Please create your character.");
        Ok(())
    }

    pub(super) fn set_scene(&self, lobby: &mut Lobby, scene_id: &str) -> Result<(), SessionError> {
        let dropped = lobby.set_scene(scene_id.trim())?;
        if dropped {
            self.broadcast(lobby, ServerMessage::system("The pending choice was withdrawn"));
        }
        let title = lobby
            .campaign
            .current_scene()
            .map(|s| s.title.clone())
            .unwrap_or_default();
        self.narrate(lobby, &format!("The scene changes: {}", title));
        self.broadcast_campaign(lobby);
        Ok(())
    }

    fn request_choice(
        &self,
        caller: &Caller,
        lobby: &mut Lobby,
        choice_id: &str,
    ) -> Result<(), SessionError> {
        match lobby.request_choice(choice_id.trim(), &caller.name)? {
            RequestOutcome::Pending { request, players } => {
                info!(
                    "{} requested {} ({} players to approve)",
                    lobby_tag(&lobby.name, &caller.name),
                    request.choice_id,
                    players.len()
                );
                self.broadcast(
                    lobby,
                    ServerMessage::CampaignChoiceRequested(ChoiceRequestedView {
                        scene_id: request.scene_id,
                        choice_id: request.choice_id,
                        text: request.text,
                        target: request.target_scene_id,
                        requested_by: request.requested_by,
                        players,
                    }),
                );
                self.broadcast_campaign(lobby);
            }
            RequestOutcome::Committed(commit) => self.announce_commit(lobby, &commit),
        }
        Ok(())
    }

    pub(super) fn force_choice(&self, caller: &Caller, lobby: &mut Lobby) -> Result<(), SessionError> {
        let commit = lobby.force_choice()?;
        info!("{} forced {}", lobby_tag(&lobby.name, &caller.name), commit.choice_id);
        self.broadcast(lobby, ServerMessage::system("The GM forced the choice through"));
        self.announce_commit(lobby, &commit);
        Ok(())
    }

    pub(super) fn announce_commit(&self, lobby: &mut Lobby, commit: &Commit) {
        let text = if commit.moved {
            let title = lobby
                .campaign
                .scene(&commit.target)
                .map(|s| s.title.clone())
                .unwrap_or_default();
            format!("The party moves on: {}", title)
        } else {
            format!("The chosen path leads nowhere yet (no scene '{}')", commit.target)
        };
        debug!("[{}] committed {} -> {}", escape_log(&lobby.name), commit.choice_id, commit.target);
        self.narrate(lobby, &text);
        self.broadcast_campaign(lobby);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::Params;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn hub() -> SessionHub {
        let config = Config::default();
        SessionHub::new(
            &config,
            Arc::new(LobbyRegistry::new(config.lobby.defaults())),
            Arc::new(CampaignCatalog::builtin()),
            CredentialGate::with_params(Params::new(8, 1, 1, None).unwrap()),
            None,
        )
        .with_rng(StdRng::seed_from_u64(7))
    }

    fn connect(hub: &mut SessionHub, n: u64) -> UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        hub.handle(HubEvent::Connected { id: ConnectionId(n), tx });
        rx
    }

    fn say(hub: &mut SessionHub, n: u64, json: &str) {
        hub.handle(HubEvent::Inbound { id: ConnectionId(n), text: json.to_string() });
    }

    fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(m) = rx.try_recv() {
            out.push(m);
        }
        out
    }

    #[test]
    fn messages_before_join_are_refused() {
        let mut hub = hub();
        let mut rx = connect(&mut hub, 1);
        drain(&mut rx);
        say(&mut hub, 1, r#"{"type":"chat","text":"hello"}"#);
        let out = drain(&mut rx);
        assert!(matches!(&out[..], [ServerMessage::ErrorMessage { code, .. }] if code == "validation"));
    }

    #[test]
    fn first_joiner_is_gm_and_sees_state() {
        let mut hub = hub();
        let mut rx = connect(&mut hub, 1);
        say(&mut hub, 1, r#"{"type":"identify","name":"Mara"}"#);
        say(&mut hub, 1, r#"{"type":"join_lobby","lobby":"tavern"}"#);
        let kinds: Vec<_> = drain(&mut rx).iter().map(|m| m.kind()).collect();
        assert_eq!(
            kinds,
            vec!["lobbies", "identified", "joined", "map_state", "campaign_state", "system", "state", "lobbies"]
        );
        let lobby = hub.registry().get("tavern").unwrap();
        assert!(lock(&lobby).is_gm("Mara"));
    }

    #[test]
    fn bad_json_is_a_validation_error() {
        let mut hub = hub();
        let mut rx = connect(&mut hub, 1);
        drain(&mut rx);
        say(&mut hub, 1, "{not json");
        match drain(&mut rx).pop() {
            Some(ServerMessage::ErrorMessage { code, .. }) => assert_eq!(code, "validation"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn disconnect_leaves_lobby() {
        let mut hub = hub();
        let _a = connect(&mut hub, 1);
        say(&mut hub, 1, r#"{"type":"join_lobby","lobby":"tavern"}"#);
        hub.handle(HubEvent::Disconnected { id: ConnectionId(1) });
        assert_eq!(hub.connection_count(), 0);
        let lobby = hub.registry().get("tavern").unwrap();
        assert!(lock(&lobby).members.is_empty());
    }
}
