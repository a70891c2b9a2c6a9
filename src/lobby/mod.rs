//! # Lobby Session Model
//!
//! One [Lobby] holds everything a table shares: members, chat and roll logs,
//! character sheets, the grid map, the initiative tracker and the campaign
//! graph. The engines that mutate each part live in the submodules:
//!
//! - [`membership`] - display names, joining, leaving, bans
//! - [`credential`] - the per-lobby password hash
//! - [`map`] - grid, walls and tokens
//! - [`encounter`] - initiative order and turn pointer
//! - [`campaign`] - scenes, choices and the consent protocol
//! - [`character`] - character sheet sanitizing and ownership
//! - [`registry`] - the name → lobby table
//!
//! Nothing in this module talks to the network. The gateway hub holds a lobby
//! lock, calls an engine, and turns the result into outbound messages.

pub mod campaign;
pub mod character;
pub mod credential;
pub mod encounter;
pub mod map;
pub mod membership;
pub mod registry;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dice::RollOutcome;
use crate::validation::fold;

pub use campaign::{Campaign, ConsentRequest};
pub use character::CharacterSheet;
pub use credential::CredentialGate;
pub use encounter::Encounter;
pub use map::GridMap;
pub use registry::{LobbyRegistry, SharedLobby};

/// Opaque per-connection identifier handed out by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Who is performing an action, as far as ownership checks care.
#[derive(Debug, Clone, Copy)]
pub struct Actor<'a> {
    pub name: &'a str,
    pub is_gm: bool,
}

impl<'a> Actor<'a> {
    /// True when the actor is the GM or the named owner.
    pub fn may_touch(&self, owner: &str) -> bool {
        self.is_gm || self.name == owner
    }
}

/// Values a fresh lobby is materialized with.
#[derive(Debug, Clone)]
pub struct LobbyDefaults {
    pub history_limit: usize,
    pub map_width: i64,
    pub map_height: i64,
}

impl Default for LobbyDefaults {
    fn default() -> Self {
        Self {
            history_limit: 40,
            map_width: 20,
            map_height: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Say,
    Action,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub id: u64,
    pub lobby: String,
    pub from: String,
    pub text: String,
    pub kind: ChatKind,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollEntry {
    pub id: u64,
    pub lobby: String,
    pub by: String,
    /// Macro name when the roll came from one.
    pub label: Option<String>,
    pub expression: String,
    pub rolls: Vec<u32>,
    pub used: Vec<u32>,
    pub modifier: i64,
    pub total: i64,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySettings {
    pub locked_until_start: bool,
    pub campaign_started: bool,
    pub require_character: bool,
    pub pending_consent: Option<ConsentRequest>,
}

/// The authoritative state of one lobby.
#[derive(Debug)]
pub struct Lobby {
    pub name: String,
    pub gm: Option<String>,
    pub password_hash: Option<String>,
    /// Case-folded.
    pub banned: BTreeSet<String>,
    /// Connection ids are handed out in increasing order, so iteration is join order.
    pub members: BTreeMap<ConnectionId, String>,
    pub macros: HashMap<String, BTreeMap<String, String>>,
    pub chat_log: Vec<ChatEntry>,
    pub roll_log: Vec<RollEntry>,
    pub characters: BTreeMap<String, CharacterSheet>,
    pub encounter: Encounter,
    pub map: GridMap,
    pub campaign: Campaign,
    pub settings: LobbySettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    history_limit: usize,
    next_entry_id: u64,
}

impl Lobby {
    pub fn new(name: &str, defaults: &LobbyDefaults) -> Self {
        let now = Utc::now();
        Lobby {
            name: name.to_string(),
            gm: None,
            password_hash: None,
            banned: BTreeSet::new(),
            members: BTreeMap::new(),
            macros: HashMap::new(),
            chat_log: Vec::new(),
            roll_log: Vec::new(),
            characters: BTreeMap::new(),
            encounter: Encounter::default(),
            map: GridMap::new(defaults.map_width, defaults.map_height),
            campaign: Campaign::default(),
            settings: LobbySettings::default(),
            created_at: now,
            updated_at: now,
            history_limit: defaults.history_limit,
            next_entry_id: 1,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_gm(&self, name: &str) -> bool {
        self.gm.as_deref() == Some(name)
    }

    pub fn member_name(&self, conn: ConnectionId) -> Option<&str> {
        self.members.get(&conn).map(String::as_str)
    }

    /// Connected display names in join order.
    pub fn users(&self) -> Vec<String> {
        self.members.values().cloned().collect()
    }

    /// Connected members who are not the GM; these must approve scene changes.
    pub fn players(&self) -> Vec<String> {
        self.members
            .values()
            .filter(|n| !self.is_gm(n))
            .cloned()
            .collect()
    }

    /// Find a connected member by exact name, then case-insensitively.
    pub fn find_member(&self, name: &str) -> Option<(ConnectionId, String)> {
        self.members
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .or_else(|| {
                let folded = fold(name);
                self.members.iter().find(|(_, n)| fold(n) == folded)
            })
            .map(|(c, n)| (*c, n.clone()))
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_entry_id;
        self.next_entry_id += 1;
        id
    }

    pub fn push_chat(&mut self, from: &str, text: &str, kind: ChatKind) -> ChatEntry {
        let entry = ChatEntry {
            id: self.next_id(),
            lobby: self.name.clone(),
            from: from.to_string(),
            text: text.to_string(),
            kind,
            ts: Utc::now(),
        };
        self.chat_log.push(entry.clone());
        self.touch();
        entry
    }

    pub fn push_roll(&mut self, by: &str, label: Option<String>, outcome: RollOutcome) -> RollEntry {
        let entry = RollEntry {
            id: self.next_id(),
            lobby: self.name.clone(),
            by: by.to_string(),
            label,
            expression: outcome.expression,
            rolls: outcome.rolls,
            used: outcome.used,
            modifier: outcome.modifier,
            total: outcome.total,
            ts: Utc::now(),
        };
        self.roll_log.push(entry.clone());
        self.touch();
        entry
    }

    /// The tail of both logs shown to a new joiner.
    pub fn history(&self) -> (Vec<ChatEntry>, Vec<RollEntry>) {
        let tail = |len: usize| len.saturating_sub(self.history_limit);
        (
            self.chat_log[tail(self.chat_log.len())..].to_vec(),
            self.roll_log[tail(self.roll_log.len())..].to_vec(),
        )
    }

    /// Connected players who still have no character sheet.
    pub fn missing_characters(&self) -> Vec<String> {
        self.players()
            .into_iter()
            .filter(|n| !self.characters.contains_key(n))
            .collect()
    }

    /// Names the UI should nag about, only when the lobby asks for sheets.
    pub fn characters_needed(&self) -> Vec<String> {
        if self.settings.require_character {
            self.missing_characters()
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::RollOutcome;

    fn lobby() -> Lobby {
        Lobby::new("tavern", &LobbyDefaults { history_limit: 3, ..LobbyDefaults::default() })
    }

    #[test]
    fn history_is_bounded_tail() {
        let mut l = lobby();
        for i in 0..5 {
            l.push_chat("Rin", &format!("line {i}"), ChatKind::Say);
        }
        l.push_roll(
            "Rin",
            None,
            RollOutcome { expression: "d6".into(), rolls: vec![4], used: vec![4], modifier: 0, total: 4 },
        );
        let (chat, rolls) = l.history();
        assert_eq!(chat.len(), 3);
        assert_eq!(chat[0].text, "line 2");
        assert_eq!(rolls.len(), 1);
        assert_eq!(l.chat_log.len(), 5, "full log stays in memory");
    }

    #[test]
    fn players_exclude_gm() {
        let mut l = lobby();
        l.members.insert(ConnectionId(1), "Gm".into());
        l.members.insert(ConnectionId(2), "Rin".into());
        l.gm = Some("Gm".into());
        assert_eq!(l.users(), vec!["Gm", "Rin"]);
        assert_eq!(l.players(), vec!["Rin"]);
        assert_eq!(l.find_member("rin"), Some((ConnectionId(2), "Rin".to_string())));
    }

    #[test]
    fn characters_needed_respects_setting() {
        let mut l = lobby();
        l.members.insert(ConnectionId(2), "Rin".into());
        assert!(l.characters_needed().is_empty());
        l.settings.require_character = true;
        assert_eq!(l.characters_needed(), vec!["Rin"]);
    }
}
