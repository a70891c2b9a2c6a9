//! Wire messages.
//!
//! One JSON object per WebSocket text frame, discriminated by `"type"`.
//! Missing fields default; fields of the wrong type fail the whole message,
//! which the hub reports back as a validation error.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::roles::Action;
use crate::error::SessionError;
use crate::lobby::{
    Campaign, ChatEntry, CharacterSheet, ConsentRequest, Encounter, GridMap, Lobby, LobbySettings,
    RollEntry,
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Identify {
        #[serde(default)]
        name: String,
    },
    JoinLobby {
        #[serde(default)]
        lobby: String,
        #[serde(default)]
        password: Option<String>,
    },
    Chat {
        #[serde(default)]
        text: String,
    },
    Roll {
        #[serde(default)]
        expression: String,
    },
    CharacterUpsert {
        #[serde(default)]
        sheet: Value,
    },
    CharacterDelete {
        #[serde(default)]
        name: String,
    },
    MapRequest,
    MapInit {
        #[serde(default)]
        width: Option<i64>,
        #[serde(default)]
        height: Option<i64>,
    },
    MapSet {
        #[serde(default)]
        x: i64,
        #[serde(default)]
        y: i64,
        #[serde(default)]
        blocked: bool,
    },
    TokenAdd {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: String,
        #[serde(default)]
        color: String,
    },
    TokenMove {
        #[serde(default)]
        id: String,
        #[serde(default)]
        x: i64,
        #[serde(default)]
        y: i64,
    },
    TokenRemove {
        #[serde(default)]
        id: String,
    },
    TokenAssign {
        #[serde(default)]
        id: String,
        #[serde(default)]
        owner: String,
    },
    MapClear,
    Ping {
        #[serde(default)]
        x: i64,
        #[serde(default)]
        y: i64,
    },
    CampaignLoad {
        #[serde(default)]
        key: String,
    },
    CampaignGet,
    CampaignStart,
    CampaignUpdateMeta {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        summary: Option<String>,
    },
    CampaignSceneAdd {
        #[serde(default)]
        title: String,
        #[serde(default)]
        content: String,
    },
    CampaignSceneSet {
        #[serde(rename = "sceneId", default)]
        scene_id: String,
    },
    CampaignChoiceAdd {
        #[serde(rename = "sceneId", default)]
        scene_id: String,
        #[serde(default)]
        text: String,
        #[serde(default)]
        target: String,
    },
    CampaignHandoutAdd {
        #[serde(default)]
        title: String,
        #[serde(default)]
        content: String,
    },
    CampaignQuestAdd {
        #[serde(default)]
        title: String,
    },
    CampaignQuestToggle {
        #[serde(default)]
        id: String,
    },
    CampaignNoteAdd {
        #[serde(default)]
        text: String,
    },
    CampaignChoiceRequest {
        #[serde(rename = "choiceId", default)]
        choice_id: String,
    },
    CampaignChoiceAck,
    CampaignChoiceForce,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, SessionError> {
        serde_json::from_str(text).map_err(|e| SessionError::validation(format!("Bad message: {}", e)))
    }

    /// Policy entry for this message. Chat that turns out to be a slash
    /// command is re-classified by the command it carries.
    pub fn action(&self) -> Action {
        use ClientMessage::*;
        match self {
            Identify { .. } => Action::Identify,
            JoinLobby { .. } => Action::Join,
            Chat { .. } => Action::Chat,
            Roll { .. } => Action::Roll,
            CharacterUpsert { .. } => Action::CharacterUpsert,
            CharacterDelete { .. } => Action::CharacterDelete,
            MapRequest => Action::MapRequest,
            MapInit { .. } => Action::MapInit,
            MapSet { .. } => Action::MapSet,
            TokenAdd { .. } => Action::TokenAdd,
            TokenMove { .. } => Action::TokenMove,
            TokenRemove { .. } => Action::TokenRemove,
            TokenAssign { .. } => Action::TokenAssign,
            MapClear => Action::MapClear,
            Ping { .. } => Action::Ping,
            CampaignLoad { .. } => Action::CampaignLoad,
            CampaignGet => Action::CampaignGet,
            CampaignStart => Action::CampaignStart,
            CampaignUpdateMeta { .. }
            | CampaignSceneAdd { .. }
            | CampaignChoiceAdd { .. }
            | CampaignHandoutAdd { .. }
            | CampaignQuestAdd { .. }
            | CampaignQuestToggle { .. } => Action::CampaignEdit,
            CampaignSceneSet { .. } => Action::SceneSet,
            CampaignNoteAdd { .. } => Action::NoteAdd,
            CampaignChoiceRequest { .. } => Action::ChoiceRequest,
            CampaignChoiceAck => Action::ChoiceAck,
            CampaignChoiceForce => Action::ChoiceForce,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryView {
    pub chat: Vec<ChatEntry>,
    pub rolls: Vec<RollEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedView {
    pub lobby: String,
    pub you: String,
    pub history: HistoryView,
    pub gm: Option<String>,
    pub settings: LobbySettings,
}

impl JoinedView {
    pub fn of(lobby: &Lobby, you: &str) -> Self {
        let (chat, rolls) = lobby.history();
        JoinedView {
            lobby: lobby.name.clone(),
            you: you.to_string(),
            history: HistoryView { chat, rolls },
            gm: lobby.gm.clone(),
            settings: lobby.settings.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignView {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub started: bool,
    pub pending_consent: Option<ConsentRequest>,
}

impl CampaignView {
    pub fn of(lobby: &Lobby) -> Self {
        CampaignView {
            campaign: lobby.campaign.clone(),
            started: lobby.settings.campaign_started,
            pending_consent: lobby.settings.pending_consent.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateView {
    pub users: Vec<String>,
    pub gm: Option<String>,
    pub characters: BTreeMap<String, CharacterSheet>,
    pub encounter: Encounter,
    pub campaign: CampaignView,
    pub settings: LobbySettings,
    pub character_needed: Vec<String>,
}

impl StateView {
    pub fn of(lobby: &Lobby) -> Self {
        StateView {
            users: lobby.users(),
            gm: lobby.gm.clone(),
            characters: lobby.characters.clone(),
            encounter: lobby.encounter.clone(),
            campaign: CampaignView::of(lobby),
            settings: lobby.settings.clone(),
            character_needed: lobby.characters_needed(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceRequestedView {
    pub scene_id: String,
    pub choice_id: String,
    pub text: String,
    pub target: String,
    pub requested_by: String,
    pub players: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Identified {
        name: String,
    },
    Joined(JoinedView),
    System {
        text: String,
    },
    Chat(ChatEntry),
    Roll(RollEntry),
    ErrorMessage {
        text: String,
        code: String,
    },
    Characters {
        characters: BTreeMap<String, CharacterSheet>,
    },
    State(StateView),
    MapState(GridMap),
    MapPing {
        x: i64,
        y: i64,
        by: String,
        ts: DateTime<Utc>,
    },
    CampaignState(CampaignView),
    CampaignStarted {
        #[serde(rename = "sceneId")]
        scene_id: Option<String>,
    },
    CampaignChoiceRequested(ChoiceRequestedView),
    CharacterRequired {
        reason: String,
    },
    Lobbies {
        lobbies: Vec<String>,
    },
    Kicked {
        lobby: String,
        reason: String,
    },
    Whisper {
        from: String,
        to: String,
        text: String,
        ts: DateTime<Utc>,
    },
}

impl ServerMessage {
    pub fn system(text: impl Into<String>) -> Self {
        ServerMessage::System { text: text.into() }
    }

    pub fn error(err: &SessionError) -> Self {
        ServerMessage::ErrorMessage {
            text: err.to_string(),
            code: err.code().to_string(),
        }
    }

    /// The `type` tag, for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Identified { .. } => "identified",
            ServerMessage::Joined(_) => "joined",
            ServerMessage::System { .. } => "system",
            ServerMessage::Chat(_) => "chat",
            ServerMessage::Roll(_) => "roll",
            ServerMessage::ErrorMessage { .. } => "error_message",
            ServerMessage::Characters { .. } => "characters",
            ServerMessage::State(_) => "state",
            ServerMessage::MapState(_) => "map_state",
            ServerMessage::MapPing { .. } => "map_ping",
            ServerMessage::CampaignState(_) => "campaign_state",
            ServerMessage::CampaignStarted { .. } => "campaign_started",
            ServerMessage::CampaignChoiceRequested(_) => "campaign_choice_requested",
            ServerMessage::CharacterRequired { .. } => "character_required",
            ServerMessage::Lobbies { .. } => "lobbies",
            ServerMessage::Kicked { .. } => "kicked",
            ServerMessage::Whisper { .. } => "whisper",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
