//! Who may do what inside a lobby.
//!
//! Every client action maps to an [Action], and [rule] says whether it needs
//! the GM and whether the pre-start lock applies to it. The hub calls
//! [authorize] once before running any handler. Ownership of tokens and
//! sheets is checked by the engine that owns them.

use crate::error::SessionError;
use crate::lobby::LobbySettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Identify,
    Join,
    Help,
    Chat,
    Emote,
    Whisper,
    Roll,
    Macro,
    CharacterUpsert,
    CharacterDelete,
    MapRequest,
    MapInit,
    MapSet,
    MapClear,
    TokenAdd,
    TokenMove,
    TokenRemove,
    TokenAssign,
    Ping,
    CampaignLoad,
    CampaignGet,
    CampaignStart,
    CampaignEdit,
    SceneSet,
    NoteAdd,
    ChoiceRequest,
    ChoiceAck,
    ChoiceForce,
    Password,
    Kick,
    Ban,
    Unban,
    Encounter,
    Initiative,
    NextTurn,
    Lock,
    RequireCharacter,
}

/// Requirements for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub gm_only: bool,
    /// Refused to players while the lobby is locked and the campaign has not started.
    pub lockable: bool,
}

const MEMBER: Rule = Rule { gm_only: false, lockable: false };
const LOCKABLE: Rule = Rule { gm_only: false, lockable: true };
const GM: Rule = Rule { gm_only: true, lockable: false };

pub fn rule(action: Action) -> Rule {
    use Action::*;
    match action {
        Identify | Join | Help | Macro | CharacterUpsert | CharacterDelete | MapRequest | CampaignGet | NoteAdd
        | ChoiceAck => MEMBER,
        Chat | Emote | Whisper | Roll | TokenAdd | TokenMove | TokenRemove | Ping => LOCKABLE,
        MapInit | MapSet | MapClear | TokenAssign | CampaignLoad | CampaignStart | CampaignEdit
        | SceneSet | ChoiceRequest | ChoiceForce | Password | Kick | Ban | Unban | Encounter
        | Initiative | NextTurn | Lock | RequireCharacter => GM,
    }
}

/// Check `action` for a member. The GM is never locked out.
pub fn authorize(action: Action, is_gm: bool, settings: &LobbySettings) -> Result<(), SessionError> {
    let r = rule(action);
    if is_gm {
        return Ok(());
    }
    if r.gm_only {
        return Err(SessionError::unauthorized("Only the GM can do that"));
    }
    if r.lockable && settings.locked_until_start && !settings.campaign_started {
        return Err(SessionError::Locked);
    }
    Ok(())
}
