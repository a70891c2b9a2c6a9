//! Slash commands typed into chat.
//!
//! [parse] turns `/name args` into a [Command]; anything without a leading
//! slash is ordinary chat. Parsing never touches lobby state, so a malformed
//! command costs nothing but a usage hint back to its sender.

use chrono::Utc;
use log::{info, trace};

use super::hub::{Caller, SessionHub};
use super::protocol::ServerMessage;
use super::roles::Action;
use super::sec_log;
use crate::dice;
use crate::error::SessionError;
use crate::lobby::{ChatKind, ConnectionId, Lobby};
use crate::logutil::{escape_log, lobby_tag};
use crate::validation::{clean_key, clean_text, fold};

const MAX_MACRO_NAME: usize = 32;

pub const HELP_TEXT: &str = "\
Commands:
  /me <action>                 roleplay an action
  /w <name> <message>          whisper (also /whisper)
  /r <expr|macro>              roll dice, e.g. /r 2d6+1, /r adv (also /roll)
  /macro add <name> <expr>     save a roll macro
  /macro del <name>            delete a macro
  /macro list                  list your macros
GM only:
  /password <secret>           set the lobby password
  /kick <name>  /ban <name>  /unban <name>
  /encounter start|end         start or end combat
  /init <name> <value>         set initiative (/init remove <name>)
  /next                        advance to the next turn
  /title <text>  /summary <text>
  /scene add <title> | <content>
  /scene set <id>
  /start                       start the campaign
  /force                       force the pending choice through
  /lock on|off                 lock players out until the campaign starts
  /requirechar on|off          ask players for character sheets";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Me(String),
    Whisper { target: String, text: String },
    Roll(String),
    MacroAdd { name: String, expression: String },
    MacroDel(String),
    MacroList,
    Password(String),
    Kick(String),
    Ban(String),
    Unban(String),
    EncounterStart,
    EncounterEnd,
    Initiative { name: String, value: i64 },
    InitiativeRemove(String),
    Next,
    Title(String),
    Summary(String),
    SceneAdd { title: String, content: String },
    SceneSet(String),
    Start,
    Force,
    Lock(bool),
    RequireCharacter(bool),
}

impl Command {
    pub fn action(&self) -> Action {
        match self {
            Command::Help => Action::Help,
            Command::Me(_) => Action::Emote,
            Command::Whisper { .. } => Action::Whisper,
            Command::Roll(_) => Action::Roll,
            Command::MacroAdd { .. } | Command::MacroDel(_) | Command::MacroList => Action::Macro,
            Command::Password(_) => Action::Password,
            Command::Kick(_) => Action::Kick,
            Command::Ban(_) => Action::Ban,
            Command::Unban(_) => Action::Unban,
            Command::EncounterStart | Command::EncounterEnd => Action::Encounter,
            Command::Initiative { .. } | Command::InitiativeRemove(_) => Action::Initiative,
            Command::Next => Action::NextTurn,
            Command::Title(_) | Command::Summary(_) | Command::SceneAdd { .. } => Action::CampaignEdit,
            Command::SceneSet(_) => Action::SceneSet,
            Command::Start => Action::CampaignStart,
            Command::Force => Action::ChoiceForce,
            Command::Lock(_) => Action::Lock,
            Command::RequireCharacter(_) => Action::RequireCharacter,
        }
    }
}

fn usage(text: &str) -> SessionError {
    SessionError::validation(format!("Usage: {}", text))
}

/// Split off the first whitespace-delimited word.
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim()),
        None => (s, ""),
    }
}

fn required(arg: &str, hint: &str) -> Result<String, SessionError> {
    if arg.is_empty() {
        Err(usage(hint))
    } else {
        Ok(arg.to_string())
    }
}

fn on_off(arg: &str, hint: &str) -> Result<bool, SessionError> {
    match arg.to_ascii_lowercase().as_str() {
        "on" | "yes" | "true" => Ok(true),
        "off" | "no" | "false" => Ok(false),
        _ => Err(usage(hint)),
    }
}

/// `None` for plain chat; otherwise the parsed command or why it was refused.
pub fn parse(raw: &str) -> Option<Result<Command, SessionError>> {
    let trimmed = raw.trim();
    let body = trimmed.strip_prefix('/')?;
    let (name, args) = split_word(body);
    trace!("Parsed command '{}' args '{}'", name, args);
    Some(parse_command(&name.to_ascii_lowercase(), args))
}

fn parse_command(name: &str, args: &str) -> Result<Command, SessionError> {
    match name {
        "help" | "?" => Ok(Command::Help),
        "me" => required(args, "/me <action>").map(Command::Me),
        "w" | "whisper" => {
            let (target, text) = split_word(args);
            if target.is_empty() || text.is_empty() {
                return Err(usage("/w <name> <message>"));
            }
            Ok(Command::Whisper { target: target.to_string(), text: text.to_string() })
        }
        "r" | "roll" => required(args, "/r <expression|macro>").map(Command::Roll),
        "macro" => {
            let (sub, rest) = split_word(args);
            match sub.to_ascii_lowercase().as_str() {
                "add" => {
                    let (name, expression) = split_word(rest);
                    if name.is_empty() || expression.is_empty() {
                        return Err(usage("/macro add <name> <expression>"));
                    }
                    Ok(Command::MacroAdd { name: name.to_string(), expression: expression.to_string() })
                }
                "del" | "delete" | "rm" => required(rest, "/macro del <name>").map(Command::MacroDel),
                "list" | "" => Ok(Command::MacroList),
                _ => Err(usage("/macro add|del|list")),
            }
        }
        "password" => required(args, "/password <secret>").map(Command::Password),
        "kick" => required(args, "/kick <name>").map(Command::Kick),
        "ban" => required(args, "/ban <name>").map(Command::Ban),
        "unban" => required(args, "/unban <name>").map(Command::Unban),
        "encounter" => match args.to_ascii_lowercase().as_str() {
            "start" => Ok(Command::EncounterStart),
            "end" | "stop" => Ok(Command::EncounterEnd),
            _ => Err(usage("/encounter start|end")),
        },
        "init" => {
            let (first, rest) = split_word(args);
            if first.eq_ignore_ascii_case("remove") && !rest.is_empty() {
                return Ok(Command::InitiativeRemove(rest.to_string()));
            }
            // The value is the last word so names may contain spaces.
            let hint = "/init <name> <value> or /init remove <name>";
            let (name, value) = args.rsplit_once(char::is_whitespace).ok_or_else(|| usage(hint))?;
            let value: i64 = value.trim().parse().map_err(|_| usage(hint))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(usage(hint));
            }
            Ok(Command::Initiative { name: name.to_string(), value })
        }
        "next" => Ok(Command::Next),
        "title" => required(args, "/title <text>").map(Command::Title),
        "summary" => required(args, "/summary <text>").map(Command::Summary),
        "scene" => {
            let (sub, rest) = split_word(args);
            match sub.to_ascii_lowercase().as_str() {
                "add" => {
                    let (title, content) = match rest.split_once('|') {
                        Some((t, c)) => (t.trim(), c.trim()),
                        None => (rest, ""),
                    };
                    if title.is_empty() {
                        return Err(usage("/scene add <title> | <content>"));
                    }
                    Ok(Command::SceneAdd { title: title.to_string(), content: content.to_string() })
                }
                "set" => required(rest, "/scene set <id>").map(Command::SceneSet),
                _ => Err(usage("/scene add <title> | <content>  or  /scene set <id>")),
            }
        }
        "start" => Ok(Command::Start),
        "force" => Ok(Command::Force),
        "lock" => on_off(args, "/lock on|off").map(Command::Lock),
        "requirechar" => on_off(args, "/requirechar on|off").map(Command::RequireCharacter),
        other => Err(SessionError::validation(format!(
            "Unknown command '/{}'. Type /help for a list.",
            other
        ))),
    }
}

impl SessionHub {
    /// Execute an authorized command for `caller` inside `lobby`.
    pub(super) fn run_command(
        &mut self,
        caller: &Caller,
        lobby: &mut Lobby,
        command: Command,
    ) -> Result<(), SessionError> {
        match command {
            Command::Help => self.send(caller.conn, ServerMessage::system(HELP_TEXT)),
            Command::Me(text) => self.post_chat(lobby, &caller.name, &text, ChatKind::Action),
            Command::Whisper { target, text } => {
                let (to_conn, to_name) = lobby
                    .find_member(&target)
                    .ok_or_else(|| SessionError::not_found(format!("No one named '{}' is here", target)))?;
                let msg = ServerMessage::Whisper {
                    from: caller.name.clone(),
                    to: to_name,
                    text,
                    ts: Utc::now(),
                };
                if to_conn != caller.conn {
                    self.send(to_conn, msg.clone());
                }
                self.send(caller.conn, msg);
            }
            Command::Roll(expression) => self.roll_dice(caller, lobby, &expression)?,
            Command::MacroAdd { name, expression } => {
                let key = clean_key(&name, MAX_MACRO_NAME);
                if key.is_empty() {
                    return Err(SessionError::validation("Macro names use letters, digits, - and _"));
                }
                dice::parse(&expression)?;
                let expression = expression.trim().to_string();
                self.send(
                    caller.conn,
                    ServerMessage::system(format!("Macro '{}' saved: {}", key, expression)),
                );
                lobby.macros.entry(caller.name.clone()).or_default().insert(key, expression);
            }
            Command::MacroDel(name) => {
                let key = clean_key(&name, MAX_MACRO_NAME);
                let removed = lobby
                    .macros
                    .get_mut(&caller.name)
                    .and_then(|m| m.remove(&key))
                    .is_some();
                if !removed {
                    return Err(SessionError::not_found(format!("No macro '{}'", key)));
                }
                self.send(caller.conn, ServerMessage::system(format!("Macro '{}' deleted", key)));
            }
            Command::MacroList => {
                let text = match lobby.macros.get(&caller.name).filter(|m| !m.is_empty()) {
                    Some(macros) => macros
                        .iter()
                        .map(|(k, v)| format!("{}: {}", k, v))
                        .collect::<Vec<_>>()
                        .join("\n"),
                    None => "You have no macros".to_string(),
                };
                self.send(caller.conn, ServerMessage::system(text));
            }
            Command::Password(secret) => {
                lobby.set_password(&secret, &self.gate)?;
                sec_log!("Password changed for lobby {} by {}", escape_log(&lobby.name), escape_log(&caller.name));
                self.broadcast(lobby, ServerMessage::system("The GM changed the lobby password"));
                self.mirror_lobby(lobby);
            }
            Command::Kick(name) => {
                let (conn, target) = lobby
                    .find_member(&name)
                    .ok_or_else(|| SessionError::not_found(format!("No one named '{}' is here", name)))?;
                if conn == caller.conn {
                    return Err(SessionError::validation("You cannot kick yourself"));
                }
                sec_log!("KICK by {}: {}", lobby_tag(&lobby.name, &caller.name), escape_log(&target));
                self.eject(lobby, conn, &target, "You were kicked by the GM");
            }
            Command::Ban(name) => {
                let name = clean_text(&name, self.limits.max_name_chars);
                let folded = fold(&name);
                if lobby.gm.as_deref().map(fold).as_deref() == Some(folded.as_str()) {
                    return Err(SessionError::validation("You cannot ban yourself"));
                }
                if !lobby.ban(&name) {
                    self.send(caller.conn, ServerMessage::system(format!("{} is already banned", name)));
                    return Ok(());
                }
                sec_log!("BAN by {}: {}", lobby_tag(&lobby.name, &caller.name), escape_log(&name));
                self.send(caller.conn, ServerMessage::system(format!("{} is banned", name)));
                if let Some((conn, target)) = lobby.find_member(&name) {
                    self.eject(lobby, conn, &target, "You were banned from this lobby");
                }
            }
            Command::Unban(name) => {
                let name = clean_text(&name, self.limits.max_name_chars);
                if !lobby.unban(&name) {
                    return Err(SessionError::not_found(format!("{} is not banned", name)));
                }
                sec_log!("UNBAN by {}: {}", lobby_tag(&lobby.name, &caller.name), escape_log(&name));
                self.send(caller.conn, ServerMessage::system(format!("{} may join again", name)));
            }
            Command::EncounterStart => {
                lobby.encounter.start();
                self.narrate(lobby, "Roll for initiative! An encounter begins.");
                self.broadcast_state(lobby);
            }
            Command::EncounterEnd => {
                lobby.encounter.end();
                self.narrate(lobby, "The encounter is over.");
                self.broadcast_state(lobby);
            }
            Command::Initiative { name, value } => {
                let name = clean_text(&name, self.limits.max_name_chars);
                lobby.encounter.set_initiative(&name, value)?;
                self.broadcast_state(lobby);
            }
            Command::InitiativeRemove(name) => {
                lobby.encounter.remove(name.trim())?;
                self.broadcast_state(lobby);
            }
            Command::Next => {
                let current = lobby.encounter.advance()?.name.clone();
                self.narrate(lobby, &format!("It is {}'s turn", current));
                self.broadcast_state(lobby);
            }
            Command::Title(title) => {
                lobby.campaign.update_meta(Some(&title), None);
                self.broadcast_campaign(lobby);
            }
            Command::Summary(summary) => {
                lobby.campaign.update_meta(None, Some(&summary));
                self.broadcast_campaign(lobby);
            }
            Command::SceneAdd { title, content } => {
                let id = lobby.campaign.add_scene(&title, &content).id.clone();
                self.send(caller.conn, ServerMessage::system(format!("Scene added as {}", id)));
                self.broadcast_campaign(lobby);
            }
            Command::SceneSet(id) => self.set_scene(lobby, &id)?,
            Command::Start => self.start_campaign(caller, lobby)?,
            Command::Force => self.force_choice(caller, lobby)?,
            Command::Lock(on) => {
                lobby.settings.locked_until_start = on;
                info!("{} set lock {}", lobby_tag(&lobby.name, &caller.name), on);
                let text = if on {
                    "The lobby is locked until the campaign starts"
                } else {
                    "The lobby is unlocked"
                };
                self.broadcast(lobby, ServerMessage::system(text));
                self.broadcast_state(lobby);
            }
            Command::RequireCharacter(on) => {
                lobby.settings.require_character = on;
                self.broadcast_state(lobby);
                if on {
                    self.require_characters(lobby, "The GM asks everyone to create a character.");
                }
            }
        }
        Ok(())
    }

    /// Drop a member from `lobby` on the GM's say-so.
    fn eject(&mut self, lobby: &mut Lobby, conn: ConnectionId, name: &str, reason: &str) {
        lobby.leave(conn);
        self.send(
            conn,
            ServerMessage::Kicked { lobby: lobby.name.clone(), reason: reason.to_string() },
        );
        if let Some(c) = self.connections.get_mut(&conn) {
            c.session.exit();
        }
        info!("{} was removed", lobby_tag(&lobby.name, name));
        self.after_departure(lobby, &format!("{} was removed from the lobby", name));
    }
}
