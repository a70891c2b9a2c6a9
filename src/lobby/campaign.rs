//! # Campaign Graph
//!
//! A campaign is a set of scenes joined by choices, plus the handouts, quests
//! and notes the table collects along the way. One scene is current.
//!
//! ## Consent
//!
//! Moving along a choice is a group decision. The GM proposes a choice on the
//! current scene, which becomes the lobby's single [ConsentRequest]. Every
//! connected non-GM member must acknowledge it before the pointer moves. The
//! GM may force the pending request through at any time.
//!
//! Choices may point at scene ids that do not exist. Committing one clears the
//! request but leaves the pointer where it was.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Lobby;
use crate::error::SessionError;
use crate::validation::{clean_multiline, clean_or, clean_text};

pub const MAX_TITLE: usize = 80;
pub const MAX_CONTENT: usize = 4000;
pub const MAX_CHOICE_TEXT: usize = 200;
pub const MAX_NOTE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    pub id: String,
    pub text: String,
    pub target_scene_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handout {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quest {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Campaign {
    pub key: Option<String>,
    pub title: String,
    pub summary: String,
    pub scenes: Vec<Scene>,
    pub current_scene_id: Option<String>,
    pub handouts: Vec<Handout>,
    pub quests: Vec<Quest>,
    pub notes: Vec<Note>,
}

/// The single pending scene transition of a lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRequest {
    pub scene_id: String,
    pub choice_id: String,
    pub text: String,
    pub target_scene_id: String,
    pub approvals: BTreeSet<String>,
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
}

/// A committed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub from_scene: String,
    pub choice_id: String,
    pub target: String,
    /// False when the target scene does not exist.
    pub moved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Waiting on these players.
    Pending { request: ConsentRequest, players: Vec<String> },
    /// Nobody needed to approve.
    Committed(Commit),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    Pending { approvals: BTreeSet<String>, waiting_on: Vec<String> },
    /// Caller had already approved.
    Unchanged,
    Committed(Commit),
}

/// `prefix-N` with the smallest N past the current count that is not taken.
fn next_id<'a>(prefix: &str, existing: impl Iterator<Item = &'a str> + Clone) -> String {
    let mut n = existing.clone().count() + 1;
    loop {
        let id = format!("{}-{}", prefix, n);
        if !existing.clone().any(|e| e == id) {
            return id;
        }
        n += 1;
    }
}

impl Campaign {
    pub fn scene(&self, id: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == id)
    }

    pub fn current_scene(&self) -> Option<&Scene> {
        self.current_scene_id.as_deref().and_then(|id| self.scene(id))
    }

    pub fn update_meta(&mut self, title: Option<&str>, summary: Option<&str>) {
        if let Some(t) = title {
            self.title = clean_text(t, MAX_TITLE);
        }
        if let Some(s) = summary {
            self.summary = clean_multiline(s, MAX_CONTENT);
        }
    }

    /// Append a scene. The first scene of an empty campaign becomes current.
    pub fn add_scene(&mut self, title: &str, content: &str) -> &Scene {
        let id = next_id("scene", self.scenes.iter().map(|s| s.id.as_str()));
        self.scenes.push(Scene {
            id: id.clone(),
            title: clean_or(title, MAX_TITLE, "Untitled scene"),
            content: clean_multiline(content, MAX_CONTENT),
            choices: Vec::new(),
        });
        if self.current_scene_id.is_none() {
            self.current_scene_id = Some(id);
        }
        &self.scenes[self.scenes.len() - 1]
    }

    /// Add a choice to `scene_id`. The flag is true when `target` names no scene yet.
    pub fn add_choice(&mut self, scene_id: &str, text: &str, target: &str) -> Result<(Choice, bool), SessionError> {
        let target = clean_text(target, MAX_TITLE);
        if target.is_empty() {
            return Err(SessionError::validation("A choice needs a target scene id"));
        }
        let dangling = self.scene(&target).is_none();
        let scene = self
            .scenes
            .iter_mut()
            .find(|s| s.id == scene_id)
            .ok_or_else(|| SessionError::not_found(format!("No scene '{}'", scene_id)))?;
        let choice = Choice {
            id: next_id("choice", scene.choices.iter().map(|c| c.id.as_str())),
            text: clean_or(text, MAX_CHOICE_TEXT, "Continue"),
            target_scene_id: target,
        };
        scene.choices.push(choice.clone());
        Ok((choice, dangling))
    }

    pub fn add_handout(&mut self, title: &str, content: &str) -> &Handout {
        self.handouts.push(Handout {
            id: next_id("handout", self.handouts.iter().map(|h| h.id.as_str())),
            title: clean_or(title, MAX_TITLE, "Handout"),
            content: clean_multiline(content, MAX_CONTENT),
            created_at: Utc::now(),
        });
        &self.handouts[self.handouts.len() - 1]
    }

    pub fn add_quest(&mut self, title: &str) -> Result<&Quest, SessionError> {
        let title = clean_text(title, MAX_TITLE);
        if title.is_empty() {
            return Err(SessionError::validation("A quest needs a title"));
        }
        self.quests.push(Quest {
            id: next_id("quest", self.quests.iter().map(|q| q.id.as_str())),
            title,
            done: false,
        });
        Ok(&self.quests[self.quests.len() - 1])
    }

    /// Flip a quest's done flag; returns the new value.
    pub fn toggle_quest(&mut self, id: &str) -> Result<bool, SessionError> {
        let quest = self
            .quests
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or_else(|| SessionError::not_found(format!("No quest '{}'", id)))?;
        quest.done = !quest.done;
        Ok(quest.done)
    }

    pub fn add_note(&mut self, author: &str, text: &str) -> Result<&Note, SessionError> {
        let text = clean_multiline(text, MAX_NOTE);
        if text.is_empty() {
            return Err(SessionError::validation("Note is empty"));
        }
        self.notes.push(Note {
            id: next_id("note", self.notes.iter().map(|n| n.id.as_str())),
            author: author.to_string(),
            text,
            created_at: Utc::now(),
        });
        Ok(&self.notes[self.notes.len() - 1])
    }
}

impl Lobby {
    /// Replace the campaign with a copy of `definition`.
    pub fn load_campaign(&mut self, definition: &Campaign) {
        let mut campaign = definition.clone();
        let current_ok = campaign
            .current_scene_id
            .as_deref()
            .map(|id| campaign.scene(id).is_some())
            .unwrap_or(false);
        if !current_ok {
            campaign.current_scene_id = campaign.scenes.first().map(|s| s.id.clone());
        }
        self.campaign = campaign;
        self.settings.campaign_started = false;
        self.settings.pending_consent = None;
        self.touch();
    }

    /// One-way start. Returns the scene the table starts on.
    pub fn start_campaign(&mut self) -> Result<Option<String>, SessionError> {
        if self.settings.campaign_started {
            return Err(SessionError::validation("The campaign has already started"));
        }
        self.settings.campaign_started = true;
        self.touch();
        Ok(self.campaign.current_scene_id.clone())
    }

    fn quorum_met(&self, request: &ConsentRequest) -> bool {
        self.players().iter().all(|p| request.approvals.contains(p))
    }

    fn commit(&mut self, request: ConsentRequest) -> Commit {
        let moved = self.campaign.scene(&request.target_scene_id).is_some();
        if moved {
            self.campaign.current_scene_id = Some(request.target_scene_id.clone());
        }
        self.settings.pending_consent = None;
        self.touch();
        Commit {
            from_scene: request.scene_id,
            choice_id: request.choice_id,
            target: request.target_scene_id,
            moved,
        }
    }

    /// Propose `choice_id` on the current scene, replacing any pending request.
    pub fn request_choice(&mut self, choice_id: &str, requested_by: &str) -> Result<RequestOutcome, SessionError> {
        if !self.settings.campaign_started {
            return Err(SessionError::validation("Start the campaign first"));
        }
        let scene = self
            .campaign
            .current_scene()
            .ok_or_else(|| SessionError::not_found("There is no current scene"))?;
        let choice = scene
            .choices
            .iter()
            .find(|c| c.id == choice_id)
            .ok_or_else(|| SessionError::not_found(format!("No choice '{}' on this scene", choice_id)))?;
        let request = ConsentRequest {
            scene_id: scene.id.clone(),
            choice_id: choice.id.clone(),
            text: choice.text.clone(),
            target_scene_id: choice.target_scene_id.clone(),
            approvals: BTreeSet::new(),
            requested_by: requested_by.to_string(),
            created_at: Utc::now(),
        };
        let players = self.players();
        if players.is_empty() {
            return Ok(RequestOutcome::Committed(self.commit(request)));
        }
        self.settings.pending_consent = Some(request.clone());
        self.touch();
        Ok(RequestOutcome::Pending { request, players })
    }

    /// Record `name`'s approval and commit once every player has approved.
    pub fn acknowledge_choice(&mut self, name: &str) -> Result<AckOutcome, SessionError> {
        let request = self
            .settings
            .pending_consent
            .as_mut()
            .ok_or_else(|| SessionError::not_found("Nothing is waiting for approval"))?;
        if !request.approvals.insert(name.to_string()) {
            return Ok(AckOutcome::Unchanged);
        }
        let request = request.clone();
        if self.quorum_met(&request) {
            return Ok(AckOutcome::Committed(self.commit(request)));
        }
        let waiting_on = self
            .players()
            .into_iter()
            .filter(|p| !request.approvals.contains(p))
            .collect();
        Ok(AckOutcome::Pending {
            approvals: request.approvals,
            waiting_on,
        })
    }

    /// Re-check the pending request after membership changed.
    pub fn reconsider_consent(&mut self) -> Option<Commit> {
        let request = self.settings.pending_consent.clone()?;
        if self.quorum_met(&request) {
            Some(self.commit(request))
        } else {
            None
        }
    }

    /// Commit the pending request regardless of approvals.
    pub fn force_choice(&mut self) -> Result<Commit, SessionError> {
        let request = self
            .settings
            .pending_consent
            .take()
            .ok_or_else(|| SessionError::not_found("Nothing is waiting for approval"))?;
        Ok(self.commit(request))
    }

    /// Jump straight to a scene. Returns true when a pending request was dropped.
    pub fn set_scene(&mut self, scene_id: &str) -> Result<bool, SessionError> {
        if self.campaign.scene(scene_id).is_none() {
            return Err(SessionError::not_found(format!("No scene '{}'", scene_id)));
        }
        self.campaign.current_scene_id = Some(scene_id.to_string());
        let dropped = self.settings.pending_consent.take().is_some();
        self.touch();
        Ok(dropped)
    }
}
