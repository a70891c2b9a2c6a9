//! Character sheets.
//!
//! Clients send sheets as loose JSON. Every field is coerced: numbers may
//! arrive as strings, lists as comma-separated text, and anything missing or
//! out of range falls back to a bounded default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Actor, Lobby};
use crate::error::SessionError;
use crate::validation::{clean_multiline, clean_or, clean_text};

const MAX_FIELD: usize = 40;
const MAX_NOTES: usize = 2000;
const MAX_LIST: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct Abilities {
    pub str: i64,
    pub dex: i64,
    pub con: i64,
    pub int: i64,
    pub wis: i64,
    pub cha: i64,
}

impl Default for Abilities {
    fn default() -> Self {
        Abilities { str: 10, dex: 10, con: 10, int: 10, wis: 10, cha: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSheet {
    pub name: String,
    pub archetype: String,
    pub race: String,
    #[serde(rename = "class")]
    pub class_name: String,
    pub level: i64,
    pub armor_class: i64,
    pub hit_points: i64,
    pub max_hit_points: i64,
    pub speed: i64,
    pub proficiencies: Vec<String>,
    pub traits: Vec<String>,
    pub notes: String,
    pub abilities: Abilities,
    pub updated_at: DateTime<Utc>,
}

/// Look a field up under any of `keys`.
fn field<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| v.get(*k)).filter(|f| !f.is_null())
}

fn text(v: &Value, keys: &[&str], max: usize) -> String {
    match field(v, keys) {
        Some(Value::String(s)) => clean_text(s, max),
        Some(Value::Number(n)) => clean_text(&n.to_string(), max),
        _ => String::new(),
    }
}

fn int(v: &Value, keys: &[&str], min: i64, max: i64, default: i64) -> i64 {
    let parsed = match field(v, keys) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.unwrap_or(default).clamp(min, max)
}

fn list(v: &Value, keys: &[&str]) -> Vec<String> {
    let items: Vec<String> = match field(v, keys) {
        Some(Value::Array(a)) => a
            .iter()
            .filter_map(|i| i.as_str())
            .map(|s| clean_text(s, MAX_FIELD))
            .collect(),
        Some(Value::String(s)) => s.split(',').map(|p| clean_text(p, MAX_FIELD)).collect(),
        _ => Vec::new(),
    };
    items.into_iter().filter(|s| !s.is_empty()).take(MAX_LIST).collect()
}

fn abilities(v: &Value) -> Abilities {
    let Some(a) = field(v, &["abilities"]) else {
        return Abilities::default();
    };
    let score = |upper: &str, lower: &str| int(a, &[upper, lower], 1, 30, 10);
    Abilities {
        str: score("STR", "str"),
        dex: score("DEX", "dex"),
        con: score("CON", "con"),
        int: score("INT", "int"),
        wis: score("WIS", "wis"),
        cha: score("CHA", "cha"),
    }
}

impl CharacterSheet {
    /// Build a sheet from untrusted JSON, naming it `fallback_name` when the
    /// payload carries no usable name.
    pub fn sanitize(v: &Value, fallback_name: &str) -> CharacterSheet {
        let name = clean_or(&text(v, &["name"], MAX_FIELD), MAX_FIELD, fallback_name);
        let max_hit_points = int(v, &["maxHitPoints", "maxHp", "max_hp"], 0, 999, 10);
        CharacterSheet {
            name,
            archetype: text(v, &["archetype"], MAX_FIELD),
            race: text(v, &["race"], MAX_FIELD),
            class_name: text(v, &["class", "className"], MAX_FIELD),
            level: int(v, &["level"], 1, 20, 1),
            armor_class: int(v, &["armorClass", "ac"], 0, 40, 10),
            hit_points: int(v, &["hitPoints", "hp"], 0, 999, max_hit_points),
            max_hit_points,
            speed: int(v, &["speed"], 0, 200, 30),
            proficiencies: list(v, &["proficiencies"]),
            traits: list(v, &["traits"]),
            notes: match field(v, &["notes"]) {
                Some(Value::String(s)) => clean_multiline(s, MAX_NOTES),
                _ => String::new(),
            },
            abilities: abilities(v),
            updated_at: Utc::now(),
        }
    }
}

impl Lobby {
    /// Store a sheet. Players may only write the sheet named after themselves.
    pub fn upsert_character(&mut self, actor: Actor<'_>, raw: &Value) -> Result<CharacterSheet, SessionError> {
        if !raw.is_object() {
            return Err(SessionError::validation("Character sheet must be an object"));
        }
        let sheet = CharacterSheet::sanitize(raw, actor.name);
        if !actor.may_touch(&sheet.name) {
            return Err(SessionError::unauthorized("You can only edit your own character"));
        }
        self.characters.insert(sheet.name.clone(), sheet.clone());
        self.touch();
        Ok(sheet)
    }

    pub fn delete_character(&mut self, actor: Actor<'_>, name: &str) -> Result<CharacterSheet, SessionError> {
        if !actor.may_touch(name) {
            return Err(SessionError::unauthorized("You can only delete your own character"));
        }
        let removed = self
            .characters
            .remove(name)
            .ok_or_else(|| SessionError::not_found(format!("No character named '{}'", name)))?;
        self.touch();
        Ok(removed)
    }
}
