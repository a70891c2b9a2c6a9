//! Initiative order with a rotating turn pointer.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    pub name: String,
    pub initiative: i64,
}

/// `turn_index` indexes `order` whenever `order` is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Encounter {
    pub active: bool,
    pub order: Vec<Combatant>,
    pub turn_index: usize,
}

fn inactive() -> SessionError {
    SessionError::validation("No encounter is running (use /encounter start)")
}

impl Encounter {
    pub fn start(&mut self) {
        *self = Encounter {
            active: true,
            ..Encounter::default()
        };
    }

    pub fn end(&mut self) {
        *self = Encounter::default();
    }

    pub fn current(&self) -> Option<&Combatant> {
        if self.active {
            self.order.get(self.turn_index)
        } else {
            None
        }
    }

    /// Insert or update, then re-sort descending.
    ///
    /// The sort is stable, so equal values keep their prior relative order and
    /// a new entry lands after existing equals. The turn pointer follows the
    /// combatant whose turn it was.
    pub fn set_initiative(&mut self, name: &str, value: i64) -> Result<(), SessionError> {
        if !self.active {
            return Err(inactive());
        }
        let current = self.order.get(self.turn_index).map(|c| c.name.clone());
        match self.order.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.initiative = value,
            None => self.order.push(Combatant {
                name: name.to_string(),
                initiative: value,
            }),
        }
        self.order.sort_by(|a, b| b.initiative.cmp(&a.initiative));
        self.turn_index = current
            .and_then(|n| self.order.iter().position(|c| c.name == n))
            .unwrap_or(0);
        Ok(())
    }

    pub fn advance(&mut self) -> Result<&Combatant, SessionError> {
        if !self.active {
            return Err(inactive());
        }
        if self.order.is_empty() {
            return Err(SessionError::validation("Initiative order is empty"));
        }
        self.turn_index = (self.turn_index + 1) % self.order.len();
        Ok(&self.order[self.turn_index])
    }

    /// Drop a combatant; the pointer stays on the same combatant when possible.
    pub fn remove(&mut self, name: &str) -> Result<(), SessionError> {
        let pos = self
            .order
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| SessionError::not_found(format!("{} is not in the initiative order", name)))?;
        self.order.remove(pos);
        if pos < self.turn_index {
            self.turn_index -= 1;
        }
        if self.turn_index >= self.order.len() {
            self.turn_index = 0;
        }
        Ok(())
    }
}
