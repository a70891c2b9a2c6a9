//! Grid map with walls and tokens.
//!
//! The grid is `height` rows of `width` cells, each open or wall. Tokens sit
//! on cells by coordinate and are owned by the member who placed them unless
//! the GM reassigns them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Actor;
use crate::error::SessionError;
use crate::validation::{clean_color, clean_key, clean_or};

pub const MIN_SIDE: i64 = 5;
pub const MAX_SIDE: i64 = 60;
pub const DEFAULT_TOKEN_COLOR: &str = "#c0392b";
const MAX_TOKEN_NAME: usize = 32;
const MAX_TOKEN_ID: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tile {
    Open,
    Wall,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub name: String,
    pub x: usize,
    pub y: usize,
    pub color: String,
    pub owner: String,
}

/// Result of a move request that passed the ownership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved { x: usize, y: usize },
    /// Destination was a wall; nothing changed.
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridMap {
    pub width: usize,
    pub height: usize,
    pub tiles: Vec<Vec<Tile>>,
    pub tokens: BTreeMap<String, Token>,
}

fn clamp_side(n: i64) -> usize {
    n.clamp(MIN_SIDE, MAX_SIDE) as usize
}

fn open_grid(width: usize, height: usize) -> Vec<Vec<Tile>> {
    vec![vec![Tile::Open; width]; height]
}

impl GridMap {
    pub fn new(width: i64, height: i64) -> Self {
        let (width, height) = (clamp_side(width), clamp_side(height));
        GridMap {
            width,
            height,
            tiles: open_grid(width, height),
            tokens: BTreeMap::new(),
        }
    }

    /// Replace the grid with a fresh open one; every token is removed.
    pub fn init(&mut self, width: i64, height: i64) {
        *self = GridMap::new(width, height);
    }

    fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    pub fn is_wall(&self, x: usize, y: usize) -> bool {
        self.tiles
            .get(y)
            .and_then(|row| row.get(x))
            .map(|t| *t == Tile::Wall)
            .unwrap_or(true)
    }

    fn occupied(&self, x: usize, y: usize) -> bool {
        self.tokens.values().any(|t| t.x == x && t.y == y)
    }

    /// Set one cell. Out-of-range coordinates change nothing and return false.
    pub fn set_tile(&mut self, x: i64, y: i64, blocked: bool) -> bool {
        if !self.in_bounds(x, y) {
            return false;
        }
        self.tiles[y as usize][x as usize] = if blocked { Tile::Wall } else { Tile::Open };
        true
    }

    /// Open every cell; tokens stay where they are.
    pub fn clear_walls(&mut self) {
        self.tiles = open_grid(self.width, self.height);
    }

    fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| (x, y)))
    }

    /// Row-major: first free open cell, else first open cell, else the origin.
    fn placement(&self) -> (usize, usize) {
        self.cells()
            .find(|&(x, y)| !self.is_wall(x, y) && !self.occupied(x, y))
            .or_else(|| self.cells().find(|&(x, y)| !self.is_wall(x, y)))
            .unwrap_or((0, 0))
    }

    fn fresh_id(&self) -> String {
        loop {
            let id = format!("tok-{}", &Uuid::new_v4().simple().to_string()[..8]);
            if !self.tokens.contains_key(&id) {
                return id;
            }
        }
    }

    /// Place a new token owned by `owner`.
    pub fn add_token(&mut self, id: Option<&str>, name: &str, color: &str, owner: &str) -> Token {
        let requested = id.map(|raw| clean_key(raw, MAX_TOKEN_ID)).filter(|k| !k.is_empty());
        let id = match requested {
            Some(k) if !self.tokens.contains_key(&k) => k,
            _ => self.fresh_id(),
        };
        let (x, y) = self.placement();
        let token = Token {
            id: id.clone(),
            name: clean_or(name, MAX_TOKEN_NAME, owner),
            x,
            y,
            color: clean_color(color, DEFAULT_TOKEN_COLOR),
            owner: owner.to_string(),
        };
        self.tokens.insert(id, token.clone());
        token
    }

    fn owned_token_mut(&mut self, id: &str, actor: Actor<'_>) -> Result<&mut Token, SessionError> {
        let token = self
            .tokens
            .get_mut(id)
            .ok_or_else(|| SessionError::not_found(format!("No token '{}'", id)))?;
        if !actor.may_touch(&token.owner) {
            return Err(SessionError::unauthorized("Only the token's owner or the GM can do that"));
        }
        Ok(token)
    }

    /// Move a token, clamping the destination into the grid.
    pub fn move_token(&mut self, id: &str, x: i64, y: i64, actor: Actor<'_>) -> Result<MoveOutcome, SessionError> {
        let max_x = self.width as i64 - 1;
        let max_y = self.height as i64 - 1;
        let (x, y) = (x.clamp(0, max_x) as usize, y.clamp(0, max_y) as usize);
        let blocked = self.is_wall(x, y);
        let token = self.owned_token_mut(id, actor)?;
        if blocked {
            return Ok(MoveOutcome::Blocked);
        }
        token.x = x;
        token.y = y;
        Ok(MoveOutcome::Moved { x, y })
    }

    pub fn remove_token(&mut self, id: &str, actor: Actor<'_>) -> Result<Token, SessionError> {
        self.owned_token_mut(id, actor)?;
        self.tokens
            .remove(id)
            .ok_or_else(|| SessionError::not_found(format!("No token '{}'", id)))
    }

    /// GM reassignment; the caller has already been checked.
    pub fn assign_token(&mut self, id: &str, owner: &str) -> Result<&Token, SessionError> {
        let token = self
            .tokens
            .get_mut(id)
            .ok_or_else(|| SessionError::not_found(format!("No token '{}'", id)))?;
        token.owner = owner.to_string();
        Ok(token)
    }
}
