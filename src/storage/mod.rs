//! # Chat and Roll Mirror
//!
//! A best-effort copy of lobby activity in a sled database. The in-memory
//! lobby state is always authoritative; the mirror exists so operators can
//! look back at what happened (`tavernkeep status`) after the fact.
//!
//! ## Trees
//!
//! - `chat` - one record per chat entry, keyed `lobby \0 timestamp-id`
//! - `rolls` - one record per dice roll, same key scheme
//! - `lobbies` - one upserted [LobbyMeta] per lobby name
//!
//! Values are bincode-encoded.
//!
//! ## Non-blocking writes
//!
//! The hub never touches sled directly. It hands records to a [MirrorHandle],
//! which queues them for a dedicated writer thread. Write failures are logged
//! and counted in [crate::metrics] and go no further.

use std::path::Path;
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::IVec;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::lobby::{ChatEntry, Lobby, RollEntry};
use crate::logutil::escape_log;
use crate::metrics;

const TREE_CHAT: &str = "chat";
const TREE_ROLLS: &str = "rolls";
const TREE_LOBBIES: &str = "lobbies";

fn next_timestamp_nanos() -> i64 {
    let now = Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros() * 1000)
}

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lobby metadata as mirrored; never includes the password hash itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyMeta {
    pub name: String,
    pub has_password: bool,
    pub gm: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl LobbyMeta {
    pub fn of(lobby: &Lobby) -> Self {
        LobbyMeta {
            name: lobby.name.clone(),
            has_password: lobby.password_hash.is_some(),
            gm: lobby.gm.clone(),
            updated_at: lobby.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MirrorRecord {
    Chat(ChatEntry),
    Roll(RollEntry),
    Lobby(LobbyMeta),
}

/// Sled-backed mirror. Cloning shares the same database.
#[derive(Clone)]
pub struct MirrorStore {
    db: sled::Db,
    chat: sled::Tree,
    rolls: sled::Tree,
    lobbies: sled::Tree,
}

impl MirrorStore {
    /// Open (or create) the mirror rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MirrorError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let chat = db.open_tree(TREE_CHAT)?;
        let rolls = db.open_tree(TREE_ROLLS)?;
        let lobbies = db.open_tree(TREE_LOBBIES)?;
        Ok(MirrorStore {
            db,
            chat,
            rolls,
            lobbies,
        })
    }

    fn lobby_prefix(lobby: &str) -> Vec<u8> {
        let mut p = lobby.as_bytes().to_vec();
        p.push(0);
        p
    }

    fn entry_key(lobby: &str, id: u64) -> Vec<u8> {
        let mut k = Self::lobby_prefix(lobby);
        k.extend_from_slice(format!("{:020}-{:010}", next_timestamp_nanos(), id).as_bytes());
        k
    }

    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, MirrorError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: IVec) -> Result<T, MirrorError> {
        Ok(bincode::deserialize::<T>(&bytes)?)
    }

    pub fn write(&self, record: &MirrorRecord) -> Result<(), MirrorError> {
        match record {
            MirrorRecord::Chat(entry) => {
                self.chat
                    .insert(Self::entry_key(&entry.lobby, entry.id), Self::serialize(entry)?)?;
            }
            MirrorRecord::Roll(entry) => {
                self.rolls
                    .insert(Self::entry_key(&entry.lobby, entry.id), Self::serialize(entry)?)?;
            }
            MirrorRecord::Lobby(meta) => {
                self.lobbies
                    .insert(meta.name.as_bytes(), Self::serialize(meta)?)?;
            }
        }
        Ok(())
    }

    fn scan<T: serde::de::DeserializeOwned>(tree: &sled::Tree, lobby: &str, limit: usize) -> Result<Vec<T>, MirrorError> {
        let mut out = Vec::new();
        for entry in tree.scan_prefix(Self::lobby_prefix(lobby)).rev().take(limit) {
            let (_, bytes) = entry?;
            out.push(Self::deserialize(bytes)?);
        }
        out.reverse();
        Ok(out)
    }

    /// Last `limit` chat entries for `lobby`, oldest first.
    pub fn recent_chat(&self, lobby: &str, limit: usize) -> Result<Vec<ChatEntry>, MirrorError> {
        Self::scan(&self.chat, lobby, limit)
    }

    pub fn recent_rolls(&self, lobby: &str, limit: usize) -> Result<Vec<RollEntry>, MirrorError> {
        Self::scan(&self.rolls, lobby, limit)
    }

    pub fn lobbies(&self) -> Result<Vec<LobbyMeta>, MirrorError> {
        let mut out = Vec::new();
        for entry in self.lobbies.iter() {
            let (_, bytes) = entry?;
            out.push(Self::deserialize(bytes)?);
        }
        Ok(out)
    }

    pub fn counts(&self) -> (usize, usize) {
        (self.chat.len(), self.rolls.len())
    }

    pub fn flush(&self) -> Result<(), MirrorError> {
        self.db.flush()?;
        Ok(())
    }
}

/// Fire-and-forget front of the mirror.
#[derive(Clone)]
pub struct MirrorHandle {
    tx: mpsc::UnboundedSender<MirrorRecord>,
}

impl MirrorHandle {
    /// Start the writer thread. It exits, flushing, once every handle is dropped.
    pub fn spawn(store: MirrorStore) -> Result<(MirrorHandle, JoinHandle<()>), MirrorError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<MirrorRecord>();
        let join = std::thread::Builder::new()
            .name("mirror-writer".into())
            .spawn(move || {
                while let Some(record) = rx.blocking_recv() {
                    match store.write(&record) {
                        Ok(()) => metrics::inc_mirror_writes(),
                        Err(e) => {
                            metrics::inc_mirror_failures();
                            log::warn!("Mirror write failed: {}", e);
                        }
                    }
                }
                if let Err(e) = store.flush() {
                    log::warn!("Mirror flush failed: {}", e);
                }
                log::debug!("Mirror writer stopped");
            })?;
        Ok((MirrorHandle { tx }, join))
    }

    pub fn record(&self, record: MirrorRecord) {
        if self.tx.send(record).is_err() {
            metrics::inc_mirror_failures();
            log::warn!("Mirror writer is gone; record dropped");
        }
    }

    pub fn chat(&self, entry: &ChatEntry) {
        self.record(MirrorRecord::Chat(entry.clone()));
    }

    pub fn roll(&self, entry: &RollEntry) {
        self.record(MirrorRecord::Roll(entry.clone()));
    }

    pub fn lobby(&self, lobby: &Lobby) {
        log::trace!("Mirroring lobby meta for {}", escape_log(&lobby.name));
        self.record(MirrorRecord::Lobby(LobbyMeta::of(lobby)));
    }
}
