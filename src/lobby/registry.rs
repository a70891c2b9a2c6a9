//! Name → lobby table.
//!
//! Built once at startup and handed to the hub and the HTTP layer. Lobbies are
//! materialized on first reference and live for the rest of the process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use super::{Lobby, LobbyDefaults};

pub type SharedLobby = Arc<Mutex<Lobby>>;

/// Lock a lobby, recovering the state if a previous holder panicked.
pub fn lock(lobby: &SharedLobby) -> MutexGuard<'_, Lobby> {
    lobby.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
pub struct LobbyRegistry {
    lobbies: RwLock<HashMap<String, SharedLobby>>,
    defaults: LobbyDefaults,
}

impl Default for LobbyRegistry {
    fn default() -> Self {
        Self::new(LobbyDefaults::default())
    }
}

impl LobbyRegistry {
    pub fn new(defaults: LobbyDefaults) -> Self {
        LobbyRegistry {
            lobbies: RwLock::new(HashMap::new()),
            defaults,
        }
    }

    pub fn defaults(&self) -> &LobbyDefaults {
        &self.defaults
    }

    /// Fetch `name`, creating it when absent. The flag is true for a fresh lobby.
    ///
    /// Lookup and insert happen under one write lock, so racing first joins
    /// to a new name all land in the same session.
    pub fn get_or_create(&self, name: &str) -> (SharedLobby, bool) {
        if let Some(existing) = self.get(name) {
            return (existing, false);
        }
        let mut map = self
            .lobbies
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut created = false;
        let lobby = map
            .entry(name.to_string())
            .or_insert_with(|| {
                created = true;
                log::info!("Lobby created: {}", crate::logutil::escape_log(name));
                Arc::new(Mutex::new(Lobby::new(name, &self.defaults)))
            })
            .clone();
        (lobby, created)
    }

    pub fn get(&self, name: &str) -> Option<SharedLobby> {
        self.lobbies
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    /// Known lobby names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lobbies
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lobbies
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn creates_once() {
        let reg = LobbyRegistry::default();
        let (a, created) = reg.get_or_create("tavern");
        assert!(created);
        let (b, created) = reg.get_or_create("tavern");
        assert!(!created);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(reg.get("Tavern").is_none(), "names are case-sensitive");
        assert_eq!(reg.names(), vec!["tavern"]);
    }

    #[test]
    fn concurrent_first_access_yields_one_session() {
        let reg = Arc::new(LobbyRegistry::default());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let reg = reg.clone();
                thread::spawn(move || reg.get_or_create("crypt"))
            })
            .collect();
        let results: Vec<(SharedLobby, bool)> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|(_, c)| *c).count(), 1);
        let first = &results[0].0;
        assert!(results.iter().all(|(l, _)| Arc::ptr_eq(l, first)));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn defaults_flow_into_new_lobbies() {
        let reg = LobbyRegistry::new(LobbyDefaults { history_limit: 5, map_width: 8, map_height: 9 });
        let (lobby, _) = reg.get_or_create("small");
        let l = lock(&lobby);
        assert_eq!(l.map.width, 8);
        assert_eq!(l.map.height, 9);
    }
}
