//! Display names, joining, leaving and bans.

use std::fmt;

use super::credential::CredentialGate;
use super::{ConnectionId, Lobby};
use crate::validation::{clean_or, fold};

/// Placeholder for a blank display name.
pub const DEFAULT_NAME: &str = "Adventurer";

/// Sanitize a requested display name.
pub fn identify(raw: &str, max_chars: usize) -> String {
    clean_or(raw, max_chars, DEFAULT_NAME)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinRejection {
    Banned,
    WrongPassword,
    /// The supplied password could not be hashed.
    PasswordUnavailable,
}

impl fmt::Display for JoinRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinRejection::Banned => write!(f, "You are banned from this lobby"),
            JoinRejection::WrongPassword => write!(f, "Wrong or missing lobby password"),
            JoinRejection::PasswordUnavailable => {
                write!(f, "Could not set the lobby password, try again")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub name: String,
    pub became_gm: bool,
    pub password_established: bool,
}

impl Lobby {
    /// True when a connected member already uses `name`, ignoring case.
    pub fn name_taken(&self, name: &str) -> bool {
        let folded = fold(name);
        self.members.values().any(|n| fold(n) == folded)
    }

    /// `candidate` if free, else `candidate2`, `candidate3`, ...
    pub fn unique_name(&self, candidate: &str) -> String {
        if !self.name_taken(candidate) {
            return candidate.to_string();
        }
        (2u64..)
            .map(|n| format!("{}{}", candidate, n))
            .find(|name| !self.name_taken(name))
            .unwrap_or_else(|| candidate.to_string())
    }

    pub fn is_banned(&self, name: &str) -> bool {
        self.banned.contains(&fold(name))
    }

    /// Admit a connection under `candidate` (already sanitized).
    pub fn join(
        &mut self,
        conn: ConnectionId,
        candidate: &str,
        password: Option<&str>,
        gate: &CredentialGate,
    ) -> Result<JoinOutcome, JoinRejection> {
        if self.is_banned(candidate) {
            return Err(JoinRejection::Banned);
        }

        let password = password.filter(|p| !p.is_empty());
        let mut became_gm = false;
        let mut password_established = false;

        match (&self.password_hash, password) {
            (Some(stored), supplied) => {
                let ok = supplied.map(|p| gate.verify(p, stored)).unwrap_or(false);
                if !ok {
                    return Err(JoinRejection::WrongPassword);
                }
            }
            (None, Some(supplied)) => {
                let hash = gate.hash(supplied).map_err(|e| {
                    log::error!("Lobby password hash failed: {}", e);
                    JoinRejection::PasswordUnavailable
                })?;
                self.password_hash = Some(hash);
                password_established = true;
            }
            (None, None) => {}
        }

        let name = self.unique_name(candidate);
        if self.gm.is_none() {
            self.gm = Some(name.clone());
            became_gm = true;
        }
        self.members.insert(conn, name.clone());
        self.touch();

        Ok(JoinOutcome {
            name,
            became_gm,
            password_established,
        })
    }

    /// Drop the membership entry; tokens, sheets and macros stay keyed by name.
    pub fn leave(&mut self, conn: ConnectionId) -> Option<String> {
        let name = self.members.remove(&conn);
        if name.is_some() {
            self.touch();
        }
        name
    }

    /// Add to the ban list; returns false when already banned.
    pub fn ban(&mut self, name: &str) -> bool {
        self.banned.insert(fold(name))
    }

    pub fn unban(&mut self, name: &str) -> bool {
        self.banned.remove(&fold(name))
    }

    /// GM-only password change. An empty value opens the lobby.
    pub fn set_password(&mut self, plaintext: &str, gate: &CredentialGate) -> Result<bool, JoinRejection> {
        if plaintext.is_empty() {
            self.password_hash = None;
            return Ok(false);
        }
        let hash = gate.hash(plaintext).map_err(|e| {
            log::error!("Lobby password hash failed: {}", e);
            JoinRejection::PasswordUnavailable
        })?;
        self.password_hash = Some(hash);
        self.touch();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::LobbyDefaults;
    use argon2::Params;

    fn gate() -> CredentialGate {
        CredentialGate::with_params(Params::new(8, 1, 1, None).unwrap())
    }

    fn lobby() -> Lobby {
        Lobby::new("tavern", &LobbyDefaults::default())
    }

    #[test]
    fn identify_defaults_and_truncates() {
        assert_eq!(identify("   ", 24), "Adventurer");
        assert_eq!(identify(" Rin ", 24), "Rin");
        assert_eq!(identify(&"x".repeat(40), 24).len(), 24);
    }

    #[test]
    fn first_joiner_becomes_gm() {
        let mut l = lobby();
        let out = l.join(ConnectionId(1), "Gm", None, &gate()).unwrap();
        assert!(out.became_gm);
        let out = l.join(ConnectionId(2), "Rin", None, &gate()).unwrap();
        assert!(!out.became_gm);
        assert_eq!(l.gm.as_deref(), Some("Gm"));
    }

    #[test]
    fn duplicate_names_get_suffixes() {
        let mut l = lobby();
        let g = gate();
        assert_eq!(l.join(ConnectionId(1), "Rin", None, &g).unwrap().name, "Rin");
        assert_eq!(l.join(ConnectionId(2), "Rin", None, &g).unwrap().name, "Rin2");
        assert_eq!(l.join(ConnectionId(3), "rin", None, &g).unwrap().name, "rin3");
        l.leave(ConnectionId(2));
        assert_eq!(l.join(ConnectionId(4), "Rin", None, &g).unwrap().name, "Rin2");
    }

    #[test]
    fn password_established_then_required() {
        let mut l = lobby();
        let g = gate();
        let out = l.join(ConnectionId(1), "Gm", Some("mellon"), &g).unwrap();
        assert!(out.password_established);
        assert!(out.became_gm);
        assert_eq!(
            l.join(ConnectionId(2), "Rin", None, &g),
            Err(JoinRejection::WrongPassword)
        );
        assert_eq!(
            l.join(ConnectionId(2), "Rin", Some("nope"), &g),
            Err(JoinRejection::WrongPassword)
        );
        let out = l.join(ConnectionId(2), "Rin", Some("mellon"), &g).unwrap();
        assert!(!out.password_established);
    }

    #[test]
    fn password_bearer_takes_gm_only_when_vacant() {
        let mut l = lobby();
        let g = gate();
        l.join(ConnectionId(1), "Gm", None, &g).unwrap();
        let out = l.join(ConnectionId(2), "Rin", Some("pw"), &g).unwrap();
        assert!(out.password_established);
        assert!(!out.became_gm);
        assert_eq!(l.gm.as_deref(), Some("Gm"));
    }

    #[test]
    fn bans_are_case_insensitive() {
        let mut l = lobby();
        assert!(l.ban("Troll"));
        assert!(!l.ban("TROLL"));
        assert_eq!(
            l.join(ConnectionId(1), "troll", None, &gate()),
            Err(JoinRejection::Banned)
        );
        assert!(l.unban("troll"));
        assert!(l.join(ConnectionId(1), "troll", None, &gate()).is_ok());
    }

    #[test]
    fn leave_keeps_owned_state() {
        let mut l = lobby();
        l.join(ConnectionId(1), "Rin", None, &gate()).unwrap();
        l.macros.entry("Rin".into()).or_default().insert("hit".into(), "d20+5".into());
        assert_eq!(l.leave(ConnectionId(1)).as_deref(), Some("Rin"));
        assert!(l.members.is_empty());
        assert!(l.macros.contains_key("Rin"));
        assert_eq!(l.leave(ConnectionId(1)), None);
    }
}
